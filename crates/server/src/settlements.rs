//! Settlement API endpoints
//!
//! Paying back shares changes the expenses they belong to, so each touched
//! expense is published again as `expense_updated`.

use std::collections::BTreeSet;

use api_types::{
    expense::{ExpenseNotice, Summary},
    realtime::EventKind,
    settlement::{Due, DuesQuery, DuesResponse, SettleRequest, SettleResponse, Settlement},
};
use axum::{
    Json,
    extract::{Query, State},
};

use crate::{ServerError, expenses::map_expense, server::ServerState, stream::notify};

fn map_due(due: engine::Due) -> Due {
    Due {
        split_id: due.split_id,
        amount_minor: due.amount_minor,
        expense: Summary {
            id: due.expense_id,
            name: due.expense_title,
        },
        group: Summary {
            id: due.group_id,
            name: due.group_name,
        },
        owed_to: Summary {
            id: due.owed_to_id,
            name: due.owed_to_name,
        },
    }
}

fn map_settlement(settlement: &engine::Settlement) -> Settlement {
    Settlement {
        id: settlement.id,
        split_id: settlement.split_id,
        expense_id: settlement.expense_id,
        from_id: settlement.from_id,
        to_id: settlement.to_id,
        amount_minor: settlement.amount_minor,
        paid_at: settlement.paid_at,
    }
}

/// Unpaid shares of `user_id`, newest expense first.
pub async fn dues(
    State(state): State<ServerState>,
    Query(query): Query<DuesQuery>,
) -> Result<Json<DuesResponse>, ServerError> {
    let dues = state.engine.dues(query.user_id).await?;

    Ok(Json(DuesResponse {
        dues: dues.into_iter().map(map_due).collect(),
    }))
}

pub async fn settle(
    State(state): State<ServerState>,
    Json(payload): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ServerError> {
    let settled = state
        .engine
        .settle(payload.user_id, &payload.split_ids)
        .await?;

    let touched: BTreeSet<_> = settled.iter().map(|s| s.expense_id).collect();
    for expense_id in touched {
        match state.engine.expense(expense_id).await {
            Ok(expense) => {
                let expense = map_expense(expense);
                notify(
                    &state,
                    expense.group.id,
                    EventKind::ExpenseUpdated,
                    &ExpenseNotice::from(&expense),
                );
            }
            Err(err) => tracing::warn!(%expense_id, "settled expense not reloaded: {err}"),
        }
    }

    Ok(Json(SettleResponse {
        settled: settled.len(),
        settlements: settled.iter().map(map_settlement).collect(),
    }))
}
