//! Expense API endpoints
//!
//! Every successful mutation is published to the expense's group.

use api_types::{
    expense::{
        Expense, ExpenseNew, ExpenseNotice, ExpenseQuery, ExpenseRemoved, ExpenseUpdate,
        ExpensesResponse, Split, Summary,
    },
    realtime::EventKind,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use engine::ExpenseDraft;
use uuid::Uuid;

use crate::{ServerError, server::ServerState, stream::notify};

pub(crate) fn map_expense(expense: engine::Expense) -> Expense {
    Expense {
        id: expense.id,
        title: expense.title,
        description: expense.description,
        amount_minor: expense.amount_minor,
        paid_by: Summary {
            id: expense.paid_by_id,
            name: expense.paid_by_name,
        },
        group: Summary {
            id: expense.group_id,
            name: expense.group_name,
        },
        splits: expense
            .splits
            .into_iter()
            .map(|split| Split {
                user_id: split.user_id,
                amount_minor: split.amount_minor,
            })
            .collect(),
        settled_minor: expense.settled_minor,
        created_at: expense.created_at,
    }
}

/// Handle requests for creating a new `Expense`
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<ExpenseNew>,
) -> Result<(StatusCode, Json<Expense>), ServerError> {
    let draft = ExpenseDraft {
        group_id: payload.group_id,
        title: payload.title,
        description: payload.description,
        amount_minor: payload.amount_minor,
        paid_by_id: payload.paid_by_id,
        splits: payload
            .splits
            .into_iter()
            .map(|split| engine::Split {
                user_id: split.user_id,
                amount_minor: split.amount_minor,
            })
            .collect(),
    };
    let expense = map_expense(state.engine.new_expense(draft).await?);

    notify(
        &state,
        expense.group.id,
        EventKind::ExpenseAdded,
        &ExpenseNotice::from(&expense),
    );
    Ok((StatusCode::CREATED, Json(expense)))
}

/// List expenses, newest first, optionally for one group.
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ExpensesResponse>, ServerError> {
    let expenses = state.engine.expenses(query.group_id).await?;

    Ok(Json(ExpensesResponse {
        expenses: expenses.into_iter().map(map_expense).collect(),
    }))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(expense_id): Path<Uuid>,
    Json(payload): Json<ExpenseUpdate>,
) -> Result<Json<Expense>, ServerError> {
    let expense = state
        .engine
        .update_expense(
            expense_id,
            payload.title.as_deref(),
            payload.description.as_deref(),
        )
        .await?;
    let expense = map_expense(expense);

    notify(
        &state,
        expense.group.id,
        EventKind::ExpenseUpdated,
        &ExpenseNotice::from(&expense),
    );
    Ok(Json(expense))
}

pub async fn remove(
    State(state): State<ServerState>,
    Path(expense_id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    let expense = state.engine.delete_expense(expense_id).await?;

    notify(
        &state,
        expense.group_id,
        EventKind::ExpenseDeleted,
        &ExpenseRemoved { id: expense.id },
    );
    Ok(StatusCode::NO_CONTENT)
}
