use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::{Due, EngineError, ResultEngine, Settlement, expense_splits, expenses, settlements};

use super::{Engine, parse_id, require_group, require_user, with_tx};

impl Engine {
    /// Unpaid shares `user_id` owes to other payers, newest expense first.
    ///
    /// A share of an expense the user paid for is never a due.
    pub async fn dues(&self, user_id: Uuid) -> ResultEngine<Vec<Due>> {
        require_user(&self.database, user_id).await?;

        let rows = open_splits(&self.database, user_id, None).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (split, expense) in rows {
            let group_id = parse_id(&expense.group_id, "group")?;
            let owed_to_id = parse_id(&expense.paid_by_id, "user")?;
            let group = require_group(&self.database, group_id).await?;
            let payer = require_user(&self.database, owed_to_id).await?;
            out.push(Due {
                split_id: parse_id(&split.id, "split")?,
                expense_id: parse_id(&expense.id, "expense")?,
                expense_title: expense.title,
                group_id,
                group_name: group.name,
                amount_minor: split.amount_minor,
                owed_to_id,
                owed_to_name: payer.name,
            });
        }
        Ok(out)
    }

    /// Pay back the listed shares of `user_id` in one DB transaction.
    ///
    /// Ids that are not open dues of the user (unknown, already paid, owned
    /// by someone else, or the user's own expense) are skipped. Returns one
    /// settlement per share actually paid.
    pub async fn settle(
        &self,
        user_id: Uuid,
        split_ids: &[Uuid],
    ) -> ResultEngine<Vec<Settlement>> {
        if split_ids.is_empty() {
            return Err(EngineError::InvalidAmount(
                "at least one split to settle is required".to_string(),
            ));
        }

        with_tx!(self, |db_tx| {
            require_user(&db_tx, user_id).await?;

            let paid_at = Utc::now();
            let mut settled = Vec::new();
            for (split, expense) in open_splits(&db_tx, user_id, Some(split_ids)).await? {
                let settlement = Settlement {
                    id: Uuid::new_v4(),
                    split_id: parse_id(&split.id, "split")?,
                    expense_id: parse_id(&expense.id, "expense")?,
                    group_id: parse_id(&expense.group_id, "group")?,
                    from_id: user_id,
                    to_id: parse_id(&expense.paid_by_id, "user")?,
                    amount_minor: split.amount_minor,
                    paid_at,
                };
                settlements::ActiveModel::from(&settlement)
                    .insert(&db_tx)
                    .await?;

                let mut split: expense_splits::ActiveModel = split.into();
                split.is_paid = ActiveValue::Set(true);
                split.update(&db_tx).await?;

                settled.push(settlement);
            }
            Ok(settled)
        })
    }
}

/// Unpaid splits of `user_id` on expenses somebody else paid for, with
/// their expense, optionally restricted to `split_ids`.
async fn open_splits<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    split_ids: Option<&[Uuid]>,
) -> ResultEngine<Vec<(expense_splits::Model, expenses::Model)>> {
    let user_id = user_id.to_string();
    let mut query = expense_splits::Entity::find()
        .find_also_related(expenses::Entity)
        .filter(expense_splits::Column::UserId.eq(user_id.as_str()))
        .filter(expense_splits::Column::IsPaid.eq(false))
        .filter(expenses::Column::PaidById.ne(user_id.as_str()));
    if let Some(split_ids) = split_ids {
        query = query.filter(
            expense_splits::Column::Id.is_in(split_ids.iter().map(ToString::to_string)),
        );
    }

    let rows = query
        .order_by_desc(expenses::Column::CreatedAt)
        .all(db)
        .await?;

    rows.into_iter()
        .map(|(split, expense)| -> ResultEngine<_> {
            let expense = expense
                .ok_or_else(|| EngineError::KeyNotFound(format!("expense {}", split.expense_id)))?;
            Ok((split, expense))
        })
        .collect()
}
