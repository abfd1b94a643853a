use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::{EngineError, Expense, ExpenseDraft, ResultEngine, Split, expense_splits, expenses};

use super::{
    Engine, normalize_optional_text, normalize_required, parse_id, require_group, require_member,
    require_user, with_tx,
};

impl Engine {
    /// Record an expense and its splits in one DB transaction.
    ///
    /// The payer and every split user must be members of the group.
    pub async fn new_expense(&self, draft: ExpenseDraft) -> ResultEngine<Expense> {
        draft.validate()?;
        let title = normalize_required(&draft.title, "expense title")?;

        with_tx!(self, |db_tx| {
            let group = require_group(&db_tx, draft.group_id).await?;
            let payer = require_user(&db_tx, draft.paid_by_id).await?;
            require_member(&db_tx, draft.group_id, draft.paid_by_id).await?;
            for split in &draft.splits {
                require_user(&db_tx, split.user_id).await?;
                require_member(&db_tx, draft.group_id, split.user_id).await?;
            }

            let expense = Expense {
                id: Uuid::new_v4(),
                group_id: draft.group_id,
                group_name: group.name,
                title,
                description: normalize_optional_text(draft.description.as_deref()),
                amount_minor: draft.amount_minor,
                paid_by_id: draft.paid_by_id,
                paid_by_name: payer.name,
                splits: draft.splits.clone(),
                settled_minor: 0,
                created_at: Utc::now(),
            };

            expenses::ActiveModel::from(&expense).insert(&db_tx).await?;
            for split in &expense.splits {
                expense_splits::ActiveModel::for_split(expense.id, split)
                    .insert(&db_tx)
                    .await?;
            }
            Ok(expense)
        })
    }

    pub async fn expense(&self, expense_id: Uuid) -> ResultEngine<Expense> {
        let model = find_expense(&self.database, expense_id).await?;
        load_expense(&self.database, model).await
    }

    /// Expenses newest first, optionally restricted to one group.
    pub async fn expenses(&self, group_id: Option<Uuid>) -> ResultEngine<Vec<Expense>> {
        let mut query = expenses::Entity::find().order_by_desc(expenses::Column::CreatedAt);
        if let Some(group_id) = group_id {
            query = query.filter(expenses::Column::GroupId.eq(group_id.to_string()));
        }

        let models = query.all(&self.database).await?;
        let mut out = Vec::with_capacity(models.len());
        for model in models {
            out.push(load_expense(&self.database, model).await?);
        }
        Ok(out)
    }

    /// Edit the title or description of an expense.
    ///
    /// Amount and splits are immutable; delete and re-create to change them.
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> ResultEngine<Expense> {
        let title = title
            .map(|title| normalize_required(title, "expense title"))
            .transpose()?;

        with_tx!(self, |db_tx| {
            let model = find_expense(&db_tx, expense_id).await?;
            let model = if title.is_none() && description.is_none() {
                model
            } else {
                let mut expense: expenses::ActiveModel = model.into();
                if let Some(title) = title {
                    expense.title = ActiveValue::Set(title);
                }
                if let Some(description) = description {
                    expense.description =
                        ActiveValue::Set(normalize_optional_text(Some(description)));
                }
                expense.update(&db_tx).await?
            };
            load_expense(&db_tx, model).await
        })
    }

    /// Delete an expense and its splits, returning what was removed.
    pub async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let model = find_expense(&db_tx, expense_id).await?;
            let expense = load_expense(&db_tx, model).await?;

            expense_splits::Entity::delete_many()
                .filter(expense_splits::Column::ExpenseId.eq(expense_id.to_string()))
                .exec(&db_tx)
                .await?;
            expenses::Entity::delete_by_id(expense_id.to_string())
                .exec(&db_tx)
                .await?;

            Ok(expense)
        })
    }
}

pub(super) async fn find_expense<C: ConnectionTrait>(
    db: &C,
    expense_id: Uuid,
) -> ResultEngine<expenses::Model> {
    expenses::Entity::find_by_id(expense_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("expense {expense_id}")))
}

pub(super) async fn load_expense<C: ConnectionTrait>(
    db: &C,
    model: expenses::Model,
) -> ResultEngine<Expense> {
    let group_id = parse_id(&model.group_id, "group")?;
    let paid_by_id = parse_id(&model.paid_by_id, "user")?;
    let group = require_group(db, group_id).await?;
    let payer = require_user(db, paid_by_id).await?;

    let rows = expense_splits::Entity::find()
        .filter(expense_splits::Column::ExpenseId.eq(model.id.clone()))
        .all(db)
        .await?;
    let settled_minor: i64 = rows
        .iter()
        .filter(|row| row.is_paid)
        .map(|row| row.amount_minor)
        .sum();
    let splits = rows
        .into_iter()
        .map(Split::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;

    Ok(Expense {
        id: parse_id(&model.id, "expense")?,
        group_id,
        group_name: group.name,
        title: model.title,
        description: model.description,
        amount_minor: model.amount_minor,
        paid_by_id,
        paid_by_name: payer.name,
        splits,
        settled_minor,
        created_at: model.created_at,
    })
}
