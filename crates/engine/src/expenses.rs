//! Expense primitives.
//!
//! An `Expense` is a payment made by one user for a group. It can be divided
//! between users through `Split`s; when splits are present they cover the
//! whole amount. Payer and split users must be members of the group.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub user_id: Uuid,
    pub amount_minor: i64,
}

/// Input for [`Engine::new_expense`](crate::Engine::new_expense).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub group_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub amount_minor: i64,
    pub paid_by_id: Uuid,
    pub splits: Vec<Split>,
}

impl ExpenseDraft {
    /// Check amount and split invariants.
    pub(crate) fn validate(&self) -> ResultEngine<()> {
        if self.amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        if self.splits.is_empty() {
            return Ok(());
        }

        let mut total: i64 = 0;
        for split in &self.splits {
            if split.amount_minor < 0 {
                return Err(EngineError::InvalidAmount(format!(
                    "split for user {} must be >= 0",
                    split.user_id
                )));
            }
            total = total.checked_add(split.amount_minor).ok_or_else(|| {
                EngineError::InvalidAmount("splits overflow".to_string())
            })?;
        }
        if total != self.amount_minor {
            return Err(EngineError::InvalidAmount(format!(
                "splits add up to {total}, expected {}",
                self.amount_minor
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_name: String,
    pub title: String,
    pub description: Option<String>,
    pub amount_minor: i64,
    pub paid_by_id: Uuid,
    pub paid_by_name: String,
    pub splits: Vec<Split>,
    /// Part of the splits already paid back to the payer.
    pub settled_minor: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub description: Option<String>,
    pub amount_minor: i64,
    pub paid_by_id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Group,
    #[sea_orm(has_many = "super::expense_splits::Entity")]
    Splits,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl Related<super::expense_splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Splits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.to_string()),
            title: ActiveValue::Set(expense.title.clone()),
            description: ActiveValue::Set(expense.description.clone()),
            amount_minor: ActiveValue::Set(expense.amount_minor),
            paid_by_id: ActiveValue::Set(expense.paid_by_id.to_string()),
            created_at: ActiveValue::Set(expense.created_at),
        }
    }
}
