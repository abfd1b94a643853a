//! Paying back a share of an expense.
//!
//! A [`Due`] is an unpaid split owed to someone else. Settling it records a
//! [`Settlement`] from the split's user to the expense's payer and marks the
//! split paid.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    pub split_id: Uuid,
    pub expense_id: Uuid,
    pub expense_title: String,
    pub group_id: Uuid,
    pub group_name: String,
    pub amount_minor: i64,
    pub owed_to_id: Uuid,
    pub owed_to_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub split_id: Uuid,
    pub expense_id: Uuid,
    pub group_id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub amount_minor: i64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub split_id: String,
    pub from_id: String,
    pub to_id: String,
    pub amount_minor: i64,
    pub paid_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expense_splits::Entity",
        from = "Column::SplitId",
        to = "super::expense_splits::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Split,
}

impl Related<super::expense_splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Split.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Settlement> for ActiveModel {
    fn from(settlement: &Settlement) -> Self {
        Self {
            id: ActiveValue::Set(settlement.id.to_string()),
            split_id: ActiveValue::Set(settlement.split_id.to_string()),
            from_id: ActiveValue::Set(settlement.from_id.to_string()),
            to_id: ActiveValue::Set(settlement.to_id.to_string()),
            amount_minor: ActiveValue::Set(settlement.amount_minor),
            paid_at: ActiveValue::Set(settlement.paid_at),
        }
    }
}
