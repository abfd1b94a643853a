//! Per-user shares of an expense.

use sea_orm::{ActiveValue, entity::prelude::*};
use uuid::Uuid;

use crate::{EngineError, Split};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_splits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub expense_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub is_paid: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expense,
    #[sea_orm(has_many = "super::settlements::Entity")]
    Settlements,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expense.def()
    }
}

impl Related<super::settlements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn for_split(expense_id: Uuid, split: &Split) -> Self {
        Self {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            expense_id: ActiveValue::Set(expense_id.to_string()),
            user_id: ActiveValue::Set(split.user_id.to_string()),
            amount_minor: ActiveValue::Set(split.amount_minor),
            is_paid: ActiveValue::Set(false),
        }
    }
}

impl TryFrom<Model> for Split {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&model.user_id)
                .map_err(|_| EngineError::KeyNotFound(format!("user {}", model.user_id)))?,
            amount_minor: model.amount_minor,
        })
    }
}
