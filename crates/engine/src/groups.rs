//! Groups: the unit expenses belong to and realtime events are scoped by.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expenses::Entity")]
    Expenses,
    #[sea_orm(has_many = "super::group_members::Entity")]
    Members,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Group> for ActiveModel {
    fn from(group: &Group) -> Self {
        Self {
            id: ActiveValue::Set(group.id.to_string()),
            name: ActiveValue::Set(group.name.clone()),
            description: ActiveValue::Set(group.description.clone()),
            created_at: ActiveValue::Set(group.created_at),
        }
    }
}

impl TryFrom<Model> for Group {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound(format!("group {}", model.id)))?,
            name: model.name,
            description: model.description,
            created_at: model.created_at,
        })
    }
}

/// Invite-link form of a group name: lowercase words joined by `-`.
///
/// Case and punctuation are dropped, so `"Ski Trip!"` and `"ski trip"` share
/// the slug `ski-trip`.
pub fn slug(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_joins_lowercase_words() {
        assert_eq!(slug("Ski Trip"), "ski-trip");
        assert_eq!(slug("  Flat  #3 - Rent!"), "flat-3-rent");
        assert_eq!(slug("Café"), "café");
        assert_eq!(slug("!!"), "");
    }
}
