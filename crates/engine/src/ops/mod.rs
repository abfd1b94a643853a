use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

mod expenses;
mod groups;
mod members;
mod settlements;
mod users;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

fn normalize_required(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_id(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::KeyNotFound(format!("{label} {value}")))
}

async fn require_group<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
) -> ResultEngine<crate::groups::Model> {
    crate::groups::Entity::find_by_id(group_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("group {group_id}")))
}

async fn require_user<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> ResultEngine<crate::users::Model> {
    crate::users::Entity::find_by_id(user_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("user {user_id}")))
}

/// Fail with `Forbidden` unless `user_id` belongs to `group_id`.
async fn require_member<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    user_id: Uuid,
) -> ResultEngine<crate::group_members::Model> {
    crate::group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
        .one(db)
        .await?
        .ok_or_else(|| {
            EngineError::Forbidden(format!("user {user_id} is not a member of group {group_id}"))
        })
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
