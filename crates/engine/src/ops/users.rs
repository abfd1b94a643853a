use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder};
use uuid::Uuid;

use crate::{ResultEngine, User, users};

use super::{Engine, normalize_required, require_user};

impl Engine {
    pub async fn new_user(&self, name: &str) -> ResultEngine<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: normalize_required(name, "user name")?,
            created_at: Utc::now(),
        };
        users::ActiveModel::from(&user).insert(&self.database).await?;
        Ok(user)
    }

    pub async fn user(&self, user_id: Uuid) -> ResultEngine<User> {
        let model = require_user(&self.database, user_id).await?;
        User::try_from(model)
    }

    pub async fn users(&self) -> ResultEngine<Vec<User>> {
        users::Entity::find()
            .order_by_asc(users::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }
}
