use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait, QueryOrder, TransactionTrait};
use uuid::Uuid;

use crate::{Group, ResultEngine, Role, group_members, groups};

use super::{
    Engine, normalize_optional_text, normalize_required, require_group, require_user, with_tx,
};

impl Engine {
    /// Create a group. When `creator_id` is given that user becomes its admin.
    pub async fn new_group(
        &self,
        name: &str,
        description: Option<&str>,
        creator_id: Option<Uuid>,
    ) -> ResultEngine<Group> {
        let group = Group {
            id: Uuid::new_v4(),
            name: normalize_required(name, "group name")?,
            description: normalize_optional_text(description),
            created_at: Utc::now(),
        };

        with_tx!(self, |db_tx| {
            if let Some(creator_id) = creator_id {
                require_user(&db_tx, creator_id).await?;
            }
            groups::ActiveModel::from(&group).insert(&db_tx).await?;
            if let Some(creator_id) = creator_id {
                let admin = group_members::ActiveModel::for_member(
                    group.id,
                    creator_id,
                    Role::Admin,
                    group.created_at,
                );
                admin.insert(&db_tx).await?;
            }
            Ok(group)
        })
    }

    pub async fn group(&self, group_id: Uuid) -> ResultEngine<Group> {
        let model = require_group(&self.database, group_id).await?;
        Group::try_from(model)
    }

    /// All groups, oldest first.
    pub async fn groups(&self) -> ResultEngine<Vec<Group>> {
        groups::Entity::find()
            .order_by_asc(groups::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Group::try_from)
            .collect()
    }

    /// Rename a group or change its description.
    ///
    /// An empty description clears it; `None` leaves a field untouched.
    pub async fn update_group(
        &self,
        group_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ResultEngine<Group> {
        let name = name
            .map(|name| normalize_required(name, "group name"))
            .transpose()?;
        let model = require_group(&self.database, group_id).await?;
        if name.is_none() && description.is_none() {
            return Group::try_from(model);
        }

        let mut group: groups::ActiveModel = model.into();
        if let Some(name) = name {
            group.name = ActiveValue::Set(name);
        }
        if let Some(description) = description {
            group.description = ActiveValue::Set(normalize_optional_text(Some(description)));
        }
        let model = group.update(&self.database).await?;
        Group::try_from(model)
    }
}
