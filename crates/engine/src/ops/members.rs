use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    EngineError, Group, Member, ResultEngine, Role, User, group_members, groups, slug, users,
};

use super::{Engine, normalize_required, parse_id, require_group, require_user, with_tx};

impl Engine {
    /// Add an existing user to a group as a plain member.
    pub async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> ResultEngine<Member> {
        with_tx!(self, |db_tx| {
            require_group(&db_tx, group_id).await?;
            let user = require_user(&db_tx, user_id).await?;
            insert_member(&db_tx, group_id, user_id, user.name).await
        })
    }

    /// Join the group whose name matches `group_slug`, as the user called `name`.
    ///
    /// The user is created when nobody has that name yet. Joining twice fails
    /// with `ExistingKey`.
    pub async fn join_group(
        &self,
        group_slug: &str,
        name: &str,
    ) -> ResultEngine<(Group, Member)> {
        let wanted = slug(group_slug);
        let name = normalize_required(name, "user name")?;

        with_tx!(self, |db_tx| {
            let group = groups::Entity::find()
                .order_by_asc(groups::Column::CreatedAt)
                .all(&db_tx)
                .await?
                .into_iter()
                .find(|group| !wanted.is_empty() && slug(&group.name) == wanted)
                .ok_or_else(|| EngineError::KeyNotFound(format!("group {group_slug}")))?;
            let group = Group::try_from(group)?;

            let user = match users::Entity::find()
                .filter(users::Column::Name.eq(name.as_str()))
                .order_by_asc(users::Column::CreatedAt)
                .one(&db_tx)
                .await?
            {
                Some(model) => User::try_from(model)?,
                None => {
                    let user = User {
                        id: Uuid::new_v4(),
                        name: name.clone(),
                        created_at: Utc::now(),
                    };
                    users::ActiveModel::from(&user).insert(&db_tx).await?;
                    user
                }
            };

            let member = insert_member(&db_tx, group.id, user.id, user.name).await?;
            Ok((group, member))
        })
    }

    /// Members of a group, in joining order.
    pub async fn members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        require_group(&self.database, group_id).await?;

        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(group_members::Column::JoinedAt)
            .find_also_related(users::Entity)
            .all(&self.database)
            .await?
            .into_iter()
            .map(|(member, user)| -> ResultEngine<Member> {
                let user = user.ok_or_else(|| {
                    EngineError::KeyNotFound(format!("user {}", member.user_id))
                })?;
                Ok(Member {
                    user_id: parse_id(&member.user_id, "user")?,
                    name: user.name,
                    role: Role::try_from(member.role.as_str())?,
                    joined_at: member.joined_at,
                })
            })
            .collect()
    }
}

async fn insert_member<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    user_id: Uuid,
    name: String,
) -> ResultEngine<Member> {
    let existing = group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(EngineError::ExistingKey(format!(
            "member {user_id} of group {group_id}"
        )));
    }

    let member = Member {
        user_id,
        name,
        role: Role::Member,
        joined_at: Utc::now(),
    };
    group_members::ActiveModel::for_member(group_id, user_id, member.role, member.joined_at)
        .insert(db)
        .await?;
    Ok(member)
}
