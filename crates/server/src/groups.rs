//! Group API endpoints
//!
//! Renames and new members are published to the group as `group_updated`.

use api_types::{
    group::{
        Group, GroupJoin, GroupNew, GroupNotice, GroupUpdate, GroupsResponse, Joined, Member,
        MemberNew, MembersResponse,
    },
    realtime::EventKind,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{ServerError, server::ServerState, stream::notify};

fn map_group(group: engine::Group) -> Group {
    Group {
        id: group.id,
        slug: engine::slug(&group.name),
        name: group.name,
        description: group.description,
        created_at: group.created_at,
    }
}

fn map_member(member: engine::Member) -> Member {
    Member {
        user_id: member.user_id,
        name: member.name,
        role: member.role.as_str().to_string(),
        joined_at: member.joined_at,
    }
}

/// Tell the group's listeners that `member` joined.
fn announce(state: &ServerState, group: Group, member: &Member) {
    let notice = GroupNotice {
        group,
        joined: Some(member.clone()),
    };
    notify(state, notice.group.id, EventKind::GroupUpdated, &notice);
}

/// Handle requests for creating a new `Group`
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<GroupNew>,
) -> Result<(StatusCode, Json<Group>), ServerError> {
    let group = state
        .engine
        .new_group(
            &payload.name,
            payload.description.as_deref(),
            payload.creator_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(map_group(group))))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<GroupsResponse>, ServerError> {
    let groups = state.engine.groups().await?;

    Ok(Json(GroupsResponse {
        groups: groups.into_iter().map(map_group).collect(),
    }))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Group>, ServerError> {
    let group = state.engine.group(group_id).await?;
    Ok(Json(map_group(group)))
}

/// Rename or re-describe a group and tell its listeners.
pub async fn update(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<GroupUpdate>,
) -> Result<Json<Group>, ServerError> {
    let group = state
        .engine
        .update_group(
            group_id,
            payload.name.as_deref(),
            payload.description.as_deref(),
        )
        .await?;

    let notice = GroupNotice {
        group: map_group(group),
        joined: None,
    };
    notify(&state, notice.group.id, EventKind::GroupUpdated, &notice);
    Ok(Json(notice.group))
}

pub async fn members(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<MembersResponse>, ServerError> {
    let members = state.engine.members(group_id).await?;

    Ok(Json(MembersResponse {
        members: members.into_iter().map(map_member).collect(),
    }))
}

/// Add an existing user to the group.
pub async fn add_member(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<MemberNew>,
) -> Result<(StatusCode, Json<Member>), ServerError> {
    let member = map_member(state.engine.add_member(group_id, payload.user_id).await?);
    let group = map_group(state.engine.group(group_id).await?);

    announce(&state, group, &member);
    Ok((StatusCode::CREATED, Json(member)))
}

/// Join a group through its invite slug.
pub async fn join(
    State(state): State<ServerState>,
    Json(payload): Json<GroupJoin>,
) -> Result<Json<Joined>, ServerError> {
    let (group, member) = state
        .engine
        .join_group(&payload.group_slug, &payload.name)
        .await?;
    let group = map_group(group);
    let member = map_member(member);

    announce(&state, group.clone(), &member);
    Ok(Json(Joined {
        message: format!("{} joined {}", member.name, group.name),
        group,
        member,
    }))
}
