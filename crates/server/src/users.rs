//! User API endpoints

use api_types::user::{User, UserNew, UsersResponse};
use axum::{Json, extract::State, http::StatusCode};

use crate::{ServerError, server::ServerState};

fn map_user(user: engine::User) -> User {
    User {
        id: user.id,
        name: user.name,
    }
}

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<UserNew>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let user = state.engine.new_user(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(map_user(user))))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<UsersResponse>, ServerError> {
    let users = state.engine.users().await?;

    Ok(Json(UsersResponse {
        users: users.into_iter().map(map_user).collect(),
    }))
}
