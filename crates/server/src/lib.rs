use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use serde::Serialize;
pub use server::{ServerState, router, run_with_listener, spawn_with_listener};

mod expenses;
mod groups;
mod server;
mod settlements;
mod stream;
mod users;

pub mod types {
    pub mod group {
        pub use api_types::group::{
            Group, GroupJoin, GroupNew, GroupNotice, GroupUpdate, GroupsResponse, Joined, Member,
            MemberNew, MembersResponse,
        };
    }

    pub mod user {
        pub use api_types::user::{User, UserNew, UsersResponse};
    }

    pub mod expense {
        pub use api_types::expense::{
            Expense, ExpenseNew, ExpenseNotice, ExpenseQuery, ExpenseRemoved, ExpenseUpdate,
            ExpensesResponse, Split, SplitNew, Summary,
        };
    }

    pub mod settlement {
        pub use api_types::settlement::{
            Due, DuesQuery, DuesResponse, SettleRequest, SettleResponse, Settlement,
        };
    }

    pub mod realtime {
        pub use api_types::realtime::{Event, EventKind};
    }
}

#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    Generic(String),
    Unavailable(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_) => StatusCode::CONFLICT,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::InvalidAmount(_) | EngineError::InvalidName(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
            ServerError::Unavailable(err) => {
                tracing::warn!("{err}");
                (StatusCode::SERVICE_UNAVAILABLE, err)
            }
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
