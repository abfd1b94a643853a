//! Storage for groups, their members, expenses and settlements.
//!
//! The engine only persists; it does not know about realtime delivery. The
//! HTTP layer publishes a notification after an engine call returns.

pub use error::EngineError;
pub use expenses::{Expense, ExpenseDraft, Split};
pub use group_members::{Member, Role};
pub use groups::{Group, slug};
pub use ops::{Engine, EngineBuilder};
pub use settlements::{Due, Settlement};
pub use users::User;

mod error;
mod expense_splits;
mod expenses;
mod group_members;
mod groups;
mod ops;
mod settlements;
mod users;

type ResultEngine<T> = Result<T, EngineError>;
