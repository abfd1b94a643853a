use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod realtime {
    use super::*;

    /// Kind of a realtime event.
    ///
    /// Serialized in snake_case (`expense_added`, `heartbeat`, ...).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EventKind {
        ExpenseAdded,
        ExpenseUpdated,
        ExpenseDeleted,
        GroupUpdated,
        Connected,
        Heartbeat,
    }

    impl EventKind {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::ExpenseAdded => "expense_added",
                Self::ExpenseUpdated => "expense_updated",
                Self::ExpenseDeleted => "expense_deleted",
                Self::GroupUpdated => "group_updated",
                Self::Connected => "connected",
                Self::Heartbeat => "heartbeat",
            }
        }
    }

    /// A domain change pushed to every client streaming a group.
    ///
    /// On the wire this is `{"type", "groupId", "data"?, "timestamp"}`; `data`
    /// is opaque and omitted when absent.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Event {
        #[serde(rename = "type")]
        pub kind: EventKind,
        pub group_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub data: Option<serde_json::Value>,
        /// RFC3339 creation time, assigned by the publisher.
        pub timestamp: DateTime<Utc>,
    }

    impl Event {
        pub fn new(
            kind: EventKind,
            group_id: impl Into<String>,
            data: Option<serde_json::Value>,
        ) -> Self {
            Self {
                kind,
                group_id: group_id.into(),
                data,
                timestamp: Utc::now(),
            }
        }

        /// Acknowledgement sent first on every new stream.
        pub fn connected(group_id: impl Into<String>) -> Self {
            Self::new(EventKind::Connected, group_id, None)
        }

        pub fn heartbeat(group_id: impl Into<String>) -> Self {
            Self::new(EventKind::Heartbeat, group_id, None)
        }

        pub fn is_heartbeat(&self) -> bool {
            self.kind == EventKind::Heartbeat
        }
    }
}

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserNew {
        pub name: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct User {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UsersResponse {
        pub users: Vec<User>,
    }
}

pub mod group {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupNew {
        pub name: String,
        pub description: Option<String>,
        /// Becomes the group's admin when set.
        pub creator_id: Option<Uuid>,
    }

    /// Partial update; absent fields are left untouched.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct GroupUpdate {
        pub name: Option<String>,
        pub description: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Group {
        pub id: Uuid,
        pub name: String,
        /// Name form used by invite links, see [`GroupJoin`].
        #[serde(default)]
        pub slug: String,
        pub description: Option<String>,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupsResponse {
        pub groups: Vec<Group>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MemberNew {
        pub user_id: Uuid,
    }

    /// Join by invite link. The user is created if the name is unknown.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupJoin {
        pub group_slug: String,
        pub name: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Member {
        pub user_id: Uuid,
        pub name: String,
        /// `admin` or `member`.
        pub role: String,
        pub joined_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MembersResponse {
        pub members: Vec<Member>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Joined {
        pub message: String,
        pub group: Group,
        pub member: Member,
    }

    /// Payload of `group_updated` events: the group, plus who joined when
    /// the update is a new member.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct GroupNotice {
        #[serde(flatten)]
        pub group: Group,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub joined: Option<Member>,
    }
}

pub mod expense {
    use super::*;

    /// Compact reference used inside expense views and realtime payloads.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Summary {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SplitNew {
        pub user_id: Uuid,
        pub amount_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseNew {
        pub group_id: Uuid,
        pub title: String,
        pub description: Option<String>,
        /// Must be > 0.
        pub amount_minor: i64,
        pub paid_by_id: Uuid,
        /// When present, the split amounts must add up to `amount_minor`.
        #[serde(default)]
        pub splits: Vec<SplitNew>,
    }

    /// Partial update; absent fields are left untouched.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ExpenseUpdate {
        pub title: Option<String>,
        pub description: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseQuery {
        pub group_id: Option<Uuid>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Split {
        pub user_id: Uuid,
        pub amount_minor: i64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Expense {
        pub id: Uuid,
        pub title: String,
        pub description: Option<String>,
        pub amount_minor: i64,
        pub paid_by: Summary,
        pub group: Summary,
        pub splits: Vec<Split>,
        /// Part of the splits already paid back to the payer.
        #[serde(default)]
        pub settled_minor: i64,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpensesResponse {
        pub expenses: Vec<Expense>,
    }

    /// Payload of `expense_added` / `expense_updated` events.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ExpenseNotice {
        pub id: Uuid,
        pub title: String,
        pub description: Option<String>,
        pub amount_minor: i64,
        pub paid_by: Summary,
        pub group: Summary,
        #[serde(default)]
        pub settled_minor: i64,
        pub created_at: DateTime<Utc>,
    }

    impl From<&Expense> for ExpenseNotice {
        fn from(expense: &Expense) -> Self {
            Self {
                id: expense.id,
                title: expense.title.clone(),
                description: expense.description.clone(),
                amount_minor: expense.amount_minor,
                paid_by: expense.paid_by.clone(),
                group: expense.group.clone(),
                settled_minor: expense.settled_minor,
                created_at: expense.created_at,
            }
        }
    }

    /// Payload of `expense_deleted` events.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ExpenseRemoved {
        pub id: Uuid,
    }
}

pub mod settlement {
    use super::*;
    use crate::expense::Summary;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DuesQuery {
        pub user_id: Uuid,
    }

    /// An unpaid share owed to the payer of an expense.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Due {
        pub split_id: Uuid,
        pub amount_minor: i64,
        pub expense: Summary,
        pub group: Summary,
        pub owed_to: Summary,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DuesResponse {
        pub dues: Vec<Due>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SettleRequest {
        pub user_id: Uuid,
        pub split_ids: Vec<Uuid>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Settlement {
        pub id: Uuid,
        pub split_id: Uuid,
        pub expense_id: Uuid,
        pub from_id: Uuid,
        pub to_id: Uuid,
        pub amount_minor: i64,
        pub paid_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SettleResponse {
        /// Number of shares actually paid; unknown or already paid ids are skipped.
        pub settled: usize,
        pub settlements: Vec<Settlement>,
    }
}

#[cfg(test)]
mod tests {
    use super::realtime::{Event, EventKind};

    #[test]
    fn event_uses_wire_field_names() {
        let event = Event::new(
            EventKind::ExpenseAdded,
            "g1",
            Some(serde_json::json!({ "title": "Lunch", "amount": 12.5 })),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "expense_added");
        assert_eq!(value["groupId"], "g1");
        assert_eq!(value["data"]["title"], "Lunch");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn group_notice_is_a_group_with_an_optional_joiner() {
        use super::group::{Group, GroupNotice};

        let notice: GroupNotice = serde_json::from_value(serde_json::json!({
            "id": "9d3b0e2e-5a0c-4e53-9c7f-2a61d9a3e0f4",
            "name": "Trip",
            "slug": "trip",
            "description": null,
            "created_at": "2026-10-01T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(notice.group.name, "Trip");
        assert!(notice.joined.is_none());

        let value = serde_json::to_value(&notice).unwrap();
        assert!(value.get("joined").is_none());
        let group: Group = serde_json::from_value(value).unwrap();
        assert_eq!(group.slug, "trip");
    }

    #[test]
    fn heartbeat_omits_data() {
        let value = serde_json::to_value(Event::heartbeat("g1")).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn parses_frame_payload_without_data() {
        let event: Event = serde_json::from_str(
            r#"{"type":"connected","groupId":"g1","timestamp":"2025-01-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Connected);
        assert_eq!(event.group_id, "g1");
        assert!(event.data.is_none());
    }

    #[test]
    fn kind_string_matches_serde() {
        for kind in [
            EventKind::ExpenseAdded,
            EventKind::ExpenseUpdated,
            EventKind::ExpenseDeleted,
            EventKind::GroupUpdated,
            EventKind::Connected,
            EventKind::Heartbeat,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
