//! One-line, human readable descriptions of realtime events.

use api_types::{
    expense::{ExpenseNotice, ExpenseRemoved},
    group::GroupNotice,
    realtime::{Event, EventKind},
};
use serde::de::DeserializeOwned;

fn payload<T: DeserializeOwned>(event: &Event) -> Option<T> {
    let data = event.data.clone()?;
    serde_json::from_value(data).ok()
}

/// Render minor units as a decimal amount, e.g. `1250` as `12.50`.
pub fn format_amount(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn describe(event: &Event) -> String {
    match event.kind {
        EventKind::Connected => format!("Listening to group {}", event.group_id),
        EventKind::Heartbeat => "Heartbeat".to_string(),
        EventKind::ExpenseAdded | EventKind::ExpenseUpdated => {
            let verb = if event.kind == EventKind::ExpenseAdded {
                "New expense"
            } else {
                "Expense updated"
            };
            match payload::<ExpenseNotice>(event) {
                Some(expense) if expense.settled_minor > 0 => format!(
                    "{verb} in {}: {} - {} ({} paid back)",
                    expense.group.name,
                    expense.title,
                    format_amount(expense.amount_minor),
                    format_amount(expense.settled_minor)
                ),
                Some(expense) => format!(
                    "{verb} in {}: {} - {}",
                    expense.group.name,
                    expense.title,
                    format_amount(expense.amount_minor)
                ),
                None => format!("{verb} in group {}", event.group_id),
            }
        }
        EventKind::ExpenseDeleted => match payload::<ExpenseRemoved>(event) {
            Some(removed) => format!("Expense {} removed", removed.id),
            None => format!("Expense removed in group {}", event.group_id),
        },
        EventKind::GroupUpdated => match payload::<GroupNotice>(event) {
            Some(GroupNotice {
                group,
                joined: Some(member),
            }) => format!("{} joined {}", member.name, group.name),
            Some(notice) => format!("Group is now called {}", notice.group.name),
            None => format!("Group {} updated", event.group_id),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn expense_payload() -> serde_json::Value {
        json!({
            "id": "6f1c1f4e-8d2a-4a5e-9a43-3c1f0e0b6d11",
            "title": "Lunch",
            "description": null,
            "amount_minor": 1250,
            "paid_by": { "id": "0b8f5a55-1d6f-4f54-8f5b-52a8c1f5b0a2", "name": "Alice" },
            "group": { "id": "9d3b0e2e-5a0c-4e53-9c7f-2a61d9a3e0f4", "name": "Trip" },
            "created_at": "2026-10-01T12:00:00Z",
        })
    }

    #[test]
    fn new_expense_line() {
        let event = Event::new(EventKind::ExpenseAdded, "g1", Some(expense_payload()));
        assert_eq!(describe(&event), "New expense in Trip: Lunch - 12.50");
    }

    #[test]
    fn updated_expense_line() {
        let event = Event::new(EventKind::ExpenseUpdated, "g1", Some(expense_payload()));
        assert_eq!(describe(&event), "Expense updated in Trip: Lunch - 12.50");
    }

    #[test]
    fn settled_part_is_shown_once_paid_back() {
        let mut data = expense_payload();
        data["settled_minor"] = json!(625);
        let event = Event::new(EventKind::ExpenseUpdated, "g1", Some(data));
        assert_eq!(
            describe(&event),
            "Expense updated in Trip: Lunch - 12.50 (6.25 paid back)"
        );
    }

    #[test]
    fn group_lines_for_rename_and_join() {
        let group = json!({
            "id": "9d3b0e2e-5a0c-4e53-9c7f-2a61d9a3e0f4",
            "name": "Road trip",
            "slug": "road-trip",
            "description": null,
            "created_at": "2026-10-01T12:00:00Z",
        });
        let event = Event::new(EventKind::GroupUpdated, "g1", Some(group.clone()));
        assert_eq!(describe(&event), "Group is now called Road trip");

        let mut joined = group;
        joined["joined"] = json!({
            "user_id": "0b8f5a55-1d6f-4f54-8f5b-52a8c1f5b0a2",
            "name": "Bob",
            "role": "member",
            "joined_at": "2026-10-02T09:00:00Z",
        });
        let event = Event::new(EventKind::GroupUpdated, "g1", Some(joined));
        assert_eq!(describe(&event), "Bob joined Road trip");
    }

    #[test]
    fn unknown_payload_falls_back_to_group_id() {
        let event = Event::new(EventKind::ExpenseAdded, "g1", Some(json!({ "title": "x" })));
        assert_eq!(describe(&event), "New expense in group g1");

        let event = Event::new(EventKind::GroupUpdated, "g1", None);
        assert_eq!(describe(&event), "Group g1 updated");
    }

    #[test]
    fn connected_line() {
        assert_eq!(describe(&Event::connected("g1")), "Listening to group g1");
    }

    #[test]
    fn amounts_keep_two_decimals() {
        assert_eq!(format_amount(1250), "12.50");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-300), "-3.00");
    }
}
