//! Text rendering of consumer results for MCP callers.

use super::types::{EventKind, EventPayload, EventRecord, TestStatusChange, UserMessage};
use std::fmt::Write;

pub const NO_PENDING_MESSAGES: &str = "No pending messages in queue.";
pub const NO_NEW_EVENTS: &str = "No new events received.";

/// Mode A result block, one entry per message.
pub fn format_pending_messages(messages: &[UserMessage]) -> String {
    let mut out = format!("Received {} new user message(s):\n", messages.len());
    for message in messages {
        let _ = write!(
            out,
            "\n[messageId: {}] room: {}\n{}\n",
            message.message_id, message.room, message.text
        );
    }
    out.push_str("\nReply with send_to_ui using the room of each message.");
    out
}

/// Mode A timeout text when other kinds are still queued.
pub fn format_no_messages_with_backlog(other_events: usize) -> String {
    format!(
        "{NO_PENDING_MESSAGES} {other_events} other event(s) are queued; call listen_to_events to read them."
    )
}

fn format_test_change(change: &TestStatusChange) -> String {
    let name = change.test_name.as_deref().unwrap_or(&change.test_id);
    let mut line = format!("- {} ({}): ", name, change.test_id);
    match &change.previous_status {
        Some(previous) => {
            let _ = write!(line, "{} -> {}", previous, change.status);
        }
        None => line.push_str(&change.status),
    }
    if let Some(elapsed) = &change.elapsed_time {
        let _ = write!(line, " after {elapsed}ms");
    }
    line
}

/// Mode B digest grouped by kind, with follow-up hints for the kinds present.
pub fn format_event_digest(events: &[EventRecord], requires_send_to_ui: bool) -> String {
    let mut system = Vec::new();
    let mut users = Vec::new();
    let mut tests = Vec::new();
    for record in events {
        match &record.payload {
            EventPayload::SystemMessage(m) => system.push(format!("- {}", m.content)),
            EventPayload::UserMessage(m) => users.push(format!(
                "- [messageId: {}] room: {}\n  {}",
                m.message_id, m.room, m.text
            )),
            EventPayload::TestStatusChange(c) => tests.push(format_test_change(c)),
        }
    }

    let mut out = format!("Received {} new event(s).\n", events.len());
    for (title, lines) in [
        ("System messages", &system),
        ("User messages", &users),
        ("Test status changes", &tests),
    ] {
        if !lines.is_empty() {
            let _ = write!(out, "\n## {}\n{}\n", title, lines.join("\n"));
        }
    }

    let mut hints = Vec::new();
    if !users.is_empty() {
        hints.push("Answer each user message with send_to_ui in the message's room.");
    }
    if events.iter().any(|r| {
        matches!(&r.payload, EventPayload::TestStatusChange(c) if c.status.eq_ignore_ascii_case("failed"))
    }) {
        hints.push("Investigate the failed tests and report findings with send_to_ui.");
    } else if !tests.is_empty() {
        hints.push("Review the test status changes; no action is needed for passing tests.");
    }
    if requires_send_to_ui {
        hints.push("An interactive session is waiting: send a status update with send_to_ui.");
    }
    hints.push("Call listen_to_events again to keep receiving events.");

    out.push_str("\nWhat to do next:\n");
    for hint in hints {
        let _ = writeln!(out, "- {hint}");
    }
    out
}

/// Count of events per kind, for logs.
pub fn kind_summary(events: &[EventRecord]) -> String {
    [
        EventKind::UserMessage,
        EventKind::TestStatusChange,
        EventKind::SystemMessage,
    ]
    .iter()
    .filter_map(|kind| {
        let n = events.iter().filter(|r| r.kind() == *kind).count();
        (n > 0).then(|| format!("{}={}", kind.as_str(), n))
    })
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::types::{MessageStatus, SystemMessage};
    use chrono::Utc;

    fn record(sequence_id: u64, payload: EventPayload) -> EventRecord {
        EventRecord {
            sequence_id,
            received_at: Utc::now(),
            payload,
        }
    }

    fn user() -> UserMessage {
        UserMessage {
            message_id: "m1".to_string(),
            room: "chat.acme".to_string(),
            text: "hi".to_string(),
            status: MessageStatus::Processing,
        }
    }

    #[test]
    fn pending_block_references_message_id() {
        let text = format_pending_messages(&[user()]);
        assert!(text.contains("[messageId: m1]"));
        assert!(text.contains("chat.acme"));
        assert!(text.contains("hi"));
    }

    #[test]
    fn digest_groups_kinds_and_hints() {
        let events = vec![
            record(
                1,
                EventPayload::SystemMessage(SystemMessage {
                    content: "welcome".to_string(),
                }),
            ),
            record(2, EventPayload::UserMessage(user())),
            record(
                3,
                EventPayload::TestStatusChange(TestStatusChange {
                    test_id: "t1".to_string(),
                    test_name: Some("Login".to_string()),
                    previous_status: Some("passed".to_string()),
                    status: "failed".to_string(),
                    elapsed_time: Some("1200".to_string()),
                }),
            ),
        ];
        let text = format_event_digest(&events, true);
        assert!(text.starts_with("Received 3 new event(s)."));
        assert!(text.contains("## System messages\n- welcome"));
        assert!(text.contains("[messageId: m1]"));
        assert!(text.contains("- Login (t1): passed -> failed after 1200ms"));
        assert!(text.contains("Investigate the failed tests"));
        assert!(text.contains("interactive session is waiting"));
        assert_eq!(
            kind_summary(&events),
            "user_message=1, test_status_change=1, system_message=1"
        );
    }

    #[test]
    fn backlog_note_points_at_listen() {
        let text = format_no_messages_with_backlog(2);
        assert!(text.starts_with(NO_PENDING_MESSAGES));
        assert!(text.contains("2 other event(s)"));
        assert!(text.contains("listen_to_events"));
    }
}
