//! Bounded, ordered event queue with per-kind admission rules.
//!
//! Records are kept in insertion order in a ring buffer. Each record gets a
//! sequence id that is never reused, so readers track progress with a
//! sequence-id cursor instead of an array index and eviction never has to
//! adjust them.

use super::types::{EventPayload, EventRecord, MessageStatus, SystemMessage};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

/// Default cap on queued records.
pub const MAX_QUEUE_SIZE: usize = 100;

/// Outcome of offering an event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued { sequence_id: u64 },
    /// A user message with the same message id is already queued.
    Duplicate,
    /// A system message with the same injection key was enqueued before.
    AlreadyInjected,
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued { .. })
    }
}

#[derive(Debug)]
pub struct EventQueue {
    records: VecDeque<EventRecord>,
    capacity: usize,
    next_sequence_id: u64,
    injected_keys: HashSet<String>,
    evicted: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(MAX_QUEUE_SIZE)
    }
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence_id: 1,
            injected_keys: HashSet::new(),
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of records dropped to stay under the cap.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    /// Sequence id of the newest record ever queued, or 0 before the first.
    pub fn last_sequence_id(&self) -> u64 {
        self.next_sequence_id - 1
    }

    /// Admit an event, evicting the oldest record when over capacity.
    pub fn enqueue(&mut self, payload: EventPayload) -> Admission {
        if let EventPayload::UserMessage(message) = &payload
            && self.contains_message(&message.message_id)
        {
            trace!("Dropping duplicate user message {}", message.message_id);
            return Admission::Duplicate;
        }

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;
        self.records.push_back(EventRecord {
            sequence_id,
            received_at: Utc::now(),
            payload,
        });

        while self.records.len() > self.capacity {
            if let Some(oldest) = self.records.pop_front() {
                self.evicted += 1;
                debug!(
                    "Event queue full ({}), evicted {} #{}",
                    self.capacity,
                    oldest.kind().as_str(),
                    oldest.sequence_id
                );
            }
        }

        Admission::Queued { sequence_id }
    }

    /// Enqueue a system message, at most once per `injection_key`.
    ///
    /// Keys are remembered for the life of the queue even after the message
    /// itself has been consumed or evicted.
    pub fn inject_system_message(
        &mut self,
        content: impl Into<String>,
        injection_key: Option<&str>,
    ) -> Admission {
        if let Some(key) = injection_key
            && !self.injected_keys.insert(key.to_string())
        {
            return Admission::AlreadyInjected;
        }
        self.enqueue(EventPayload::SystemMessage(SystemMessage {
            content: content.into(),
        }))
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.records.iter().any(|record| {
            record
                .payload
                .as_user_message()
                .is_some_and(|m| m.message_id == message_id)
        })
    }

    /// Snapshot and clear everything.
    pub fn drain_all(&mut self) -> Vec<EventRecord> {
        self.records.drain(..).collect()
    }

    /// Records with a sequence id strictly greater than `cursor`, oldest first.
    pub fn since(&self, cursor: u64) -> Vec<EventRecord> {
        self.records
            .iter()
            .filter(|record| record.sequence_id > cursor)
            .cloned()
            .collect()
    }

    /// Array position of the last record at or before `cursor`, if any is still queued.
    pub fn position_of(&self, cursor: u64) -> Option<usize> {
        self.records
            .iter()
            .take_while(|record| record.sequence_id <= cursor)
            .count()
            .checked_sub(1)
    }

    pub fn has_pending_user_message(&self) -> bool {
        self.records.iter().any(|record| {
            record
                .payload
                .as_user_message()
                .is_some_and(|m| m.status == MessageStatus::Processing)
        })
    }

    /// Remove every user message, leaving other kinds in place.
    pub fn take_user_messages(&mut self) -> Vec<EventRecord> {
        let mut taken = Vec::new();
        self.records.retain(|record| {
            if record.payload.as_user_message().is_some() {
                taken.push(record.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Remove user messages that were already acknowledged. Returns how many.
    pub fn drop_processed_user_messages(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|record| {
            record
                .payload
                .as_user_message()
                .is_none_or(|m| m.status == MessageStatus::Processing)
        });
        before - self.records.len()
    }

    /// Flip the given user messages to `processed` in place.
    pub fn mark_processed(&mut self, message_ids: &[String]) {
        for record in self.records.iter_mut() {
            if let EventPayload::UserMessage(message) = &mut record.payload
                && message_ids.contains(&message.message_id)
            {
                message.status = MessageStatus::Processed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::types::{EventKind, TestStatusChange, UserMessage};

    fn user(id: &str) -> EventPayload {
        EventPayload::UserMessage(UserMessage {
            message_id: id.to_string(),
            room: "chat.acme".to_string(),
            text: format!("text {id}"),
            status: MessageStatus::Processing,
        })
    }

    fn status_change(id: usize) -> EventPayload {
        EventPayload::TestStatusChange(TestStatusChange {
            test_id: format!("t{id}"),
            test_name: None,
            previous_status: None,
            status: "passed".to_string(),
            elapsed_time: None,
        })
    }

    #[test]
    fn duplicate_message_id_is_dropped() {
        let mut queue = EventQueue::default();
        assert!(queue.enqueue(user("m1")).is_queued());
        assert_eq!(queue.enqueue(user("m1")), Admission::Duplicate);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut queue = EventQueue::default();
        for i in 0..150 {
            queue.enqueue(status_change(i));
        }
        assert_eq!(queue.len(), MAX_QUEUE_SIZE);
        assert_eq!(queue.evicted(), 50);

        let ids: Vec<u64> = queue.iter().map(|r| r.sequence_id).collect();
        let expected: Vec<u64> = (51..=150).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn sequence_ids_are_not_reused_after_drain() {
        let mut queue = EventQueue::new(10);
        queue.enqueue(status_change(0));
        queue.enqueue(status_change(1));
        assert_eq!(queue.drain_all().len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.enqueue(status_change(2)), Admission::Queued { sequence_id: 3 });
    }

    #[test]
    fn eviction_keeps_cursor_reads_stable() {
        let mut queue = EventQueue::new(5);
        for i in 0..5 {
            queue.enqueue(status_change(i));
        }
        // Cursor after the third record (array position 2).
        let cursor = 3;
        assert_eq!(queue.position_of(cursor), Some(2));
        let before: Vec<u64> = queue.since(cursor).iter().map(|r| r.sequence_id).collect();

        queue.enqueue(status_change(5));

        assert_eq!(queue.position_of(cursor), Some(1));
        let after: Vec<u64> = queue.since(cursor).iter().map(|r| r.sequence_id).collect();
        assert_eq!(after[..before.len()], before[..]);
        assert_eq!(after, vec![4, 5, 6]);
    }

    #[test]
    fn position_is_none_once_delivered_records_are_evicted() {
        let mut queue = EventQueue::new(2);
        queue.enqueue(status_change(0));
        assert_eq!(queue.position_of(1), Some(0));
        queue.enqueue(status_change(1));
        queue.enqueue(status_change(2));
        assert_eq!(queue.position_of(1), None);
        assert_eq!(queue.position_of(0), None);
    }

    #[test]
    fn take_user_messages_leaves_other_kinds() {
        let mut queue = EventQueue::default();
        queue.enqueue(user("m1"));
        queue.enqueue(status_change(1));

        let taken = queue.take_user_messages();
        assert_eq!(taken.len(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.iter().next().map(|r| r.kind()),
            Some(EventKind::TestStatusChange)
        );
    }

    #[test]
    fn injection_key_is_honoured_once() {
        let mut queue = EventQueue::default();
        assert!(queue.inject_system_message("hello", Some("greeting")).is_queued());
        queue.drain_all();
        assert_eq!(
            queue.inject_system_message("hello", Some("greeting")),
            Admission::AlreadyInjected
        );
        assert!(queue.inject_system_message("hello", None).is_queued());
        assert!(queue.inject_system_message("hello", None).is_queued());
    }

    #[test]
    fn mark_processed_clears_pending_flag() {
        let mut queue = EventQueue::default();
        queue.enqueue(user("m1"));
        assert!(queue.has_pending_user_message());
        queue.mark_processed(&["m1".to_string()]);
        assert!(!queue.has_pending_user_message());
        // Still blocks re-admission of the same message id.
        assert_eq!(queue.enqueue(user("m1")), Admission::Duplicate);
    }

    #[test]
    fn processed_messages_can_be_dropped() {
        let mut queue = EventQueue::default();
        queue.enqueue(user("m1"));
        queue.enqueue(user("m2"));
        queue.enqueue(status_change(0));
        queue.mark_processed(&["m1".to_string()]);

        assert_eq!(queue.drop_processed_user_messages(), 1);
        assert_eq!(queue.len(), 2);
        assert!(queue.contains_message("m2"));
        assert!(!queue.contains_message("m1"));
    }
}
