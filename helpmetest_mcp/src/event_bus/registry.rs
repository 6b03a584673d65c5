//! Interactive session registry and room authorization.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const INTERACTIVE_MARKER: &str = "__interactive__";

/// The company-wide chat room, always valid.
pub fn chat_room(company: &str) -> String {
    format!("chat.{company}")
}

/// Room name of an interactive session.
pub fn interactive_room(company: &str, timestamp: u64) -> String {
    format!("{company}{INTERACTIVE_MARKER}{timestamp}")
}

/// Sessions opened by this process. Entries are never removed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeSet<u64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<u64>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<u64>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_interactive_session(&self, timestamp: u64) {
        self.write().insert(timestamp);
    }

    /// Register a session stamped with the current time in epoch milliseconds.
    ///
    /// Two sessions opened within the same millisecond get distinct stamps.
    pub fn open_session(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut sessions = self.write();
        let timestamp = match sessions.last() {
            Some(&last) if last >= now => last + 1,
            _ => now,
        };
        sessions.insert(timestamp);
        timestamp
    }

    pub fn is_registered(&self, timestamp: u64) -> bool {
        self.read().contains(&timestamp)
    }

    pub fn is_valid_room(&self, room: &str, company: &str) -> bool {
        if room == chat_room(company) {
            return true;
        }
        let Some(stamp) = room
            .strip_prefix(company)
            .and_then(|rest| rest.strip_prefix(INTERACTIVE_MARKER))
        else {
            return false;
        };
        if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        stamp
            .parse::<u64>()
            .is_ok_and(|timestamp| self.is_registered(timestamp))
    }

    /// The chat room followed by every registered session's room, oldest first.
    pub fn available_rooms(&self, company: &str) -> Vec<String> {
        let mut rooms = vec![chat_room(company)];
        rooms.extend(self.read().iter().map(|&ts| interactive_room(company, ts)));
        rooms
    }
}
