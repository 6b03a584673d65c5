//! Lifecycle state machine for supervised background tasks.
//!
//! A background task (such as the event stream listener) is started lazily and
//! at most once at a time. If starting it fails, or the task later dies, the
//! state records the failure and whether another start may be attempted.
//! State changes are published through `tokio::sync::watch` so observers never
//! have to poll.
//!
//! # Example
//!
//! ```rust
//! use helpmetest_common::task_state::{TaskState, TaskStateMachine};
//!
//! let sm = TaskStateMachine::new();
//! assert!(sm.begin_start().is_ok());
//! sm.mark_running().unwrap();
//! assert!(matches!(sm.current(), TaskState::Running));
//!
//! // A second start while running is refused.
//! assert!(sm.begin_start().is_err());
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle states of a supervised task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Never started in this process.
    NotStarted,

    /// A start attempt is in progress.
    Starting,

    /// The task is alive.
    Running,

    /// The last start attempt failed, or the task exited.
    Crashed { error: String, retryable: bool },
}

impl TaskState {
    /// Returns true if a new start attempt is allowed from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            TaskState::NotStarted | TaskState::Crashed { retryable: true, .. }
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

/// Observable task state machine backed by a watch channel.
#[derive(Clone)]
pub struct TaskStateMachine {
    sender: Arc<watch::Sender<TaskState>>,
    // Keeps the channel open when nobody is subscribed.
    _receiver: watch::Receiver<TaskState>,
}

impl TaskStateMachine {
    /// Create a new state machine in the `NotStarted` state.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(TaskState::NotStarted);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    /// Get the current state without blocking.
    pub fn current(&self) -> TaskState {
        self.sender.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.sender.subscribe()
    }

    /// Claim the right to start the task.
    ///
    /// Succeeds only from `NotStarted` or a retryable `Crashed` state, and moves
    /// the machine to `Starting` atomically, so concurrent callers cannot both
    /// start the task.
    pub fn begin_start(&self) -> Result<(), &'static str> {
        let mut claimed = false;
        self.sender.send_if_modified(|state| {
            if state.can_start() {
                *state = TaskState::Starting;
                claimed = true;
                true
            } else {
                false
            }
        });
        if claimed {
            Ok(())
        } else {
            Err("Task is already starting, running, or permanently failed")
        }
    }

    /// Transition from `Starting` to `Running`.
    pub fn mark_running(&self) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if matches!(state, TaskState::Starting) {
                *state = TaskState::Running;
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Can only transition to Running from Starting")
        }
    }

    /// Record a failed start or a dead task.
    pub fn mark_crashed(&self, error: String, retryable: bool) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if matches!(state, TaskState::Starting | TaskState::Running) {
                *state = TaskState::Crashed {
                    error: error.clone(),
                    retryable,
                };
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Can only crash from Starting or Running")
        }
    }

    /// Wait until the task is `Running`, or until it crashes.
    pub async fn wait_for_running(&self) -> Result<(), String> {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    TaskState::Running => return Ok(()),
                    TaskState::Crashed { error, .. } => return Err(error.clone()),
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err("State machine dropped".to_string());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.borrow().is_running()
    }
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_start_then_run() {
        let sm = TaskStateMachine::new();
        assert_eq!(sm.current(), TaskState::NotStarted);

        sm.begin_start().unwrap();
        assert_eq!(sm.current(), TaskState::Starting);

        sm.mark_running().unwrap();
        assert!(sm.is_running());
    }

    #[test]
    fn test_start_is_claimed_once() {
        let sm = TaskStateMachine::new();
        sm.begin_start().unwrap();
        assert!(sm.begin_start().is_err());
        sm.mark_running().unwrap();
        assert!(sm.begin_start().is_err());
    }

    #[test]
    fn test_retryable_crash_rearms_start() {
        let sm = TaskStateMachine::new();
        sm.begin_start().unwrap();
        sm.mark_crashed("connect refused".to_string(), true).unwrap();

        assert!(matches!(
            sm.current(),
            TaskState::Crashed { error, retryable: true } if error == "connect refused"
        ));
        assert!(sm.begin_start().is_ok());
    }

    #[test]
    fn test_permanent_crash_blocks_start() {
        let sm = TaskStateMachine::new();
        sm.begin_start().unwrap();
        sm.mark_crashed("bad url".to_string(), false).unwrap();
        assert!(sm.begin_start().is_err());
    }

    #[test]
    fn test_cannot_run_without_starting() {
        let sm = TaskStateMachine::new();
        assert!(sm.mark_running().is_err());
        assert!(sm.mark_crashed("x".to_string(), true).is_err());
    }

    #[tokio::test]
    async fn test_wait_for_running_delayed() {
        let sm = TaskStateMachine::new();
        let sm_clone = sm.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sm_clone.begin_start().unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            sm_clone.mark_running().unwrap();
        });

        let result = timeout(Duration::from_secs(1), sm.wait_for_running()).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_running_reports_crash() {
        let sm = TaskStateMachine::new();
        let sm_clone = sm.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sm_clone.begin_start().unwrap();
            sm_clone
                .mark_crashed("stream setup failed".to_string(), true)
                .unwrap();
        });

        let result = timeout(Duration::from_secs(1), sm.wait_for_running()).await;
        assert_eq!(result.unwrap(), Err("stream setup failed".to_string()));
    }

    #[test]
    fn test_subscribe_receives_updates() {
        let sm = TaskStateMachine::new();
        let mut rx = sm.subscribe();
        assert_eq!(*rx.borrow(), TaskState::NotStarted);

        sm.begin_start().unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), TaskState::Starting);
    }
}
