//! Lazy, restartable supervision of the background stream task.

use helpmetest_common::task_state::{TaskState, TaskStateMachine};
use helpmetest_stream_client::client::{EventStreamClient, RecordHandler, StreamConfig};
use helpmetest_stream_client::error::StreamError;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to launch event stream: {0}")]
    Launch(#[from] StreamError),

    #[error("Event stream cannot be started: {0}")]
    Unavailable(String),
}

/// Starts the stream task feeding `handler`.
pub trait StreamLauncher: Send + Sync {
    fn launch(&self, handler: Arc<dyn RecordHandler>) -> Result<JoinHandle<()>, StreamError>;
}

/// Launches an [`EventStreamClient`] with a fixed configuration.
pub struct HttpStreamLauncher {
    config: StreamConfig,
}

impl HttpStreamLauncher {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }
}

impl StreamLauncher for HttpStreamLauncher {
    fn launch(&self, handler: Arc<dyn RecordHandler>) -> Result<JoinHandle<()>, StreamError> {
        let client = EventStreamClient::new(self.config.clone())?;
        info!("Starting event stream listener on {}", client.endpoint());
        Ok(client.spawn(handler))
    }
}

/// Owns the stream task and its lifecycle state.
///
/// Without a launcher the supervisor stays `NotStarted` and every start is a
/// no-op, which is how tests run a bus fed only by hand.
pub struct StreamSupervisor {
    state: TaskStateMachine,
    launcher: Option<Arc<dyn StreamLauncher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSupervisor {
    pub fn new(launcher: Option<Arc<dyn StreamLauncher>>) -> Self {
        Self {
            state: TaskStateMachine::new(),
            launcher,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state.current()
    }

    pub fn state_machine(&self) -> &TaskStateMachine {
        &self.state
    }

    /// Start the stream task unless it is already running.
    ///
    /// A task found finished is recorded as crashed and started again. A failed
    /// launch leaves the state `Crashed { retryable: true }` so the next call
    /// retries.
    pub fn ensure_started<F>(&self, make_handler: F) -> Result<(), SupervisorError>
    where
        F: FnOnce() -> Arc<dyn RecordHandler>,
    {
        let Some(launcher) = self.launcher.as_ref() else {
            return Ok(());
        };

        let mut task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.state.is_running() {
            match task.as_ref() {
                Some(handle) if !handle.is_finished() => return Ok(()),
                _ => {
                    warn!("Event stream task exited unexpectedly; restarting");
                    let _ = self
                        .state
                        .mark_crashed("stream task exited".to_string(), true);
                }
            }
        }

        if let Err(reason) = self.state.begin_start() {
            return match self.state.current() {
                TaskState::Crashed {
                    error,
                    retryable: false,
                } => Err(SupervisorError::Unavailable(error)),
                _ => {
                    tracing::debug!("Event stream start skipped: {}", reason);
                    Ok(())
                }
            };
        }

        match launcher.launch(make_handler()) {
            Ok(handle) => {
                *task = Some(handle);
                let _ = self.state.mark_running();
                Ok(())
            }
            Err(e) => {
                warn!("Event stream failed to start: {}", e);
                let _ = self.state.mark_crashed(e.to_string(), true);
                Err(e.into())
            }
        }
    }

    /// Abort the stream task, if any.
    pub fn shutdown(&self) {
        let mut task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
