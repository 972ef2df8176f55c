//! Best-effort side channel for session metadata writes.
//!
//! The orchestrator hands each [`SessionFieldsPatch`] to a background worker
//! and moves on. The worker applies patches one at a time in submission
//! order, so a late `uploading` write can never overwrite `synced`. Failures
//! are logged and dropped; queue state never depends on them.

use bridge_traits::metadata::{SessionFieldsPatch, SessionMetadataRepository};
use core_async::sync::{mpsc, oneshot};
use std::sync::Arc;
use tracing::{debug, warn};

enum Command {
    Update {
        session_id: String,
        patch: SessionFieldsPatch,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the metadata write worker.
#[derive(Clone)]
pub struct MetadataDispatcher {
    sender: mpsc::UnboundedSender<Command>,
}

impl MetadataDispatcher {
    /// Start the worker on the current runtime.
    ///
    /// Must be called from within a runtime. The worker exits once every
    /// dispatcher clone is dropped.
    pub fn spawn(repository: Arc<dyn SessionMetadataRepository>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();

        core_async::task::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Update { session_id, patch } => {
                        match repository.update_session_fields(&session_id, patch).await {
                            Ok(()) => debug!(session_id = %session_id, "Session metadata updated"),
                            Err(e) => warn!(
                                session_id = %session_id,
                                error = %e,
                                "Session metadata update failed"
                            ),
                        }
                    }
                    Command::Flush(done) => {
                        done.send(()).ok();
                    }
                }
            }
        });

        Self { sender }
    }

    /// Queue a write. Never blocks and never fails the caller.
    pub fn dispatch(&self, session_id: &str, patch: SessionFieldsPatch) {
        if patch.is_empty() {
            return;
        }

        let command = Command::Update {
            session_id: session_id.to_string(),
            patch,
        };
        if self.sender.send(command).is_err() {
            warn!(session_id, "Metadata worker stopped, update dropped");
        }
    }

    /// Wait until every write dispatched so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).is_ok() {
            wait.await.ok();
        }
    }
}

impl std::fmt::Debug for MetadataDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataDispatcher")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
