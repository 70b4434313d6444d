//! Periodic keepalive task.

use std::time::Duration;

use remote_run_core::{ClientFrame, Connection};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::client::{SharedSink, write_frame};

/// Handle to a running keepalive task.
///
/// The task is aborted on [`Keepalive::cancel`] or when the handle is
/// dropped, whichever comes first.
pub(crate) struct Keepalive {
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    /// Spawn a task writing a keepalive frame every `interval`.
    ///
    /// The first frame goes out one interval after spawning. The task ends
    /// on its own when a write fails.
    pub(crate) fn spawn<C: Connection>(sink: SharedSink<C>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = write_frame(&sink, &ClientFrame::Keepalive).await {
                    tracing::debug!("keepalive stopped: {e}");
                    break;
                }
                tracing::trace!("keepalive sent");
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Stop the task. Idempotent.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("keepalive cancelled");
        }
    }

    /// Whether the task has neither been cancelled nor finished.
    pub(crate) fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.cancel();
    }
}
