//! Repeating timers that feed actor mailboxes.
//!
//! A timer only holds a weak reference to its target mailbox, so it never
//! keeps an actor alive on its own. Ticks that find the mailbox full are
//! skipped rather than queued; a tick is a prompt, not a payload.

use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Cancellation handle for a repeating timer.
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TickHandle {
    task: Option<JoinHandle<()>>,
}

impl TickHandle {
    /// Stops further ticks. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Sends `message` to `target` after `initial_delay`, then every `interval`.
///
/// The timer ends by itself once every strong sender of `target` is gone.
/// `interval` must be non-zero.
pub fn schedule_repeating<M>(
    initial_delay: Duration,
    interval: Duration,
    target: &mpsc::Sender<M>,
    message: M,
) -> TickHandle
where
    M: Clone + Send + 'static,
{
    let target = target.downgrade();
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + initial_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(sender) = target.upgrade() else {
                break;
            };
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("Mailbox full, tick skipped"),
                Err(TrySendError::Closed(_)) => break,
            }
        }
    });
    TickHandle { task: Some(task) }
}
