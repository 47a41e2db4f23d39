//! Idle-session countdown.
//!
//! One guard exists per authenticated session: armed on entering
//! `Authenticated`, re-armed by interaction events, and dropped the moment
//! the session ends so it can never fire against a stale state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Idle period after which the session is ended locally.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct InactivityGuard {
    touch: Arc<Notify>,
    task: JoinHandle<()>,
}

impl InactivityGuard {
    /// Start the countdown. `on_idle` runs once if the full timeout elapses
    /// with no `touch` in between.
    pub fn arm<F>(timeout: Duration, on_idle: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let touch = Arc::new(Notify::new());
        let notified = touch.clone();
        let mut on_idle = Some(on_idle);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(timeout) => {
                        debug!("idle timeout reached");
                        if let Some(fire) = on_idle.take() {
                            fire.await;
                        }
                        break;
                    }
                    () = notified.notified() => {}
                }
            }
        });
        Self { touch, task }
    }

    /// Record interaction, restarting the countdown.
    pub fn touch(&self) {
        self.touch.notify_one();
    }
}

impl Drop for InactivityGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
