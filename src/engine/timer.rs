//! Single-shot idle timer for in-progress sequences
//!
//! The timer is a deadline owned by the engine's event loop rather than a
//! spawned task, so firing it never races another state transition. Arming
//! replaces any previous deadline; at most one is ever live.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

#[derive(Debug, Default)]
pub struct IdleTimer {
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `delay` from now, discarding any outstanding deadline
    pub fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[cfg(test)]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the current deadline passes; pending forever when
    /// disarmed. Meant for `tokio::select!`, re-created each loop turn.
    pub fn expired(&self) -> impl Future<Output = ()> + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_disarmed_never_fires() {
        let timer = IdleTimer::new();
        assert!(!timer.is_armed());
        let mut fut = task::spawn(timer.expired());
        assert_pending!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let mut timer = IdleTimer::new();
        timer.arm(Duration::from_millis(500));

        let mut fut = task::spawn(timer.expired());
        assert_pending!(fut.poll());

        time::advance(Duration::from_millis(499)).await;
        assert_pending!(fut.poll());

        time::advance(Duration::from_millis(2)).await;
        assert_ready!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let mut timer = IdleTimer::new();
        timer.arm(Duration::from_millis(100));
        let first = timer.deadline();

        time::advance(Duration::from_millis(50)).await;
        timer.arm(Duration::from_millis(100));
        assert!(timer.deadline() > first);

        timer.cancel();
        assert!(timer.deadline().is_none());
    }
}
