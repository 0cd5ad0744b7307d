use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Idle,          // No attempt made yet
    Connecting,    // Attempt in progress
    Retrying(u32), // Last attempt failed, this many attempts left
    Connected,
    Failed,        // Attempts exhausted
}

/// Fixed-delay connection retry, tracked as an explicit state machine.
///
/// Attempts are spaced by a constant delay (no exponential growth, no jitter).
/// With `max_attempts = 5` a fully failing connect makes five attempts and
/// sleeps four times.
///
/// Every transition is published on a `watch` channel, so observers see
/// `Retrying(n)` without waiting for `run` to return.
#[derive(Debug)]
pub struct ConnectRetry {
    state: watch::Sender<ConnectState>,
    max_attempts: u32,
    remaining: u32,
    delay: Duration,
}

impl ConnectRetry {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        let max_attempts = max_attempts.max(1);
        let (state, _) = watch::channel(ConnectState::Idle);
        Self { state, max_attempts, remaining: max_attempts, delay }
    }

    pub fn state(&self) -> ConnectState {
        *self.state.borrow()
    }

    /// Receiver that tracks every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectState) {
        self.state.send_replace(state);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Enter `Connecting`. Starting from a terminal state rearms the budget.
    pub fn begin_attempt(&mut self) {
        if matches!(self.state(), ConnectState::Idle | ConnectState::Connected | ConnectState::Failed) {
            self.remaining = self.max_attempts;
        }
        self.set_state(ConnectState::Connecting);
    }

    pub fn record_success(&mut self) {
        self.set_state(ConnectState::Connected);
    }

    /// Returns `true` when another attempt is allowed.
    pub fn record_failure(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.set_state(ConnectState::Failed);
            false
        } else {
            self.set_state(ConnectState::Retrying(self.remaining));
            true
        }
    }

    /// Drive `attempt` until it succeeds or the budget runs out.
    pub async fn run<F, Fut, T>(&mut self, mut attempt: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.set_state(ConnectState::Idle);
        loop {
            self.begin_attempt();
            let number = self.max_attempts - self.remaining + 1;
            debug!(attempt = number, "connecting to database");
            match attempt().await {
                Ok(value) => {
                    self.record_success();
                    info!(attempt = number, "database connection established");
                    return Ok(value);
                }
                Err(err) => {
                    let retry = self.record_failure();
                    warn!(attempt = number, remaining = self.remaining, error = %err, "database connection attempt failed");
                    if !retry {
                        return Err(ServiceError::ConnectExhausted {
                            attempts: self.max_attempts,
                            last_error: err.to_string(),
                        });
                    }
                    sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn failures_count_down_to_failed() {
        let mut retry = ConnectRetry::new(3, Duration::from_secs(3));
        assert_eq!(retry.state(), ConnectState::Idle);

        retry.begin_attempt();
        assert_eq!(retry.state(), ConnectState::Connecting);
        assert!(retry.record_failure());
        assert_eq!(retry.state(), ConnectState::Retrying(2));

        retry.begin_attempt();
        assert!(retry.record_failure());
        assert_eq!(retry.state(), ConnectState::Retrying(1));

        retry.begin_attempt();
        assert!(!retry.record_failure());
        assert_eq!(retry.state(), ConnectState::Failed);
        assert_eq!(retry.remaining(), 0);
    }

    #[test]
    fn failed_state_rearms_on_next_attempt() {
        let mut retry = ConnectRetry::new(1, Duration::from_millis(1));
        retry.begin_attempt();
        assert!(!retry.record_failure());
        retry.begin_attempt();
        assert_eq!(retry.remaining(), 1);
        retry.record_success();
        assert_eq!(retry.state(), ConnectState::Connected);
    }

    #[test]
    fn subscribers_see_each_transition() {
        let mut retry = ConnectRetry::new(2, Duration::ZERO);
        let rx = retry.subscribe();
        retry.begin_attempt();
        assert_eq!(*rx.borrow(), ConnectState::Connecting);
        retry.record_failure();
        assert_eq!(*rx.borrow(), ConnectState::Retrying(1));
        retry.begin_attempt();
        retry.record_success();
        assert_eq!(*rx.borrow(), ConnectState::Connected);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(ConnectRetry::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts_with_fixed_delay() {
        let mut retry = ConnectRetry::new(5, Duration::from_secs(3));
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = retry
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::Connect("connection refused".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(12));
        assert_eq!(retry.state(), ConnectState::Failed);
        match result {
            Err(ServiceError::ConnectExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_first_success() {
        let mut retry = ConnectRetry::new(5, Duration::from_secs(3));
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let value = retry
            .run(|| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err(ServiceError::Connect("not yet".into())) } else { Ok(n) }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(retry.state(), ConnectState::Connected);
        assert_eq!(retry.remaining(), 3);
    }
}
