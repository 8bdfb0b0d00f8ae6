use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// Fails fast once a downstream dependency keeps failing.
///
/// After `failure_threshold` consecutive failures the circuit opens. Once
/// `reset_timeout` has elapsed a single trial call is let through; its outcome
/// closes or re-opens the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    reset_timeout: Duration,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Whether a call may go through right now.
    pub async fn check(&self) -> bool {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitState::Closed => return true,
                CircuitState::HalfOpen => return false,
                CircuitState::Open => {}
            }
        }

        let mut inner = self.inner.write().await;
        let cooled = inner
            .opened_at
            .map(|at| at.elapsed() >= self.reset_timeout)
            .unwrap_or(true);
        if inner.state == CircuitState::Open && cooled {
            inner.state = CircuitState::HalfOpen;
            info!("Circuit breaker [{}] half-open, probing", self.name);
            return true;
        }
        false
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != CircuitState::Closed {
            info!("Circuit breaker [{}] closed", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        if inner.state == CircuitState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                error!(
                    "Circuit breaker [{}] opened after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}
