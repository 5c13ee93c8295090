use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::TransportError;

/// Bounded retry for establishing a bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Runs `connect` until it succeeds or the policy runs out of attempts.
///
/// # Errors
///
/// Returns [`TransportError::ConnectExhausted`] wrapping the last failure when
/// every attempt fails.
pub async fn connect_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt: u32 = 1;
    loop {
        match connect(attempt).await {
            Ok(connected) => {
                if attempt > 1 {
                    info!("Connected on attempt {}/{}", attempt, attempts);
                }
                return Ok(connected);
            }
            Err(err) if attempt >= attempts => {
                return Err(TransportError::ConnectExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                warn!("Connect attempt {}/{} failed: {}", attempt, attempts, err);
                sleep(policy.delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
