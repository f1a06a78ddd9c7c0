/// Distribution start-up handshake
///
/// Before a feed session consumes anything, the upstream distribution for the
/// package must be on. The controller polls the control plane, issues a start
/// request while it is off, and gives up after a bounded number of attempts.
///
///   Checking --on--> Ready
///   Checking --off--> Starting --> Checking   (up to max_attempts)
///   exhausted --> Failed

use crate::control_plane::DistributionApi;
use crate::error::{ControlPlaneError, DistributionError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionState {
    Checking,
    Starting,
    Ready,
    Failed,
}

impl fmt::Display for DistributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DistributionState::Checking => "checking",
            DistributionState::Starting => "starting",
            DistributionState::Ready => "ready",
            DistributionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct DistributionController {
    api: Arc<dyn DistributionApi>,
    policy: RetryPolicy,
    state: DistributionState,
}

impl DistributionController {
    pub fn new(api: Arc<dyn DistributionApi>, policy: RetryPolicy) -> Self {
        DistributionController {
            api,
            policy,
            state: DistributionState::Checking,
        }
    }

    pub fn state(&self) -> DistributionState {
        self.state
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Drive the handshake until distribution is on, retries run out, or `cancel` fires
    pub async fn ensure_started(&mut self, cancel: &CancellationToken) -> Result<(), DistributionError> {
        let result = self.run(cancel).await;
        self.transition(if result.is_ok() {
            DistributionState::Ready
        } else {
            DistributionState::Failed
        });
        result
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<(), DistributionError> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            self.transition(DistributionState::Checking);
            check_cancelled(cancel)?;

            let status = self
                .api
                .distribution_status(cancel)
                .await
                .map_err(wrap_control_plane)?;

            if status.is_on {
                tracing::info!(attempt, "distribution is already on");
                return Ok(());
            }

            tracing::info!(attempt, max_attempts, "distribution is off, starting it");
            self.transition(DistributionState::Starting);
            check_cancelled(cancel)?;

            self.api
                .start_distribution(cancel)
                .await
                .map_err(wrap_control_plane)?;

            if attempt < max_attempts {
                self.pause(cancel).await?;
            }
        }

        tracing::error!(max_attempts, "distribution did not start");
        Err(DistributionError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), DistributionError> {
        if self.policy.retry_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(DistributionError::Cancelled),
            _ = tokio::time::sleep(self.policy.retry_delay) => Ok(()),
        }
    }

    fn transition(&mut self, next: DistributionState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "distribution state");
            self.state = next;
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), DistributionError> {
    if cancel.is_cancelled() {
        Err(DistributionError::Cancelled)
    } else {
        Ok(())
    }
}

fn wrap_control_plane(err: ControlPlaneError) -> DistributionError {
    match err {
        ControlPlaneError::Cancelled => DistributionError::Cancelled,
        source => DistributionError::ControlPlane { source },
    }
}
