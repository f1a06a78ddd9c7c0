/// Distribution start-up handshake tests

use async_trait::async_trait;
use odds_feed::{
    ControlPlaneError, DistributionApi, DistributionController, DistributionError,
    DistributionState, DistributionStatus, RetryPolicy,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Reply {
    Status(bool),
    Fail(u16),
}

/// Control plane that replays a scripted sequence of status replies
#[derive(Default)]
struct ScriptedApi {
    replies: Mutex<VecDeque<Reply>>,
    status_calls: AtomicUsize,
    start_calls: AtomicUsize,
    fail_start: bool,
    cancel_on_start: Option<CancellationToken>,
}

impl ScriptedApi {
    fn new(replies: Vec<Reply>) -> Self {
        ScriptedApi {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    fn statuses(statuses: &[bool]) -> Self {
        Self::new(statuses.iter().map(|on| Reply::Status(*on)).collect())
    }

    fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistributionApi for ScriptedApi {
    async fn distribution_status(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<DistributionStatus, ControlPlaneError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Status(is_on)) => Ok(DistributionStatus {
                is_on,
                ..Default::default()
            }),
            Some(Reply::Fail(status)) => Err(ControlPlaneError::Status { status }),
            None => Ok(DistributionStatus::default()),
        }
    }

    async fn start_distribution(&self, _cancel: &CancellationToken) -> Result<(), ControlPlaneError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_start {
            token.cancel();
        }
        if self.fail_start {
            return Err(ControlPlaneError::Rejected("package is suspended".to_string()));
        }
        Ok(())
    }
}

fn no_delay(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        retry_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_already_on_needs_no_start() {
    let api = Arc::new(ScriptedApi::statuses(&[true]));
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    controller.ensure_started(&CancellationToken::new()).await.unwrap();

    assert_eq!(controller.state(), DistributionState::Ready);
    assert_eq!(api.status_calls(), 1);
    assert_eq!(api.start_calls(), 0);
}

#[tokio::test]
async fn test_off_then_on_starts_once() {
    let api = Arc::new(ScriptedApi::statuses(&[false, true]));
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    controller.ensure_started(&CancellationToken::new()).await.unwrap();

    assert_eq!(controller.state(), DistributionState::Ready);
    assert_eq!(api.status_calls(), 2);
    assert_eq!(api.start_calls(), 1);
}

#[tokio::test]
async fn test_always_off_exhausts_retries() {
    let api = Arc::new(ScriptedApi::statuses(&[false; 5]));
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    let err = controller
        .ensure_started(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DistributionError::RetriesExhausted { attempts: 5 }));
    assert_eq!(controller.state(), DistributionState::Failed);
    assert_eq!(api.status_calls(), 5);
    assert_eq!(api.start_calls(), 5);
}

#[tokio::test]
async fn test_attempt_bound_follows_policy() {
    let api = Arc::new(ScriptedApi::statuses(&[false; 10]));
    let mut controller = DistributionController::new(api.clone(), no_delay(2));

    let err = controller
        .ensure_started(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DistributionError::RetriesExhausted { attempts: 2 }));
    assert_eq!(api.start_calls(), 2);
}

#[tokio::test]
async fn test_exhaustion_does_not_wait_after_last_attempt() {
    let api = Arc::new(ScriptedApi::statuses(&[false; 2]));
    let policy = RetryPolicy {
        max_attempts: 1,
        retry_delay: Duration::from_secs(3600),
    };
    let mut controller = DistributionController::new(api.clone(), policy);

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        controller.ensure_started(&CancellationToken::new()),
    )
    .await
    .expect("exhaustion should be reported without a trailing delay")
    .unwrap_err();

    assert!(matches!(err, DistributionError::RetriesExhausted { attempts: 1 }));
    assert_eq!(api.start_calls(), 1);
}

#[tokio::test]
async fn test_cancel_after_last_start_still_reports_exhaustion() {
    let cancel = CancellationToken::new();
    let mut api = ScriptedApi::statuses(&[false]);
    api.cancel_on_start = Some(cancel.clone());
    let api = Arc::new(api);
    let policy = RetryPolicy {
        max_attempts: 1,
        retry_delay: Duration::from_secs(3600),
    };
    let mut controller = DistributionController::new(api.clone(), policy);

    let err = controller.ensure_started(&cancel).await.unwrap_err();

    assert!(matches!(err, DistributionError::RetriesExhausted { attempts: 1 }));
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let api = Arc::new(ScriptedApi::statuses(&[false, true]));
    let mut controller = DistributionController::new(api.clone(), no_delay(5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = controller.ensure_started(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(api.status_calls(), 0);
    assert_eq!(api.start_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_mid_handshake_stops_before_next_check() {
    let cancel = CancellationToken::new();
    let mut api = ScriptedApi::statuses(&[false, true]);
    api.cancel_on_start = Some(cancel.clone());
    let api = Arc::new(api);
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    let err = controller.ensure_started(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(api.status_calls(), 1);
    assert_eq!(api.start_calls(), 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_delay() {
    let api = Arc::new(ScriptedApi::statuses(&[false; 5]));
    let policy = RetryPolicy {
        max_attempts: 5,
        retry_delay: Duration::from_secs(3600),
    };
    let mut controller = DistributionController::new(api.clone(), policy);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), controller.ensure_started(&cancel))
        .await
        .expect("cancellation should interrupt the retry delay")
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(api.start_calls(), 1);
}

#[tokio::test]
async fn test_status_failure_is_wrapped() {
    let api = Arc::new(ScriptedApi::new(vec![Reply::Fail(503)]));
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    let err = controller
        .ensure_started(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DistributionError::ControlPlane { source } => {
            assert!(matches!(source, ControlPlaneError::Status { status: 503 }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(api.start_calls(), 0);
}

#[tokio::test]
async fn test_start_failure_is_wrapped() {
    let mut api = ScriptedApi::statuses(&[false]);
    api.fail_start = true;
    let api = Arc::new(api);
    let mut controller = DistributionController::new(api.clone(), no_delay(5));

    let err = controller
        .ensure_started(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DistributionError::ControlPlane { .. }));
    assert!(!err.is_cancelled());
    assert!(err.to_string().contains("package is suspended"));
    assert_eq!(controller.state(), DistributionState::Failed);
}
