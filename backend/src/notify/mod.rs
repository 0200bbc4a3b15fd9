pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use shared::{Case, CaseStatus, RiskTier};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use webhook::WebhookNotifier;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),
    #[error("Notification endpoint returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationKind {
    UrgentCase,
    Escalated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub kind: EscalationKind,
    pub case_id: Uuid,
    pub patient_id: String,
    pub risk_tier: RiskTier,
    pub status: CaseStatus,
    pub occurred_at: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn for_case(kind: EscalationKind, case: &Case) -> Self {
        Self {
            kind,
            case_id: case.id,
            patient_id: case.patient_id.clone(),
            risk_tier: case.risk_assessment.risk_tier,
            status: case.status,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError>;
}

/// Default notifier: writes the event to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        info!(
            "Escalation {:?}: case {} (patient {}) tier {} status {}",
            event.kind, event.case_id, event.patient_id, event.risk_tier, event.status
        );
        Ok(())
    }
}

/// Fire-and-forget delivery with bounded retries. Failures are logged and dropped.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            notifier,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn log_only() -> Self {
        Self::new(Arc::new(LogNotifier), 1, Duration::ZERO)
    }

    /// Spawns delivery on the runtime and returns immediately.
    pub fn dispatch(&self, event: EscalationEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.deliver(&event).await;
        });
    }

    /// Returns whether any attempt succeeded.
    pub async fn deliver(&self, event: &EscalationEvent) -> bool {
        for attempt in 1..=self.max_attempts {
            match self.notifier.notify(event).await {
                Ok(()) => return true,
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "Notification for case {} failed (attempt {}/{}): {}",
                        event.case_id, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    error!(
                        "Dropping notification for case {} after {} attempts: {}",
                        event.case_id, attempt, e
                    );
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyNotifier {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, _event: &EscalationEvent) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(NotifyError::Status(503));
            }
            Ok(())
        }
    }

    fn event() -> EscalationEvent {
        EscalationEvent {
            kind: EscalationKind::Escalated,
            case_id: Uuid::new_v4(),
            patient_id: "p1".into(),
            risk_tier: RiskTier::High,
            status: CaseStatus::Escalated,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 3, Duration::ZERO);
        assert!(dispatcher.deliver(&event()).await);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 2, Duration::ZERO);
        assert!(!dispatcher.deliver(&event()).await);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_serializes_with_screaming_kind() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["kind"], "ESCALATED");
        assert_eq!(json["risk_tier"], "HIGH");
    }
}
