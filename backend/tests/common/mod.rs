//! Shared fixtures for the backend integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lesion_backend::cases::LifecycleManager;
use lesion_backend::classifier::{Classifier, ClassifierError};
use lesion_backend::db::InMemoryCaseStore;
use lesion_backend::notify::{EscalationEvent, NotificationDispatcher, Notifier, NotifyError};
use lesion_backend::risk::RiskEngine;
use shared::LabelProbability;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// CLASSIFIERS
// =============================================================================

/// Always answers with the same distribution.
pub struct StaticClassifier {
    predictions: Vec<LabelProbability>,
}

impl StaticClassifier {
    pub fn new(predictions: Vec<LabelProbability>) -> Self {
        Self { predictions }
    }

    /// Puts `confidence` on `label` and spreads the rest over NEV/SEK.
    pub fn top(label: &str, confidence: f64) -> Self {
        Self::new(distribution(label, confidence))
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Vec<LabelProbability>, ClassifierError> {
        Ok(self.predictions.clone())
    }
}

/// Sleeps longer than any test timeout.
pub struct SlowClassifier(pub Duration);

#[async_trait]
impl Classifier for SlowClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Vec<LabelProbability>, ClassifierError> {
        tokio::time::sleep(self.0).await;
        Ok(distribution("NEV", 0.9))
    }
}

pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Vec<LabelProbability>, ClassifierError> {
        Err(ClassifierError::Status(503))
    }
}

pub fn distribution(label: &str, confidence: f64) -> Vec<LabelProbability> {
    let filler: Vec<&str> = ["NEV", "SEK", "ACK"]
        .into_iter()
        .filter(|l| !l.eq_ignore_ascii_case(label))
        .take(2)
        .collect();
    let rest = (1.0 - confidence) / filler.len() as f64;
    let mut predictions = vec![LabelProbability {
        label: label.to_string(),
        probability: confidence,
    }];
    predictions.extend(filler.into_iter().map(|l| LabelProbability {
        label: l.to_string(),
        probability: rest,
    }));
    predictions
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Forwards every event to a channel so tests can await delivery.
pub struct ChannelNotifier(pub mpsc::UnboundedSender<EscalationEvent>);

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        self.0
            .send(event.clone())
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }
}

pub async fn next_event(
    events: &mut mpsc::UnboundedReceiver<EscalationEvent>,
) -> Option<EscalationEvent> {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .ok()
        .flatten()
}

// =============================================================================
// HARNESS
// =============================================================================

pub struct Harness {
    pub lifecycle: LifecycleManager,
    pub store: Arc<InMemoryCaseStore>,
    pub events: mpsc::UnboundedReceiver<EscalationEvent>,
}

pub fn harness(classifier: impl Classifier + 'static) -> Harness {
    let store = Arc::new(InMemoryCaseStore::new());
    let (tx, events) = mpsc::unbounded_channel();
    let notifications =
        NotificationDispatcher::new(Arc::new(ChannelNotifier(tx)), 1, Duration::ZERO);
    let lifecycle = LifecycleManager::new(
        store.clone(),
        RiskEngine::default(),
        Arc::new(classifier),
        notifications,
    )
    .with_classifier_timeout(Duration::from_millis(200));
    Harness {
        lifecycle,
        store,
        events,
    }
}

pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4]
}
