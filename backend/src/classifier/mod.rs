pub mod http_client;

use async_trait::async_trait;
use shared::LabelProbability;
use std::collections::HashSet;
use thiserror::Error;

pub use http_client::HttpClassifier;

const PROBABILITY_SUM_TOLERANCE: f64 = 0.01;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier timed out")]
    Timeout,
    #[error("Classifier transport error: {0}")]
    Transport(String),
    #[error("Classifier returned HTTP {0}")]
    Status(u16),
    #[error("Classifier response could not be decoded: {0}")]
    Decode(String),
}

/// Black-box image classifier returning a probability distribution over the label set.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Vec<LabelProbability>, ClassifierError>;
}

/// Checks that the classifier output is a usable probability distribution.
pub fn validate_predictions(predictions: &[LabelProbability]) -> Result<(), String> {
    if predictions.is_empty() {
        return Err("classifier returned no predictions".to_string());
    }
    let mut labels = HashSet::new();
    let mut total = 0.0;
    for prediction in predictions {
        let p = prediction.probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(format!(
                "probability for '{}' outside [0, 1]: {}",
                prediction.label, p
            ));
        }
        if !labels.insert(prediction.label.trim().to_ascii_lowercase()) {
            return Err(format!("duplicate label '{}'", prediction.label));
        }
        total += p;
    }
    if (total - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        return Err(format!("probabilities sum to {:.4}, expected 1", total));
    }
    Ok(())
}
