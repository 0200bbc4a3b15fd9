use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, error};
use reqwest::Client;
use shared::{InferenceRequest, InferenceResponse, LabelProbability};
use std::time::Duration;
use url::Url;

use super::{Classifier, ClassifierError};

/// Remote classifier reached over HTTP with a JSON body carrying the base64 image.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<LabelProbability>, ClassifierError> {
        let request = InferenceRequest {
            image_data: STANDARD.encode(image),
        };
        debug!(
            "Sending {} image bytes to classifier at {}",
            image.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    error!("Classifier request to {} failed: {:?}", self.endpoint, e);
                    ClassifierError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Classifier at {} returned {}", self.endpoint, status);
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let body: InferenceResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Decode(e.to_string())
            }
        })?;
        debug!("Classifier returned {} predictions", body.predictions.len());
        Ok(body.predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_configured_endpoint() {
        let endpoint = Url::parse("http://classifier.local:9000/predict").unwrap();
        let classifier = HttpClassifier::new(endpoint.clone(), Duration::from_secs(5)).unwrap();
        assert_eq!(classifier.endpoint(), &endpoint);
    }
}
