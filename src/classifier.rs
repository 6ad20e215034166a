//! Client for the remote AI-generated-content classifier.
//!
//! The classifier is an opaque capability: upload the asset, receive a label
//! and a confidence. It sits behind [`Classifier`] so tests inject a
//! deterministic stub instead of a network call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::asset::Asset;
use crate::error::ClassifierError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    /// Confidence in `label`, within `0.0..=1.0`.
    pub confidence: f64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, asset: &Asset) -> Result<Classification, ClassifierError>;
}

/// Accepted response bodies: the narrow `{label, confidence}` contract, or the
/// inference service's native payload (probabilities in percent).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Labelled {
        label: Label,
        confidence: f64,
    },
    Native {
        prediction: Label,
        real_probability: f64,
        fake_probability: f64,
    },
}

impl ClassifierResponse {
    fn into_classification(self) -> Result<Classification, ClassifierError> {
        let classification = match self {
            ClassifierResponse::Labelled { label, confidence } => Classification { label, confidence },
            ClassifierResponse::Native {
                prediction,
                real_probability,
                fake_probability,
            } => {
                let percent = match prediction {
                    Label::Real => real_probability,
                    Label::Fake => fake_probability,
                };
                Classification {
                    label: prediction,
                    confidence: percent / 100.0,
                }
            }
        };

        if !(0.0..=1.0).contains(&classification.confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} outside 0..=1",
                classification.confidence
            )));
        }
        Ok(classification)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// HTTP implementation: one multipart POST (`file` field) per asset.
///
/// Never retries: a failed exchange surfaces as an error and the caller
/// re-runs the whole verification.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    max_payload: usize,
}

impl HttpClassifier {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_PAYLOAD: usize = 50 * 1024 * 1024;

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_payload: Self::DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    async fn send(&self, asset: &Asset) -> Result<Classification, ClassifierError> {
        let mime = asset
            .format()
            .map(|format| format.mime())
            .unwrap_or("application/octet-stream");
        let part = reqwest::multipart::Part::bytes(asset.bytes().to_vec())
            .file_name(asset.file_name())
            .mime_str(mime)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.detail.or(body.message))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            return Err(ClassifierError::Rejected(format!("{}: {}", status.as_u16(), reason)));
        }

        let body: ClassifierResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        body.into_classification()
    }

    fn transport_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.timeout)
        } else if e.is_decode() {
            ClassifierError::InvalidResponse(e.to_string())
        } else {
            ClassifierError::ServiceUnavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, asset: &Asset) -> Result<Classification, ClassifierError> {
        if asset.size() > self.max_payload {
            return Err(ClassifierError::PayloadTooLarge {
                size: asset.size(),
                max: self.max_payload,
            });
        }

        debug!(endpoint = %self.endpoint, digest = %asset.digest(), size = asset.size(), "classifying asset");

        // Hard bound on the whole exchange, body download included.
        match tokio::time::timeout(self.timeout, self.send(asset)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        }
    }
}
