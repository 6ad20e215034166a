use std::time::Duration;
use thiserror::Error;

use crate::evidence::Layer;

/// Invalid weight table / thresholds / registry. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no weight configured for layer `{0}`")]
    MissingWeight(Layer),

    #[error("weight configured for unrecognized layer `{0}`")]
    UnknownLayer(String),

    #[error("weight for layer `{layer}` must be finite and non-negative, got {weight}")]
    InvalidWeight { layer: Layer, weight: f64 },

    #[error("layer weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("verdict thresholds must satisfy 0 < likelyAuthentic ({likely_authentic}) < authentic ({authentic}) <= 100")]
    Thresholds { authentic: u8, likely_authentic: u8 },

    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("layer `{0}` has a weight but no registered probe")]
    MissingProbe(Layer),

    #[error("layer `{0}` is registered more than once")]
    DuplicateProbe(Layer),

    #[error("environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Transport-level failure talking to the remote classifier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classifier service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("classification rejected: {0}")]
    Rejected(String),

    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("asset of {size} bytes exceeds classifier limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

/// Any single-layer fault. Always recovered into an `unknown` layer.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe panicked: {0}")]
    Panicked(String),

    #[error("could not decode asset: {0}")]
    Decode(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Digest/signature/persistence fault while embedding. No partial record is
/// returned and no partial artifact is left behind.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("asset is empty")]
    EmptyAsset,

    #[error("signing payload could not be encoded: {0}")]
    Encoding(#[from] bcs::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger anchoring failed: {0}")]
    Ledger(String),

    #[error("writing watermarked artifact failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
