use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::{Layer, LayerResult, LayerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Authentic,
    LikelyAuthentic,
    Questionable,
}

/// Recommendation priority. Declaration order is emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub message: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub unknown: usize,
}

impl LayerSummary {
    pub fn count(layers: &[LayerResult]) -> Self {
        layers.iter().fold(
            LayerSummary {
                total: layers.len(),
                ..Default::default()
            },
            |mut summary, layer| {
                match layer.status {
                    LayerStatus::Pass => summary.passed += 1,
                    LayerStatus::Warning => summary.warnings += 1,
                    LayerStatus::Fail => summary.failed += 1,
                    LayerStatus::Unknown => summary.unknown += 1,
                }
                summary
            },
        )
    }
}

/// Composite authenticity verdict for one asset. Immutable once built; may be
/// persisted by an external store keyed by the asset digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub trust_score: u8,
    pub verdict: Verdict,
    pub layers: Vec<LayerResult>,
    pub summary: LayerSummary,
    pub source: Option<String>,
    pub creator: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub modification_count: u32,
    pub recommendations: Vec<Recommendation>,
}

impl VerificationReport {
    pub fn layer(&self, layer: Layer) -> Option<&LayerResult> {
        self.layers.iter().find(|result| result.name == layer)
    }

    pub fn recommendations_with(&self, priority: Priority) -> impl Iterator<Item = &Recommendation> {
        self.recommendations
            .iter()
            .filter(move |rec| rec.priority == priority)
    }
}
