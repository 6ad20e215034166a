//! Aggregation engine: folds independent layer results into one trust score,
//! a verdict tier and a prioritized list of recommendations.
//!
//! Everything here is a pure function of the layer results and the validated
//! settings; no clocks, no I/O, no randomness.

use chrono::{DateTime, Utc};

use crate::config::{LayerWeights, Settings, VerdictThresholds};
use crate::error::ConfigError;
use crate::evidence::{keys, Layer, LayerResult, LayerStatus};
use crate::report::{LayerSummary, Priority, Recommendation, Verdict, VerificationReport};

const SCORE_SNAP: f64 = 1e6;

impl VerdictThresholds {
    pub fn verdict(&self, score: u8) -> Verdict {
        if score >= self.authentic {
            Verdict::Authentic
        } else if score >= self.likely_authentic {
            Verdict::LikelyAuthentic
        } else {
            Verdict::Questionable
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    weights: LayerWeights,
    thresholds: VerdictThresholds,
    unknown_baseline: u8,
}

impl Aggregator {
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let weights = settings.validate()?;
        Ok(Self {
            weights,
            thresholds: settings.verdict_thresholds,
            unknown_baseline: settings.unknown_baseline_confidence,
        })
    }

    pub fn weights(&self) -> &LayerWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> VerdictThresholds {
        self.thresholds
    }

    pub fn unknown_baseline(&self) -> u8 {
        self.unknown_baseline
    }

    /// Resolve the weight of every layer up front. A layer without a weight
    /// is a configuration error, never a silent zero.
    pub fn weights_for(&self, layers: impl IntoIterator<Item = Layer>) -> Result<Vec<f64>, ConfigError> {
        layers
            .into_iter()
            .map(|layer| self.weights.get(layer).ok_or(ConfigError::MissingWeight(layer)))
            .collect()
    }

    pub fn aggregate(&self, layers: &[LayerResult]) -> Result<VerificationReport, ConfigError> {
        let weights = self.weights_for(layers.iter().map(|layer| layer.name))?;
        Ok(self.aggregate_weighted(layers, &weights))
    }

    /// Aggregate with weights already resolved (slot `i` weighs `layers[i]`).
    pub(crate) fn aggregate_weighted(&self, layers: &[LayerResult], weights: &[f64]) -> VerificationReport {
        let trust_score = self.score_weighted(layers, weights);
        let verdict = self.thresholds.verdict(trust_score);
        let modification_count = modification_count(layers);
        let recommendations = recommend(layers, verdict, modification_count);

        VerificationReport {
            trust_score,
            verdict,
            layers: layers.to_vec(),
            summary: LayerSummary::count(layers),
            source: source(layers),
            creator: creator(layers),
            captured_at: captured_at(layers),
            modification_count,
            recommendations,
        }
    }

    fn normalized_confidence(&self, layer: &LayerResult) -> f64 {
        match layer.status {
            LayerStatus::Pass => layer.confidence as f64,
            LayerStatus::Warning => layer.confidence as f64 * 0.5,
            LayerStatus::Fail => 0.0,
            // Unavailable evidence is neutral, not damning.
            LayerStatus::Unknown => self.unknown_baseline as f64,
        }
    }

    fn score_weighted(&self, layers: &[LayerResult], weights: &[f64]) -> u8 {
        let sum: f64 = layers
            .iter()
            .zip(weights)
            .map(|(layer, weight)| weight * self.normalized_confidence(layer))
            .sum();
        // Snap float drift first so an exact .5 still rounds away from zero.
        let snapped = (sum * SCORE_SNAP).round() / SCORE_SNAP;
        snapped.round().clamp(0.0, 100.0) as u8
    }
}

fn find(layers: &[LayerResult], name: Layer) -> Option<&LayerResult> {
    layers.iter().find(|layer| layer.name == name)
}

fn status_of(layers: &[LayerResult], name: Layer) -> Option<LayerStatus> {
    find(layers, name).map(|layer| layer.status)
}

fn modification_count(layers: &[LayerResult]) -> u32 {
    let total: u64 = layers
        .iter()
        .filter_map(|layer| layer.detail_u64(keys::MODIFICATIONS))
        .sum();
    u32::try_from(total).unwrap_or(u32::MAX)
}

fn creator(layers: &[LayerResult]) -> Option<String> {
    find(layers, Layer::Watermark)
        .filter(|layer| layer.status == LayerStatus::Pass)
        .and_then(|layer| layer.detail_str(keys::ISSUER))
        .or_else(|| find(layers, Layer::SourceAttribution).and_then(|layer| layer.detail_str(keys::CREATOR)))
        .map(str::to_string)
}

fn source(layers: &[LayerResult]) -> Option<String> {
    find(layers, Layer::SourceAttribution)
        .and_then(|layer| layer.detail_str(keys::SOURCE))
        .or_else(|| {
            find(layers, Layer::Watermark)
                .filter(|layer| layer.status == LayerStatus::Pass)
                .and_then(|layer| layer.detail_str(keys::STANDARD))
        })
        .map(str::to_string)
}

fn captured_at(layers: &[LayerResult]) -> Option<DateTime<Utc>> {
    find(layers, Layer::Watermark)
        .filter(|layer| layer.status == LayerStatus::Pass)
        .and_then(|layer| layer.detail_str(keys::TIMESTAMP))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn recommendation(priority: Priority, layer: Option<Layer>, message: &str, action: &str) -> Recommendation {
    Recommendation {
        priority,
        message: message.to_string(),
        action: action.to_string(),
        layer,
    }
}

/// Fixed rule table. Rules fire independently; the output is ordered by
/// priority, rule order breaking ties.
fn recommend(layers: &[LayerResult], verdict: Verdict, modification_count: u32) -> Vec<Recommendation> {
    let watermark = status_of(layers, Layer::Watermark);
    let mut recommendations = Vec::new();

    if verdict == Verdict::Questionable {
        recommendations.push(recommendation(
            Priority::Critical,
            None,
            "Content authenticity is questionable - verify source before use",
            "Cross-reference with the original source or contact the creator directly",
        ));
    }

    if watermark == Some(LayerStatus::Fail) {
        recommendations.push(recommendation(
            Priority::High,
            Some(Layer::Watermark),
            "No valid provenance watermark - add provenance watermark for future authentication",
            "Embed a signed provenance record at capture or export time",
        ));
    }

    if status_of(layers, Layer::AiDetection) == Some(LayerStatus::Fail) {
        recommendations.push(recommendation(
            Priority::High,
            Some(Layer::AiDetection),
            "Strong indicators of AI-generated or manipulated content",
            "Require human review before publication",
        ));
    }

    let compression_flagged = matches!(
        status_of(layers, Layer::CompressionArtifacts),
        Some(LayerStatus::Warning | LayerStatus::Fail)
    );
    if modification_count > 0 || compression_flagged {
        recommendations.push(recommendation(
            Priority::Medium,
            Some(Layer::CompressionArtifacts),
            "Editing detected - ensure modifications are disclosed if publishing",
            "Add an editorial note describing the adjustments",
        ));
    }

    if layers.iter().any(|layer| layer.status == LayerStatus::Unknown) {
        recommendations.push(recommendation(
            Priority::Medium,
            None,
            "Some evidence layers were unavailable - the score relies on neutral defaults",
            "Re-run verification once all evidence services are reachable",
        ));
    }

    if watermark == Some(LayerStatus::Pass) && verdict == Verdict::Authentic {
        recommendations.push(recommendation(
            Priority::Info,
            Some(Layer::Watermark),
            "Content is verified authentic with strong provenance",
            "Safe to use with proper attribution to the original creator",
        ));
    }

    // Stable: rule order is kept within a priority.
    recommendations.sort_by_key(|rec| rec.priority);
    recommendations
}
