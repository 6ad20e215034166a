use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One evidentiary dimension of a verification pass.
///
/// **Closed set**: the registry, the weight table and the recommendation
/// rules all key off this enum, so adding a layer is a compile-time change
/// rather than a runtime plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Watermark,
    Metadata,
    AiDetection,
    BlockchainProvenance,
    CompressionArtifacts,
    SourceAttribution,
}

impl Layer {
    /// Default probe order, which is also the order of `VerificationReport::layers`.
    pub const ALL: [Layer; 6] = [
        Layer::Watermark,
        Layer::Metadata,
        Layer::AiDetection,
        Layer::BlockchainProvenance,
        Layer::CompressionArtifacts,
        Layer::SourceAttribution,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Layer::Watermark => "watermark",
            Layer::Metadata => "metadata",
            Layer::AiDetection => "ai_detection",
            Layer::BlockchainProvenance => "blockchain_provenance",
            Layer::CompressionArtifacts => "compression_artifacts",
            Layer::SourceAttribution => "source_attribution",
        }
    }

    /// Human readable title shown next to the layer.
    pub fn title(&self) -> &'static str {
        match self {
            Layer::Watermark => "Provenance Watermark Detection",
            Layer::Metadata => "Forensic Metadata Analysis",
            Layer::AiDetection => "AI Deepfake Detection",
            Layer::BlockchainProvenance => "Blockchain Provenance",
            Layer::CompressionArtifacts => "Error Level Analysis (ELA)",
            Layer::SourceAttribution => "Source Attribution & Licensing",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layer::ALL
            .iter()
            .copied()
            .find(|layer| layer.key() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Pass,
    Warning,
    Fail,
    Unknown,
}

/// Opaque, deterministic key/value evidence attached to a layer.
pub type EvidenceDetails = BTreeMap<String, Value>;

/// Well-known detail keys read back by the aggregation engine.
pub mod keys {
    pub const ISSUER: &str = "issuer";
    pub const TIMESTAMP: &str = "timestamp";
    pub const STANDARD: &str = "standard";
    pub const CREATOR: &str = "creator";
    pub const SOURCE: &str = "source";
    pub const MODIFICATIONS: &str = "modifications";
}

/// Result of exactly one probe for one verification pass. Never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerResult {
    pub name: Layer,
    pub title: String,
    pub status: LayerStatus,
    /// 0..=100, where 0 is reserved for "not applicable".
    pub confidence: u8,
    pub explanation: String,
    #[serde(default)]
    pub evidence_details: EvidenceDetails,
}

impl LayerResult {
    fn new(name: Layer, status: LayerStatus, confidence: u8, explanation: impl Into<String>) -> Self {
        Self {
            name,
            title: name.title().to_string(),
            status,
            confidence: confidence.min(100),
            explanation: explanation.into(),
            evidence_details: EvidenceDetails::new(),
        }
    }

    pub fn pass(name: Layer, confidence: u8, explanation: impl Into<String>) -> Self {
        Self::new(name, LayerStatus::Pass, confidence, explanation)
    }

    pub fn warning(name: Layer, confidence: u8, explanation: impl Into<String>) -> Self {
        Self::new(name, LayerStatus::Warning, confidence, explanation)
    }

    pub fn fail(name: Layer, confidence: u8, explanation: impl Into<String>) -> Self {
        Self::new(name, LayerStatus::Fail, confidence, explanation)
    }

    /// `unknown` always carries confidence 0.
    pub fn unknown(name: Layer, explanation: impl Into<String>) -> Self {
        Self::new(name, LayerStatus::Unknown, 0, explanation)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.evidence_details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.evidence_details.get(key).and_then(Value::as_str)
    }

    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.evidence_details.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_keys_round_trip_through_from_str() {
        for layer in Layer::ALL {
            assert_eq!(layer.key().parse::<Layer>(), Ok(layer));
        }
        assert!("exif".parse::<Layer>().is_err());
    }

    #[test]
    fn unknown_layers_are_not_applicable() {
        let result = LayerResult::unknown(Layer::Metadata, "probe crashed");
        assert_eq!(result.status, LayerStatus::Unknown);
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn confidence_is_capped_at_one_hundred() {
        assert_eq!(LayerResult::pass(Layer::Watermark, 250, "x").confidence, 100);
    }

    #[test]
    fn serializes_with_camel_case_and_snake_case_layer_names() {
        let result = LayerResult::pass(Layer::AiDetection, 91, "ok").with_detail("model", "v4");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "ai_detection");
        assert_eq!(json["status"], "pass");
        assert_eq!(json["evidenceDetails"]["model"], "v4");
    }
}
