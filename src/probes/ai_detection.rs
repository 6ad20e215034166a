use async_trait::async_trait;
use std::sync::Arc;

use crate::asset::{Asset, MediaKind};
use crate::classifier::{Classification, Classifier, Label};
use crate::error::ProbeFailure;
use crate::evidence::{Layer, LayerResult};
use crate::probes::Probe;

/// Delegates to the remote classifier and maps its label onto a layer status.
///
/// Transport failures are returned as errors and surface as an `unknown`
/// layer; the aggregation engine never sees them.
pub struct AiDetectionProbe {
    classifier: Arc<dyn Classifier>,
    fake_threshold: u8,
}

impl AiDetectionProbe {
    pub fn new(classifier: Arc<dyn Classifier>, fake_threshold: u8) -> Self {
        Self {
            classifier,
            fake_threshold,
        }
    }

    /// `confidence` in percent, clamped to 1..=100 since 0 means "not applicable".
    fn to_layer(&self, classification: Classification) -> LayerResult {
        let confidence = (classification.confidence * 100.0).round().clamp(1.0, 100.0) as u8;
        let result = match classification.label {
            Label::Real => LayerResult::pass(
                Layer::AiDetection,
                confidence,
                "No AI-generated artifacts detected in neural network analysis",
            ),
            Label::Fake if confidence >= self.fake_threshold => LayerResult::fail(
                Layer::AiDetection,
                confidence,
                "AI-generated or manipulated content detected with high confidence",
            ),
            Label::Fake => LayerResult::warning(
                Layer::AiDetection,
                confidence,
                "Potential AI manipulation indicators found - requires human review",
            ),
        };
        result
            .with_detail("label", format!("{:?}", classification.label).to_uppercase())
            .with_detail("classifierConfidence", classification.confidence)
            .with_detail("fakeThreshold", self.fake_threshold as u64)
    }
}

#[async_trait]
impl Probe for AiDetectionProbe {
    fn layer(&self) -> Layer {
        Layer::AiDetection
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        if asset.kind() == MediaKind::Video {
            return Ok(LayerResult::unknown(
                Layer::AiDetection,
                "Deepfake classifier only analyses still images",
            ));
        }
        let classification = self.classifier.classify(&asset).await?;
        Ok(self.to_layer(classification))
    }
}
