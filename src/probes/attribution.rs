use async_trait::async_trait;
use std::sync::Arc;

use crate::asset::{Asset, MediaKind};
use crate::error::ProbeFailure;
use crate::evidence::{keys, Layer, LayerResult};
use crate::fingerprint;
use crate::probes::{blocking, Probe};
use crate::store::{AttributionEntry, AttributionRegistry};

/// Maximum Hamming distance (of 64 bits) for a perceptual near-duplicate.
pub const NEAR_DUPLICATE_DISTANCE: u32 = 6;

/// Resolves creator and licensing through the attribution registry.
pub struct SourceAttributionProbe {
    registry: AttributionRegistry,
}

impl SourceAttributionProbe {
    pub fn new(registry: AttributionRegistry) -> Self {
        Self { registry }
    }
}

fn with_entry(result: LayerResult, entry: &AttributionEntry) -> LayerResult {
    let result = result
        .with_detail(keys::CREATOR, entry.creator.clone())
        .with_detail(keys::SOURCE, entry.source.clone())
        .with_detail("registeredAt", entry.registered_at.clone());
    match &entry.license {
        Some(license) => result.with_detail("license", license.clone()),
        None => result,
    }
}

#[async_trait]
impl Probe for SourceAttributionProbe {
    fn layer(&self) -> Layer {
        Layer::SourceAttribution
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        if let Some(entry) = self.registry.find_exact(asset.digest())? {
            return Ok(with_entry(
                LayerResult::pass(
                    Layer::SourceAttribution,
                    92,
                    format!("Original creator verified: {}", entry.creator),
                ),
                &entry,
            )
            .with_detail("match", "exact"));
        }

        if asset.kind() == MediaKind::Image {
            let bytes = asset.shared_bytes();
            // Undecodable images simply have no perceptual identity.
            let perceptual = blocking(move || Ok(fingerprint::perceptual_hash(&bytes).ok())).await?;
            if let Some(hash) = perceptual {
                if let Some((entry, distance)) = self.registry.find_similar(&hash, NEAR_DUPLICATE_DISTANCE)? {
                    return Ok(with_entry(
                        LayerResult::warning(
                            Layer::SourceAttribution,
                            70,
                            format!(
                                "Near-duplicate of a registered work by {} - content differs from the original",
                                entry.creator
                            ),
                        ),
                        &entry,
                    )
                    .with_detail("match", "perceptual")
                    .with_detail("distance", distance as u64)
                    .with_detail("originalDigest", entry.digest.clone()));
                }
            }
        }

        Ok(LayerResult::warning(
            Layer::SourceAttribution,
            55,
            "Source attribution unavailable - usage rights cannot be confirmed",
        )
        .with_detail("match", "none"))
    }
}
