use async_trait::async_trait;
use image::GrayImage;
use std::sync::Arc;

use crate::asset::{Asset, MediaKind};
use crate::error::ProbeFailure;
use crate::evidence::{keys, Layer, LayerResult};
use crate::probes::{blocking, Probe};

const GRID: u32 = 4;
const MIN_SIDE: u32 = 32;
const OUTLIER_RATIO: f64 = 2.5;
const OUTLIER_FLOOR: f64 = 4.0;

/// Compression uniformity (error-level style) analysis.
///
/// Splices and local edits usually carry a different noise/compression
/// signature than their surroundings. The image is cut into a 4x4 grid and
/// each region's mean high-frequency residual is compared to the median of
/// all regions.
pub struct CompressionArtifactProbe;

/// Mean absolute residual of each pixel against the average of its right and
/// lower neighbours, per grid region (row-major).
pub(crate) fn region_residuals(luma: &GrayImage) -> Vec<f64> {
    let (width, height) = luma.dimensions();
    let mut sums = vec![0.0f64; (GRID * GRID) as usize];
    let mut counts = vec![0u64; (GRID * GRID) as usize];

    for y in 0..height.saturating_sub(1) {
        for x in 0..width.saturating_sub(1) {
            let p = luma.get_pixel(x, y)[0] as f64;
            let right = luma.get_pixel(x + 1, y)[0] as f64;
            let down = luma.get_pixel(x, y + 1)[0] as f64;
            let residual = (p - (right + down) / 2.0).abs();

            let gx = (x * GRID / width).min(GRID - 1);
            let gy = (y * GRID / height).min(GRID - 1);
            let idx = (gy * GRID + gx) as usize;
            sums[idx] += residual;
            counts[idx] += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(sum, count)| if *count == 0 { 0.0 } else { sum / *count as f64 })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub(crate) fn suspicious_regions(residuals: &[f64]) -> usize {
    let limit = median(residuals) * OUTLIER_RATIO + OUTLIER_FLOOR;
    residuals.iter().filter(|r| **r > limit).count()
}

fn inspect(asset: &Asset) -> Result<LayerResult, ProbeFailure> {
    let img = image::load_from_memory(asset.bytes()).map_err(|e| ProbeFailure::Decode(e.to_string()))?;
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();

    if width < MIN_SIDE || height < MIN_SIDE {
        return Ok(LayerResult::unknown(
            Layer::CompressionArtifacts,
            format!("Image too small for compression analysis ({}x{})", width, height),
        ));
    }

    let residuals = region_residuals(&luma);
    let suspicious = suspicious_regions(&residuals);
    let median_residual = (median(&residuals) * 100.0).round() / 100.0;

    let result = if suspicious == 0 {
        LayerResult::pass(
            Layer::CompressionArtifacts,
            91,
            "Uniform compression levels throughout - no splicing detected",
        )
        .with_detail("noisePattern", "Uniform")
    } else {
        LayerResult::warning(
            Layer::CompressionArtifacts,
            65,
            "Compression inconsistencies detected - possible local editing in specific regions",
        )
        .with_detail("noisePattern", "Inconsistent")
    };

    Ok(result
        .with_detail("suspiciousRegions", suspicious as u64)
        .with_detail(keys::MODIFICATIONS, suspicious as u64)
        .with_detail("medianResidual", median_residual)
        .with_detail("regions", (GRID * GRID) as u64))
}

#[async_trait]
impl Probe for CompressionArtifactProbe {
    fn layer(&self) -> Layer {
        Layer::CompressionArtifacts
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        if asset.kind() == MediaKind::Video {
            return Ok(LayerResult::unknown(
                Layer::CompressionArtifacts,
                "Compression analysis is not applicable to video assets",
            ));
        }
        blocking(move || inspect(&asset)).await
    }
}
