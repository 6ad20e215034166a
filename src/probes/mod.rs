//! Evidence collectors. Each probe inspects one disjoint facet of an asset
//! and produces exactly one [`LayerResult`] for its [`Layer`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::asset::Asset;
use crate::error::ProbeFailure;
use crate::evidence::{Layer, LayerResult};

mod ai_detection;
mod attribution;
mod blockchain;
mod compression;
mod metadata;
mod watermark;

pub use ai_detection::AiDetectionProbe;
pub use attribution::SourceAttributionProbe;
pub use blockchain::BlockchainProvenanceProbe;
pub use compression::CompressionArtifactProbe;
pub use metadata::MetadataProbe;
pub use watermark::WatermarkProbe;

/// One evidentiary dimension.
///
/// Implementations may return `Err` freely; the pipeline converts every
/// failure (and every panic or timeout) into an `unknown` layer, so nothing
/// escapes past the probe boundary.
#[async_trait]
pub trait Probe: Send + Sync {
    fn layer(&self) -> Layer;

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure>;
}

/// Run CPU-bound inspection off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ProbeFailure>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProbeFailure> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
