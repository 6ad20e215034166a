use ed25519_dalek::VerifyingKey;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::asset::{Asset, MediaKind};
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::error::{ConfigError, EmbedError, StoreError};
use crate::ledger::ProvenanceLedger;
use crate::pipeline::{ProbeRegistry, Verifier};
use crate::probes::{
    AiDetectionProbe, BlockchainProvenanceProbe, CompressionArtifactProbe, MetadataProbe, Probe,
    SourceAttributionProbe, WatermarkProbe,
};
use crate::provenance::{Embedder, ProvenanceService, WatermarkedAsset};
use crate::report::VerificationReport;
use crate::signer::ProvenanceSigner;
use crate::store::{AttributionRegistry, RecordStore};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger rebuild failed: {0}")]
    Ledger(String),
}

/// Everything the engine needs besides its collaborators.
pub struct EngineParts {
    pub db: sled::Db,
    pub signer: ProvenanceSigner,
    pub issuer: String,
    pub classifier: Arc<dyn Classifier>,
    pub output_dir: Option<PathBuf>,
    /// Additional signer keys whose watermarks are accepted.
    pub trusted_keys: Vec<VerifyingKey>,
}

/// Fully wired system: the verify read path and the embed write path share
/// one record store, attribution registry and ledger.
pub struct Engine {
    verifier: Verifier,
    provenance: ProvenanceService,
    ledger: Arc<Mutex<ProvenanceLedger>>,
    max_asset_bytes: usize,
}

impl Engine {
    pub fn new(parts: EngineParts, settings: &Settings) -> Result<Self, EngineError> {
        let records = RecordStore::open(&parts.db)?;
        let attribution = AttributionRegistry::open(&parts.db)?;

        let history = records.all()?;
        let ledger = ProvenanceLedger::rebuild(&history).map_err(|e| EngineError::Ledger(e.to_string()))?;
        info!(anchored = ledger.len(), "provenance ledger rebuilt from record store");
        let ledger = Arc::new(Mutex::new(ledger));

        let mut trusted = parts.trusted_keys;
        trusted.push(parts.signer.public_key());

        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(WatermarkProbe::new(trusted, settings.watermark_confidence).with_records(records.clone())),
            Arc::new(MetadataProbe),
            Arc::new(AiDetectionProbe::new(parts.classifier, settings.fake_confidence_threshold)),
            Arc::new(BlockchainProvenanceProbe::new(Arc::clone(&ledger))),
            Arc::new(CompressionArtifactProbe),
            Arc::new(SourceAttributionProbe::new(attribution.clone())),
        ];
        let verifier = Verifier::new(ProbeRegistry::new(probes)?, settings)?;

        let mut provenance = ProvenanceService::new(
            Embedder::new(parts.signer, parts.issuer),
            records,
            attribution,
            Arc::clone(&ledger),
        );
        if let Some(dir) = parts.output_dir {
            provenance = provenance.with_output_dir(dir);
        }

        Ok(Self {
            verifier,
            provenance,
            ledger,
            max_asset_bytes: settings.max_asset_bytes,
        })
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn provenance(&self) -> &ProvenanceService {
        &self.provenance
    }

    pub fn ledger(&self) -> Arc<Mutex<ProvenanceLedger>> {
        Arc::clone(&self.ledger)
    }

    pub fn max_asset_bytes(&self) -> usize {
        self.max_asset_bytes
    }

    /// `verify(assetBytes, mediaKind)`.
    pub async fn verify(&self, bytes: Vec<u8>, kind: MediaKind) -> VerificationReport {
        self.verifier.verify(Arc::new(Asset::new(bytes, kind))).await
    }

    pub async fn verify_asset(&self, asset: Asset) -> VerificationReport {
        self.verifier.verify(Arc::new(asset)).await
    }

    /// `embedWatermark(assetBytes, mediaKind)`.
    pub async fn embed_watermark(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<WatermarkedAsset, EmbedError> {
        self.provenance.embed_watermark(&Asset::new(bytes, kind)).await
    }

    pub async fn embed_asset(&self, asset: &Asset) -> Result<WatermarkedAsset, EmbedError> {
        self.provenance.embed_watermark(asset).await
    }
}
