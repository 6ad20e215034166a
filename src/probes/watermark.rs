use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use std::sync::Arc;

use crate::asset::Asset;
use crate::error::ProbeFailure;
use crate::evidence::{keys, Layer, LayerResult};
use crate::probes::Probe;
use crate::provenance::{ProvenanceRecord, RecordDefect};
use crate::store::RecordStore;

const STANDARD: &str = "VeriMedia provenance sidecar (ed25519)";

/// Detects and verifies the provenance sidecar of an asset.
///
/// The sidecar attached to the asset wins; otherwise the record store is
/// consulted by digest. Every way of not having a valid record is a `fail`
/// with confidence 0, but each carries its own explanation and `defect` code.
pub struct WatermarkProbe {
    records: Option<RecordStore>,
    trusted: Vec<VerifyingKey>,
    pass_confidence: u8,
}

impl WatermarkProbe {
    pub fn new(trusted: Vec<VerifyingKey>, pass_confidence: u8) -> Self {
        Self {
            records: None,
            trusted,
            pass_confidence,
        }
    }

    pub fn with_records(mut self, records: RecordStore) -> Self {
        self.records = Some(records);
        self
    }

    fn lookup(&self, asset: &Asset) -> Result<Option<ProvenanceRecord>, ProbeFailure> {
        if let Some(record) = asset.sidecar() {
            return Ok(Some(record.clone()));
        }
        match &self.records {
            Some(records) => Ok(records.get(asset.digest())?),
            None => Ok(None),
        }
    }

    fn judge(&self, asset: &Asset, record: &ProvenanceRecord) -> LayerResult {
        match record.check(asset.digest(), &self.trusted) {
            Ok(_) => LayerResult::pass(
                Layer::Watermark,
                self.pass_confidence,
                "Valid provenance watermark detected with verified cryptographic signature",
            )
            .with_detail(keys::ISSUER, record.issuer.clone())
            .with_detail(keys::TIMESTAMP, record.created_at.clone())
            .with_detail(keys::STANDARD, STANDARD)
            .with_detail("signatureValid", true),
            Err(defect) => {
                let explanation = match defect {
                    RecordDefect::HashMismatch => {
                        "Provenance record does not match the content - asset was altered after watermarking"
                    }
                    RecordDefect::InvalidSignature => {
                        "Provenance signature is invalid - the record has been tampered with"
                    }
                    RecordDefect::MalformedSignature => "Provenance signature is malformed",
                    RecordDefect::MalformedKey => "Provenance record carries a malformed signer key",
                    RecordDefect::UntrustedIssuer => "Provenance record was signed by an untrusted issuer",
                    RecordDefect::UnsupportedAlgorithm => "Provenance record uses an unsupported signature algorithm",
                };
                LayerResult::fail(Layer::Watermark, 0, explanation)
                    .with_detail("present", true)
                    .with_detail("defect", defect.code())
                    .with_detail("signatureValid", false)
            }
        }
    }
}

#[async_trait]
impl Probe for WatermarkProbe {
    fn layer(&self) -> Layer {
        Layer::Watermark
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        match self.lookup(&asset)? {
            Some(record) => Ok(self.judge(&asset, &record)),
            None => Ok(LayerResult::fail(
                Layer::Watermark,
                0,
                "No provenance watermark found - authenticity cannot be cryptographically verified",
            )
            .with_detail("present", false)
            .with_detail("defect", "absent")),
        }
    }
}
