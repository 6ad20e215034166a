use chrono::{SecondsFormat, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::asset::Asset;
use crate::error::EmbedError;
use crate::fingerprint;
use crate::ledger::ProvenanceLedger;
use crate::signer::ProvenanceSigner;
use crate::store::{AttributionEntry, AttributionRegistry, RecordStore};

pub const SIGNATURE_ALGORITHM: &str = "ed25519";
pub const WATERMARK_SOURCE: &str = "VeriMedia provenance watermark";

/// Signed attestation binding a content digest to an issuer and a time.
///
/// Serialized as the JSON sidecar written next to a watermarked artifact:
/// `{hash, issuer, timestamp, signature, publicKey, algorithm}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    #[serde(rename = "hash")]
    pub digest: String,
    pub issuer: String,
    #[serde(rename = "timestamp")]
    pub created_at: String,
    /// Hex encoded 64-byte signature over `(hash, issuer, timestamp)`.
    pub signature: String,
    /// Hex encoded 32-byte verifying key of the signer.
    pub public_key: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

fn default_algorithm() -> String {
    SIGNATURE_ALGORITHM.to_string()
}

/// Why a record failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDefect {
    HashMismatch,
    UnsupportedAlgorithm,
    MalformedKey,
    UntrustedIssuer,
    MalformedSignature,
    InvalidSignature,
}

impl RecordDefect {
    pub fn code(&self) -> &'static str {
        match self {
            RecordDefect::HashMismatch => "hash_mismatch",
            RecordDefect::UnsupportedAlgorithm => "unsupported_algorithm",
            RecordDefect::MalformedKey => "malformed_key",
            RecordDefect::UntrustedIssuer => "untrusted_issuer",
            RecordDefect::MalformedSignature => "malformed_signature",
            RecordDefect::InvalidSignature => "invalid_signature",
        }
    }
}

impl ProvenanceRecord {
    pub fn to_sidecar_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_sidecar_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Check the record against `digest` and a set of trusted signer keys.
    pub fn check(&self, digest: &str, trusted: &[VerifyingKey]) -> Result<VerifyingKey, RecordDefect> {
        if self.digest != digest {
            return Err(RecordDefect::HashMismatch);
        }
        if self.algorithm != SIGNATURE_ALGORITHM {
            return Err(RecordDefect::UnsupportedAlgorithm);
        }

        let key_bytes: [u8; 32] = hex::decode(&self.public_key)
            .ok()
            .and_then(|raw| raw.as_slice().try_into().ok())
            .ok_or(RecordDefect::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| RecordDefect::MalformedKey)?;
        if !trusted.contains(&key) {
            return Err(RecordDefect::UntrustedIssuer);
        }

        let signature = hex::decode(&self.signature)
            .ok()
            .and_then(|raw| Signature::from_slice(&raw).ok())
            .ok_or(RecordDefect::MalformedSignature)?;

        if ProvenanceSigner::verify(&key, &self.digest, &self.issuer, &self.created_at, &signature) {
            Ok(key)
        } else {
            Err(RecordDefect::InvalidSignature)
        }
    }
}

/// Builds signed provenance records and the watermarked copy of an asset.
///
/// **Never mutates the input**: the output asset is a fresh artifact sharing
/// the original bytes, with the record attached as its sidecar. Embedding
/// byte-identical input twice yields two valid records that differ only in
/// `timestamp` and `signature`.
pub struct Embedder {
    signer: ProvenanceSigner,
    issuer: String,
}

impl Embedder {
    pub fn new(signer: ProvenanceSigner, issuer: impl Into<String>) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signer.public_key()
    }

    pub fn embed(&self, asset: &Asset) -> Result<(Asset, ProvenanceRecord), EmbedError> {
        if asset.size() == 0 {
            return Err(EmbedError::EmptyAsset);
        }

        let digest = fingerprint::content_digest(asset.bytes());
        let now = Utc::now();
        let created_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature = self.signer.sign(&digest, &self.issuer, &created_at)?;

        let record = ProvenanceRecord {
            digest,
            issuer: self.issuer.clone(),
            created_at,
            signature: hex::encode(signature.to_bytes()),
            public_key: hex::encode(self.signer.public_key().to_bytes()),
            algorithm: SIGNATURE_ALGORITHM.to_string(),
        };

        let output_name = format!("wm_{}_{}", now.timestamp_millis(), asset.file_name());
        let watermarked = Asset::new(asset.shared_bytes(), asset.kind())
            .with_name(output_name)
            .with_sidecar(record.clone());

        Ok((watermarked, record))
    }
}

/// Outcome of the embed write path.
#[derive(Debug, Clone)]
pub struct WatermarkedAsset {
    pub asset: Asset,
    /// Canonical record for the digest (the first one ever issued).
    pub record: ProvenanceRecord,
    pub newly_issued: bool,
    /// Artifact path when an output directory is configured; the sidecar
    /// sits next to it as `<path>.json`.
    pub output_path: Option<PathBuf>,
}

/// Embed write path: sign, de-duplicate, persist, register, anchor.
pub struct ProvenanceService {
    embedder: Embedder,
    records: RecordStore,
    attribution: AttributionRegistry,
    ledger: Arc<Mutex<ProvenanceLedger>>,
    output_dir: Option<PathBuf>,
}

impl ProvenanceService {
    pub fn new(
        embedder: Embedder,
        records: RecordStore,
        attribution: AttributionRegistry,
        ledger: Arc<Mutex<ProvenanceLedger>>,
    ) -> Self {
        Self {
            embedder,
            records,
            attribution,
            ledger,
            output_dir: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.embedder.public_key()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Either every effect lands (record, artifact and sidecar, attribution
    /// entry, ledger leaf) or none does.
    pub async fn embed_watermark(&self, asset: &Asset) -> Result<WatermarkedAsset, EmbedError> {
        let (watermarked, fresh) = self.embedder.embed(asset)?;

        if let Some(canonical) = self.records.get(&fresh.digest)? {
            return self.reissue(watermarked, canonical);
        }

        // Stage the files before claiming the digest.
        let staged = match &self.output_dir {
            Some(dir) => Some(StagedArtifact::stage(dir, &watermarked, &fresh)?),
            None => None,
        };

        let (record, newly_issued) = self.records.issue(&fresh)?;
        if !newly_issued {
            // Lost the race for this digest; the staged temp files are dropped.
            return self.reissue(watermarked, record);
        }

        let output_path = match staged.map(StagedArtifact::persist).transpose() {
            Ok(path) => path,
            Err(e) => {
                self.rollback(&record, None, None);
                return Err(e);
            }
        };

        let entry = match self.register(asset, &record).await {
            Ok(entry) => entry,
            Err(e) => {
                self.rollback(&record, None, output_path.as_deref());
                return Err(e);
            }
        };

        // Last: a ledger leaf cannot be taken back.
        if let Err(e) = self.ledger.lock().await.append(&record) {
            self.rollback(&record, entry.as_ref(), output_path.as_deref());
            return Err(EmbedError::Ledger(e.to_string()));
        }

        info!(
            digest = %record.digest,
            issuer = %record.issuer,
            newly_issued,
            "embedded provenance watermark"
        );

        Ok(WatermarkedAsset {
            asset: watermarked.with_sidecar(record.clone()),
            record,
            newly_issued,
            output_path,
        })
    }

    /// Digest already watermarked: hand out the canonical record again.
    fn reissue(&self, watermarked: Asset, canonical: ProvenanceRecord) -> Result<WatermarkedAsset, EmbedError> {
        info!(digest = %canonical.digest, "digest already watermarked, reusing canonical record");
        let watermarked = watermarked.with_sidecar(canonical.clone());
        let output_path = match &self.output_dir {
            Some(dir) => Some(StagedArtifact::stage(dir, &watermarked, &canonical)?.persist()?),
            None => None,
        };
        Ok(WatermarkedAsset {
            asset: watermarked,
            record: canonical,
            newly_issued: false,
            output_path,
        })
    }

    /// Register the asset for attribution. Returns the entry only when it
    /// was this call that stored it.
    async fn register(&self, asset: &Asset, record: &ProvenanceRecord) -> Result<Option<AttributionEntry>, EmbedError> {
        let bytes = asset.shared_bytes();
        let perceptual_hash = tokio::task::spawn_blocking(move || fingerprint::perceptual_hash(&bytes).ok()).await?;
        let entry = AttributionEntry {
            digest: record.digest.clone(),
            perceptual_hash,
            creator: record.issuer.clone(),
            source: WATERMARK_SOURCE.to_string(),
            license: None,
            registered_at: record.created_at.clone(),
        };
        Ok(self.attribution.register(&entry)?.then_some(entry))
    }

    /// Undo a partially applied embed. Failures are logged, the original
    /// error is what the caller sees.
    fn rollback(&self, record: &ProvenanceRecord, entry: Option<&AttributionEntry>, artifact: Option<&Path>) {
        warn!(digest = %record.digest, "embed failed, rolling back");
        if let Some(entry) = entry {
            if let Err(e) = self.attribution.unregister(entry) {
                warn!(digest = %entry.digest, error = %e, "failed to remove attribution entry");
            }
        }
        if let Some(path) = artifact {
            remove_artifact(path);
        }
        if let Err(e) = self.records.revoke(record) {
            warn!(digest = %record.digest, error = %e, "failed to revoke provenance record");
        }
    }
}

/// `<dir>/<name>` and `<dir>/<name>.json`, written to temp files in `dir`
/// and renamed into place only by [`StagedArtifact::persist`].
struct StagedArtifact {
    asset: tempfile::NamedTempFile,
    sidecar: tempfile::NamedTempFile,
    asset_path: PathBuf,
}

impl StagedArtifact {
    fn stage(dir: &Path, asset: &Asset, record: &ProvenanceRecord) -> Result<Self, EmbedError> {
        std::fs::create_dir_all(dir)?;

        let mut asset_tmp = tempfile::NamedTempFile::new_in(dir)?;
        asset_tmp.write_all(asset.bytes())?;
        asset_tmp.flush()?;

        let mut sidecar_tmp = tempfile::NamedTempFile::new_in(dir)?;
        sidecar_tmp.write_all(record.to_sidecar_json()?.as_bytes())?;
        sidecar_tmp.flush()?;

        Ok(Self {
            asset: asset_tmp,
            sidecar: sidecar_tmp,
            asset_path: dir.join(asset.file_name()),
        })
    }

    /// Both files land or neither does.
    fn persist(self) -> Result<PathBuf, EmbedError> {
        let sidecar_path = sidecar_path(&self.asset_path);
        self.asset.persist(&self.asset_path).map_err(|e| e.error)?;
        if let Err(e) = self.sidecar.persist(&sidecar_path) {
            if let Err(cleanup) = std::fs::remove_file(&self.asset_path) {
                warn!(path = %self.asset_path.display(), error = %cleanup, "failed to remove orphaned artifact");
            }
            return Err(e.error.into());
        }
        Ok(self.asset_path)
    }
}

fn sidecar_path(asset_path: &Path) -> PathBuf {
    let mut raw = asset_path.as_os_str().to_owned();
    raw.push(".json");
    PathBuf::from(raw)
}

fn remove_artifact(asset_path: &Path) {
    for path in [asset_path.to_path_buf(), sidecar_path(asset_path)] {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove artifact file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MediaKind;

    #[test]
    fn sidecar_uses_wire_field_names() {
        let embedder = Embedder::new(ProvenanceSigner::generate(), "VeriMedia");
        let asset = Asset::new(b"pixels".to_vec(), MediaKind::Image);
        let (_, record) = embedder.embed(&asset).unwrap();

        let json: serde_json::Value = serde_json::from_str(&record.to_sidecar_json().unwrap()).unwrap();
        assert_eq!(json["hash"], asset.digest());
        assert_eq!(json["issuer"], "VeriMedia");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["algorithm"], "ed25519");
    }

    #[test]
    fn embedding_rejects_empty_assets() {
        let embedder = Embedder::new(ProvenanceSigner::generate(), "VeriMedia");
        let asset = Asset::new(Vec::new(), MediaKind::Image);
        assert!(matches!(embedder.embed(&asset), Err(EmbedError::EmptyAsset)));
    }

    #[test]
    fn check_flags_untrusted_signers() {
        let embedder = Embedder::new(ProvenanceSigner::generate(), "VeriMedia");
        let asset = Asset::new(b"pixels".to_vec(), MediaKind::Image);
        let (_, record) = embedder.embed(&asset).unwrap();

        let stranger = ProvenanceSigner::generate().public_key();
        assert_eq!(record.check(asset.digest(), &[stranger]), Err(RecordDefect::UntrustedIssuer));
        assert!(record.check(asset.digest(), &[embedder.public_key()]).is_ok());
        assert_eq!(
            record.check("another digest", &[embedder.public_key()]),
            Err(RecordDefect::HashMismatch)
        );
    }

    #[tokio::test]
    async fn rollback_withdraws_every_effect_of_an_embed() {
        let db = crate::store::temporary_database().unwrap();
        let records = RecordStore::open(&db).unwrap();
        let attribution = AttributionRegistry::open(&db).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let service = ProvenanceService::new(
            Embedder::new(ProvenanceSigner::generate(), "VeriMedia"),
            records.clone(),
            attribution.clone(),
            Arc::new(Mutex::new(ProvenanceLedger::new())),
        )
        .with_output_dir(dir.path());

        let asset = Asset::new(b"pixels".to_vec(), MediaKind::Image);
        let embedded = service.embed_watermark(&asset).await.unwrap();
        let path = embedded.output_path.clone().unwrap();
        let entry = attribution.find_exact(asset.digest()).unwrap().unwrap();

        service.rollback(&embedded.record, Some(&entry), Some(&path));

        assert!(records.get(asset.digest()).unwrap().is_none());
        assert!(attribution.find_exact(asset.digest()).unwrap().is_none());
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());
        assert!(service.embed_watermark(&asset).await.unwrap().newly_issued);
    }
}
