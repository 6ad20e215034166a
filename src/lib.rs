//! VeriMedia core: multi-layer media authenticity verification and
//! provenance watermarking.
//!
//! Read path: [`Engine::verify`] runs six independent evidence probes over an
//! asset and folds their results into a [`VerificationReport`].
//! Write path: [`Engine::embed_watermark`] signs a provenance record for an
//! asset, anchors it in the ledger and writes a sidecar next to the copy.

pub mod api;
pub mod asset;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod ledger;
pub mod pipeline;
pub mod probes;
pub mod provenance;
pub mod report;
pub mod scoring;
pub mod signer;
pub mod store;

pub use asset::{Asset, ContainerFormat, MediaKind};
pub use classifier::{Classification, Classifier, HttpClassifier, Label};
pub use config::{Config, Settings, VerdictThresholds};
pub use engine::{Engine, EngineError, EngineParts};
pub use error::{ClassifierError, ConfigError, EmbedError, ProbeFailure, StoreError};
pub use evidence::{Layer, LayerResult, LayerStatus};
pub use pipeline::{ProbeRegistry, Verifier};
pub use provenance::{Embedder, ProvenanceRecord, ProvenanceService, WatermarkedAsset};
pub use report::{Priority, Recommendation, Verdict, VerificationReport};
pub use scoring::Aggregator;
pub use signer::ProvenanceSigner;
