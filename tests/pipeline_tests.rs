mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    camera_jpeg, engine, engine_with, fast_settings, mp4_header, FixedProbe, PanickingProbe, RandomProbe,
    SlowProbe, StubClassifier,
};
use verimedia_core::error::{ClassifierError, ConfigError};
use verimedia_core::probes::Probe;
use verimedia_core::{Asset, Layer, LayerResult, LayerStatus, MediaKind, ProbeRegistry, Settings, Verifier};

fn fixed(layer: Layer) -> Arc<dyn Probe> {
    Arc::new(FixedProbe(LayerResult::pass(layer, 90, "fixture")))
}

/// Fixed probes for every layer, with `replace` swapped in for its layer.
fn registry_with(replace: Arc<dyn Probe>) -> ProbeRegistry {
    let probes = Layer::ALL
        .iter()
        .map(|layer| {
            if *layer == replace.layer() {
                Arc::clone(&replace)
            } else {
                fixed(*layer)
            }
        })
        .collect();
    ProbeRegistry::new(probes).unwrap()
}

fn asset() -> Arc<Asset> {
    Arc::new(Asset::new(camera_jpeg(), MediaKind::Image))
}

#[tokio::test]
async fn report_has_one_layer_per_probe_in_registry_order() {
    let verifier = Verifier::new(registry_with(fixed(Layer::Watermark)), &Settings::default()).unwrap();
    let report = verifier.verify(asset()).await;

    let names: Vec<Layer> = report.layers.iter().map(|layer| layer.name).collect();
    assert_eq!(names, Layer::ALL.to_vec());
    assert_eq!(report.summary.total, 6);
    assert_eq!(report.trust_score, 90);
}

#[tokio::test]
async fn panicking_probe_becomes_unknown() {
    let verifier = Verifier::new(
        registry_with(Arc::new(PanickingProbe(Layer::Metadata))),
        &Settings::default(),
    )
    .unwrap();
    let report = verifier.verify(asset()).await;

    let metadata = report.layer(Layer::Metadata).unwrap();
    assert_eq!(metadata.status, LayerStatus::Unknown);
    assert_eq!(metadata.confidence, 0);
    assert!(metadata.explanation.contains("probe exploded"));
    assert_eq!(report.summary.passed, 5);
}

#[tokio::test]
async fn slow_probe_times_out_into_unknown() {
    let settings = Settings {
        probe_timeout_ms: 150,
        verification_timeout_ms: 1_000,
        ..Settings::default()
    };
    let verifier = Verifier::new(
        registry_with(Arc::new(SlowProbe(Layer::CompressionArtifacts, Duration::from_secs(30)))),
        &settings,
    )
    .unwrap();

    let started = Instant::now();
    let report = verifier.verify(asset()).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let compression = report.layer(Layer::CompressionArtifacts).unwrap();
    assert_eq!(compression.status, LayerStatus::Unknown);
    assert_eq!(report.layers.len(), 6);
}

#[tokio::test]
async fn global_deadline_bounds_the_whole_verification() {
    let settings = Settings {
        probe_timeout_ms: 60_000,
        verification_timeout_ms: 200,
        ..Settings::default()
    };
    let verifier = Verifier::new(
        registry_with(Arc::new(SlowProbe(Layer::SourceAttribution, Duration::from_secs(30)))),
        &settings,
    )
    .unwrap();

    let started = Instant::now();
    let report = verifier.verify(asset()).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.layer(Layer::SourceAttribution).unwrap().status, LayerStatus::Unknown);
    assert_eq!(report.summary.passed, 5);
}

#[tokio::test]
async fn probe_reporting_a_foreign_layer_is_relabelled() {
    let imposter: Arc<dyn Probe> = Arc::new(FixedProbe(LayerResult::pass(Layer::Watermark, 99, "fixture")));
    // Registered for the metadata slot, reports a watermark result.
    struct Mislabelled(Arc<dyn Probe>);

    #[async_trait::async_trait]
    impl Probe for Mislabelled {
        fn layer(&self) -> Layer {
            Layer::Metadata
        }

        async fn evaluate(
            &self,
            asset: Arc<Asset>,
        ) -> Result<LayerResult, verimedia_core::error::ProbeFailure> {
            self.0.evaluate(asset).await
        }
    }

    let verifier = Verifier::new(registry_with(Arc::new(Mislabelled(imposter))), &Settings::default()).unwrap();
    let report = verifier.verify(asset()).await;

    let names: Vec<Layer> = report.layers.iter().map(|layer| layer.name).collect();
    assert_eq!(names, Layer::ALL.to_vec());
    assert_eq!(report.layers[1].title, Layer::Metadata.title());
}

#[test]
fn duplicate_probes_are_rejected() {
    let probes = vec![fixed(Layer::Watermark), fixed(Layer::Watermark)];
    assert!(matches!(
        ProbeRegistry::new(probes),
        Err(ConfigError::DuplicateProbe(Layer::Watermark))
    ));
}

#[test]
fn weighted_layer_without_probe_is_rejected() {
    let probes = Layer::ALL
        .iter()
        .filter(|layer| **layer != Layer::AiDetection)
        .map(|layer| fixed(*layer))
        .collect();
    let registry = ProbeRegistry::new(probes).unwrap();
    assert!(matches!(
        Verifier::new(registry, &Settings::default()),
        Err(ConfigError::MissingProbe(Layer::AiDetection))
    ));
}

#[tokio::test]
async fn seeded_probes_give_identical_reports() {
    let build = || {
        let probes: Vec<Arc<dyn Probe>> = Layer::ALL
            .iter()
            .enumerate()
            .map(|(i, layer)| Arc::new(RandomProbe::new(*layer, 42 + i as u64)) as Arc<dyn Probe>)
            .collect();
        Verifier::new(ProbeRegistry::new(probes).unwrap(), &Settings::default()).unwrap()
    };

    let first = build().verify(asset()).await;
    let second = build().verify(asset()).await;
    assert_eq!(first, second);
}

// ==========================================
// Full engine, stubbed classifier
// ==========================================

#[tokio::test]
async fn classifier_past_probe_timeout_only_blanks_its_layer() {
    let settings = Settings {
        probe_timeout_ms: 200,
        verification_timeout_ms: 2_000,
        ..fast_settings()
    };
    let test = engine_with(StubClassifier::real(0.9).delayed(Duration::from_secs(30)), &settings);

    let started = Instant::now();
    let report = test.engine.verify(camera_jpeg(), MediaKind::Image).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let ai = report.layer(Layer::AiDetection).unwrap();
    assert_eq!(ai.status, LayerStatus::Unknown);
    assert_eq!(ai.confidence, 0);
    assert_eq!(report.layer(Layer::Metadata).unwrap().status, LayerStatus::Pass);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.message.contains("layers were unavailable")));
}

#[tokio::test]
async fn unavailable_classifier_yields_unknown_ai_layer() {
    let test = engine(StubClassifier::failing(ClassifierError::ServiceUnavailable(
        "connection refused".to_string(),
    )));
    let report = test.engine.verify(camera_jpeg(), MediaKind::Image).await;

    let ai = report.layer(Layer::AiDetection).unwrap();
    assert_eq!(ai.status, LayerStatus::Unknown);
    assert!(ai.explanation.contains("connection refused"));
}

#[tokio::test]
async fn confident_fake_label_fails_ai_layer() {
    let test = engine(StubClassifier::fake(0.93));
    let report = test.engine.verify(camera_jpeg(), MediaKind::Image).await;

    let ai = report.layer(Layer::AiDetection).unwrap();
    assert_eq!(ai.status, LayerStatus::Fail);
    assert_eq!(ai.confidence, 93);
}

#[tokio::test]
async fn video_assets_get_a_complete_report() {
    let test = engine(StubClassifier::real(0.9));
    let report = test.engine.verify(mp4_header(), MediaKind::Video).await;

    assert_eq!(report.layers.len(), 6);
    assert_eq!(report.layer(Layer::AiDetection).unwrap().status, LayerStatus::Unknown);
    assert_eq!(report.layer(Layer::CompressionArtifacts).unwrap().status, LayerStatus::Unknown);
    assert_eq!(report.layer(Layer::Metadata).unwrap().status, LayerStatus::Pass);
    assert!(report.trust_score <= 100);
}

#[tokio::test]
async fn unwatermarked_camera_image_is_not_authentic() {
    let test = engine(StubClassifier::real(0.95));
    let report = test.engine.verify(camera_jpeg(), MediaKind::Image).await;

    assert_eq!(report.layer(Layer::Watermark).unwrap().status, LayerStatus::Fail);
    assert_eq!(report.layer(Layer::BlockchainProvenance).unwrap().status, LayerStatus::Unknown);
    assert_ne!(report.verdict, verimedia_core::Verdict::Authentic);
}

#[test]
fn engine_refuses_settings_that_fail_validation() {
    let mut settings = fast_settings();
    settings.layer_weights.insert("watermark".to_string(), 0.5);
    let output_dir = tempfile::tempdir().unwrap();

    let built = verimedia_core::Engine::new(
        verimedia_core::EngineParts {
            db: verimedia_core::store::temporary_database().unwrap(),
            signer: verimedia_core::ProvenanceSigner::generate(),
            issuer: "VeriMedia".to_string(),
            classifier: Arc::new(StubClassifier::real(0.9)),
            output_dir: Some(output_dir.path().to_path_buf()),
            trusted_keys: Vec::new(),
        },
        &settings,
    );
    assert!(matches!(
        built,
        Err(verimedia_core::EngineError::Config(ConfigError::WeightSum(_)))
    ));
}
