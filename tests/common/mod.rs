#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageOutputFormat, Luma, Rgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use verimedia_core::error::{ClassifierError, ProbeFailure};
use verimedia_core::probes::Probe;
use verimedia_core::store;
use verimedia_core::{
    Asset, Classification, Classifier, Engine, EngineParts, Label, Layer, LayerResult, ProvenanceSigner,
    Settings,
};

// ==========================================
// Fixture images
// ==========================================

fn encode(img: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut out, format).expect("encode fixture image");
    out
}

/// Smooth diagonal gradient, 64x64 PNG. No capture metadata.
pub fn gradient_png() -> Vec<u8> {
    let img: GrayImage = ImageBuffer::from_fn(64, 64, |x, y| Luma([(x + y) as u8]));
    encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png)
}

/// Gradient with one pixel nudged: different digest, same perceptual hash.
pub fn gradient_png_retouched() -> Vec<u8> {
    let img: GrayImage = ImageBuffer::from_fn(64, 64, |x, y| {
        if x == 40 && y == 40 {
            Luma([(x + y) as u8 + 3])
        } else {
            Luma([(x + y) as u8])
        }
    });
    encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png)
}

/// Seeded sensor-like noise spread evenly over the whole frame.
pub fn uniform_noise_png(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let img: GrayImage = ImageBuffer::from_fn(64, 64, |_, _| Luma([rng.gen::<u8>()]));
    encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png)
}

/// Gradient with a pasted block of noise in one grid region.
pub fn spliced_png() -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    let img: GrayImage = ImageBuffer::from_fn(64, 64, |x, y| {
        if (16..32).contains(&x) && (16..32).contains(&y) {
            Luma([rng.gen::<u8>()])
        } else {
            Luma([(x + y) as u8])
        }
    });
    encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png)
}

pub fn tiny_png() -> Vec<u8> {
    let img: GrayImage = ImageBuffer::from_fn(8, 8, |_, _| Luma([128]));
    encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png)
}

/// Camera-like JPEG: colour gradient with an APP1/EXIF segment after SOI.
pub fn camera_jpeg() -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    let jpeg = encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Jpeg(90));

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(b"MM\0\x2a\0\0\0\x08\0\0\0\0\0\0");
    let len = (payload.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// JPEG carrying an editing-software trace in a comment segment.
pub fn edited_jpeg() -> Vec<u8> {
    let jpeg = camera_jpeg();
    let comment = b"Adobe Photoshop 25.0 (Windows)";
    let len = (comment.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xFE]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(comment);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Minimal ISO-BMFF header; enough for container sniffing.
pub fn mp4_header() -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00, 0x18];
    out.extend_from_slice(b"ftypmp42");
    out.extend_from_slice(&[0u8; 12]);
    out
}

// ==========================================
// Classifier stubs
// ==========================================

/// Deterministic stand-in for the remote classifier.
pub struct StubClassifier {
    outcome: Result<Classification, ClassifierError>,
    delay: Option<Duration>,
}

impl StubClassifier {
    pub fn real(confidence: f64) -> Self {
        Self {
            outcome: Ok(Classification {
                label: Label::Real,
                confidence,
            }),
            delay: None,
        }
    }

    pub fn fake(confidence: f64) -> Self {
        Self {
            outcome: Ok(Classification {
                label: Label::Fake,
                confidence,
            }),
            delay: None,
        }
    }

    pub fn failing(error: ClassifierError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _asset: &Asset) -> Result<Classification, ClassifierError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

// ==========================================
// Probe fixtures
// ==========================================

/// Returns a canned result.
pub struct FixedProbe(pub LayerResult);

#[async_trait]
impl Probe for FixedProbe {
    fn layer(&self) -> Layer {
        self.0.name
    }

    async fn evaluate(&self, _asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        Ok(self.0.clone())
    }
}

pub struct PanickingProbe(pub Layer);

#[async_trait]
impl Probe for PanickingProbe {
    fn layer(&self) -> Layer {
        self.0
    }

    async fn evaluate(&self, _asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        panic!("probe exploded")
    }
}

pub struct SlowProbe(pub Layer, pub Duration);

#[async_trait]
impl Probe for SlowProbe {
    fn layer(&self) -> Layer {
        self.0
    }

    async fn evaluate(&self, _asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        tokio::time::sleep(self.1).await;
        Ok(LayerResult::pass(self.0, 99, "too late to matter"))
    }
}

/// Simulated evidence with seeded randomness. Test fixture only.
pub struct RandomProbe {
    layer: Layer,
    seed: u64,
}

impl RandomProbe {
    pub fn new(layer: Layer, seed: u64) -> Self {
        Self { layer, seed }
    }
}

pub fn random_layer(layer: Layer, rng: &mut StdRng) -> LayerResult {
    let confidence = rng.gen_range(1..=100u8);
    match rng.gen_range(0..4) {
        0 => LayerResult::pass(layer, confidence, "simulated"),
        1 => LayerResult::warning(layer, confidence, "simulated"),
        2 => LayerResult::fail(layer, confidence, "simulated"),
        _ => LayerResult::unknown(layer, "simulated"),
    }
}

#[async_trait]
impl Probe for RandomProbe {
    fn layer(&self) -> Layer {
        self.layer
    }

    async fn evaluate(&self, _asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(random_layer(self.layer, &mut rng))
    }
}

// ==========================================
// Engine
// ==========================================

pub fn fast_settings() -> Settings {
    Settings {
        probe_timeout_ms: 5_000,
        verification_timeout_ms: 8_000,
        ..Settings::default()
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub output_dir: tempfile::TempDir,
}

/// Engine writing artifacts to `output_dir`, over a throwaway database.
pub fn engine_writing_to(classifier: impl Classifier + 'static, settings: &Settings, output_dir: PathBuf) -> Engine {
    Engine::new(
        EngineParts {
            db: store::temporary_database().expect("temporary sled db"),
            signer: ProvenanceSigner::generate(),
            issuer: "VeriMedia".to_string(),
            classifier: Arc::new(classifier),
            output_dir: Some(output_dir),
            trusted_keys: Vec::new(),
        },
        settings,
    )
    .expect("engine")
}

pub fn engine_with(classifier: impl Classifier + 'static, settings: &Settings) -> TestEngine {
    let output_dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_writing_to(classifier, settings, output_dir.path().to_path_buf());
    TestEngine { engine, output_dir }
}

pub fn engine(classifier: impl Classifier + 'static) -> TestEngine {
    engine_with(classifier, &fast_settings())
}

/// Six layers in default order with the given (status, confidence) pairs.
pub fn layers_from(outcomes: [(&str, u8); 6]) -> Vec<LayerResult> {
    Layer::ALL
        .iter()
        .zip(outcomes)
        .map(|(layer, (status, confidence))| match status {
            "pass" => LayerResult::pass(*layer, confidence, "fixture"),
            "warning" => LayerResult::warning(*layer, confidence, "fixture"),
            "fail" => LayerResult::fail(*layer, confidence, "fixture"),
            _ => LayerResult::unknown(*layer, "fixture"),
        })
        .collect()
}
