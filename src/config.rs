use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::evidence::Layer;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ==========================================
// 1. Process configuration (environment)
// ==========================================

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub key_path: String,
    pub issuer: String,
    pub output_dir: String,
    pub classifier_url: String,
    pub settings_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port.parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            reason: format!("`{}` is not a port number", port),
        })?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "data/db/verimedia_db".to_string()),
            key_path: env::var("KEY_PATH").unwrap_or_else(|_| "verimedia.key".to_string()),
            issuer: env::var("ISSUER").unwrap_or_else(|_| "VeriMedia".to_string()),
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "uploads/watermarked".to_string()),
            classifier_url: env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8000/analyze".to_string()),
            settings_path: env::var("SETTINGS_PATH").ok().map(PathBuf::from),
        })
    }

    /// Scoring/probe settings: the JSON file at `SETTINGS_PATH`, or defaults.
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        match &self.settings_path {
            Some(path) => Settings::from_file(path),
            None => Ok(Settings::default()),
        }
    }
}

// ==========================================
// 2. Verification settings (JSON)
// ==========================================

/// Score tier boundaries. Both bounds are inclusive lower bounds and this is
/// the only place they are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictThresholds {
    pub authentic: u8,
    pub likely_authentic: u8,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            authentic: 85,
            likely_authentic: 60,
        }
    }
}

impl VerdictThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.likely_authentic == 0
            || self.likely_authentic >= self.authentic
            || self.authentic > 100
        {
            return Err(ConfigError::Thresholds {
                authentic: self.authentic,
                likely_authentic: self.likely_authentic,
            });
        }
        Ok(())
    }
}

/// Layer weight table. Keys are layer names (`watermark`, `ai_detection`,
/// ...); unknown names are rejected instead of ignored.
pub type LayerWeightTable = BTreeMap<String, f64>;

/// Validated weight table: one finite, non-negative weight per layer,
/// summing to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    weights: BTreeMap<Layer, f64>,
}

impl LayerWeights {
    pub fn from_table(table: &LayerWeightTable) -> Result<Self, ConfigError> {
        let mut weights = BTreeMap::new();
        for (name, weight) in table {
            let layer: Layer = name
                .parse()
                .map_err(ConfigError::UnknownLayer)?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    layer,
                    weight: *weight,
                });
            }
            weights.insert(layer, *weight);
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(Self { weights })
    }

    /// Equal share for every layer.
    pub fn equal() -> Self {
        let share = 1.0 / Layer::ALL.len() as f64;
        Self {
            weights: Layer::ALL.iter().map(|layer| (*layer, share)).collect(),
        }
    }

    pub fn get(&self, layer: Layer) -> Option<f64> {
        self.weights.get(&layer).copied()
    }

    pub fn layers(&self) -> impl Iterator<Item = Layer> + '_ {
        self.weights.keys().copied()
    }
}

fn default_layer_weights() -> LayerWeightTable {
    let share = 1.0 / Layer::ALL.len() as f64;
    Layer::ALL
        .iter()
        .map(|layer| (layer.key().to_string(), share))
        .collect()
}

/// Recognized options for scoring and probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub layer_weights: LayerWeightTable,
    pub verdict_thresholds: VerdictThresholds,
    /// Score contributed by an `unknown` layer (neutral evidence).
    pub unknown_baseline_confidence: u8,
    pub classifier_timeout_ms: u64,
    pub max_asset_bytes: usize,
    /// A FAKE label at or above this confidence (percent) fails the layer.
    pub fake_confidence_threshold: u8,
    pub probe_timeout_ms: u64,
    pub verification_timeout_ms: u64,
    /// Confidence of a verified watermark; also the minimum a valid
    /// watermark may report.
    pub watermark_confidence: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layer_weights: default_layer_weights(),
            verdict_thresholds: VerdictThresholds::default(),
            unknown_baseline_confidence: 50,
            classifier_timeout_ms: 30_000,
            max_asset_bytes: 50 * 1024 * 1024,
            fake_confidence_threshold: 80,
            probe_timeout_ms: 35_000,
            verification_timeout_ms: 45_000,
            watermark_confidence: 98,
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse only. Values are checked once, by [`Settings::validate`], when
    /// an aggregator is built from them.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Fail fast on anything the engine would otherwise have to guess at.
    pub fn validate(&self) -> Result<LayerWeights, ConfigError> {
        self.verdict_thresholds.validate()?;
        check_range("unknownBaselineConfidence", self.unknown_baseline_confidence as u64, 0, 100)?;
        check_range("fakeConfidenceThreshold", self.fake_confidence_threshold as u64, 1, 100)?;
        check_range("watermarkConfidence", self.watermark_confidence as u64, 95, 100)?;
        check_range("classifierTimeoutMs", self.classifier_timeout_ms, 1, u64::MAX)?;
        check_range("probeTimeoutMs", self.probe_timeout_ms, 1, u64::MAX)?;
        check_range("verificationTimeoutMs", self.verification_timeout_ms, 1, u64::MAX)?;
        check_range("maxAssetBytes", self.max_asset_bytes as u64, 1, u64::MAX)?;
        LayerWeights::from_table(&self.layer_weights)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { name, value, min, max });
    }
    Ok(())
}
