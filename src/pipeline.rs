//! Verification pipeline: runs the registered probes concurrently over one
//! asset, fills every slot (timeouts and panics included) and hands the
//! ordered layers to the aggregation engine.

use futures::future::{join_all, FutureExt};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::asset::Asset;
use crate::config::Settings;
use crate::error::{ConfigError, ProbeFailure};
use crate::evidence::{Layer, LayerResult};
use crate::probes::Probe;
use crate::report::VerificationReport;
use crate::scoring::Aggregator;

/// Fixed, ordered set of probes. Order here is the order of report layers.
pub struct ProbeRegistry {
    probes: Vec<Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for probe in &probes {
            if !seen.insert(probe.layer()) {
                return Err(ConfigError::DuplicateProbe(probe.layer()));
            }
        }
        Ok(Self { probes })
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.probes.iter().map(|probe| probe.layer()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// Entry point of the read path: `verify(asset) -> VerificationReport`.
pub struct Verifier {
    registry: ProbeRegistry,
    aggregator: Aggregator,
    /// `weights[i]` belongs to `registry.probes[i]`, resolved at startup.
    weights: Vec<f64>,
    probe_timeout: Duration,
    verification_timeout: Duration,
}

impl Verifier {
    /// Validates the registry and the weight table in lockstep: every
    /// registered probe must have a weight and every weight a probe.
    pub fn new(registry: ProbeRegistry, settings: &Settings) -> Result<Self, ConfigError> {
        let aggregator = Aggregator::new(settings)?;
        let layers = registry.layers();

        for layer in aggregator.weights().layers() {
            if !layers.contains(&layer) {
                return Err(ConfigError::MissingProbe(layer));
            }
        }
        let weights = aggregator.weights_for(layers)?;

        Ok(Self {
            registry,
            aggregator,
            weights,
            probe_timeout: settings.probe_timeout(),
            verification_timeout: settings.verification_timeout(),
        })
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.registry.layers()
    }

    /// Always produces a complete report: one layer per registered probe, in
    /// registry order. Slots still pending at the global deadline become
    /// `unknown`.
    pub async fn verify(&self, asset: Arc<Asset>) -> VerificationReport {
        let started = Instant::now();
        let deadline = started + self.verification_timeout;
        let slot_deadline = deadline.min(started + self.probe_timeout);

        let slots = self
            .registry
            .probes
            .iter()
            .map(|probe| run_probe(Arc::clone(probe), Arc::clone(&asset), slot_deadline));
        let layers: Vec<LayerResult> = join_all(slots).await;

        let report = self.aggregator.aggregate_weighted(&layers, &self.weights);
        info!(
            digest = %asset.digest(),
            trust_score = report.trust_score,
            verdict = ?report.verdict,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "verification complete"
        );
        report
    }
}

/// The probe boundary: nothing but a `LayerResult` for `probe.layer()`
/// comes out of here.
async fn run_probe(probe: Arc<dyn Probe>, asset: Arc<Asset>, deadline: Instant) -> LayerResult {
    let layer = probe.layer();
    let budget = deadline.saturating_duration_since(Instant::now());
    let guarded = AssertUnwindSafe(probe.evaluate(asset)).catch_unwind();

    let outcome = match tokio::time::timeout_at(deadline, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(ProbeFailure::Panicked(panic_message(panic.as_ref()))),
        Err(_) => Err(ProbeFailure::Timeout(budget)),
    };

    match outcome {
        Ok(mut result) => {
            if result.name != layer {
                warn!(%layer, reported = %result.name, "probe reported a foreign layer, re-labelling");
                result.name = layer;
                result.title = layer.title().to_string();
            }
            debug!(%layer, status = ?result.status, confidence = result.confidence, "probe finished");
            result
        }
        Err(failure) => {
            warn!(%layer, error = %failure, "probe failed, recording unknown layer");
            LayerResult::unknown(layer, failure.to_string())
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
