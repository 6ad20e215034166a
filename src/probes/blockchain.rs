use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::asset::Asset;
use crate::error::ProbeFailure;
use crate::evidence::{Layer, LayerResult};
use crate::ledger::{LedgerProof, ProvenanceLedger};
use crate::probes::Probe;

/// Looks the content digest up in the append-only provenance ledger and
/// checks its inclusion proof against the current root.
pub struct BlockchainProvenanceProbe {
    ledger: Arc<Mutex<ProvenanceLedger>>,
}

impl BlockchainProvenanceProbe {
    pub fn new(ledger: Arc<Mutex<ProvenanceLedger>>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Probe for BlockchainProvenanceProbe {
    fn layer(&self) -> Layer {
        Layer::BlockchainProvenance
    }

    async fn evaluate(&self, asset: Arc<Asset>) -> Result<LayerResult, ProbeFailure> {
        let proof = {
            let ledger = self.ledger.lock().await;
            ledger
                .prove(asset.digest())
                .map_err(|e| ProbeFailure::Ledger(e.to_string()))?
        };

        let Some(proof) = proof else {
            return Ok(LayerResult::unknown(
                Layer::BlockchainProvenance,
                "No ledger record found - provenance cannot be independently verified",
            )
            .with_detail("anchored", false));
        };

        Ok(judge(&proof))
    }
}

/// Map a verified (or not) inclusion proof onto the layer result.
fn judge(proof: &LedgerProof) -> LayerResult {
    let result = if proof.verify() {
        LayerResult::pass(
            Layer::BlockchainProvenance,
            96,
            "Content hash anchored in the provenance ledger - inclusion proof verified",
        )
    } else {
        LayerResult::fail(
            Layer::BlockchainProvenance,
            90,
            "Ledger inclusion proof does not match the current root",
        )
    };

    result
        .with_detail("anchored", true)
        .with_detail("position", proof.position)
        .with_detail("root", hex::encode(proof.root))
        .with_detail("proofLength", proof.items_hex().len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::LayerStatus;
    use crate::ledger::leaf_hash;
    use crate::provenance::ProvenanceRecord;

    fn record(digest: &str) -> ProvenanceRecord {
        ProvenanceRecord {
            digest: digest.to_string(),
            issuer: "VeriMedia".to_string(),
            created_at: "2024-05-01T00:00:00.000Z".to_string(),
            signature: "00".repeat(64),
            public_key: "00".repeat(32),
            algorithm: "ed25519".to_string(),
        }
    }

    #[test]
    fn valid_proof_passes() {
        let mut ledger = ProvenanceLedger::new();
        ledger.append(&record("a")).unwrap();
        ledger.append(&record("b")).unwrap();

        let result = judge(&ledger.prove("a").unwrap().unwrap());
        assert_eq!(result.status, LayerStatus::Pass);
        assert_eq!(result.confidence, 96);
    }

    #[test]
    fn proof_for_a_forged_leaf_fails() {
        let mut ledger = ProvenanceLedger::new();
        ledger.append(&record("a")).unwrap();
        ledger.append(&record("b")).unwrap();

        let mut proof = ledger.prove("a").unwrap().unwrap();
        proof.leaf = leaf_hash(&record("forged")).unwrap();

        let result = judge(&proof);
        assert_eq!(result.status, LayerStatus::Fail);
        assert_eq!(result.confidence, 90);
        assert_eq!(result.evidence_details["anchored"], true);
    }
}
