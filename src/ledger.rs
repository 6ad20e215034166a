use ckb_merkle_mountain_range::{util::MemStore, Merge, MerkleProof, MMR};
use std::collections::HashMap;

use crate::provenance::ProvenanceRecord;

/// Merge strategy for the provenance ledger.
///
/// **Parent hash**: `H_parent = blake3(H_left || H_right)`. As long as the
/// root is unchanged, collision resistance guarantees no anchored record
/// below it changed either.
pub struct MergeBlake3;

impl Merge for MergeBlake3 {
    type Item = [u8; 32];

    fn merge(lhs: &Self::Item, rhs: &Self::Item) -> ckb_merkle_mountain_range::Result<Self::Item> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(lhs);
        hasher.update(rhs);
        Ok(*hasher.finalize().as_bytes())
    }
}

/// Leaf committed for a record: blake3 over its BCS encoding.
pub fn leaf_hash(record: &ProvenanceRecord) -> Result<[u8; 32], bcs::Error> {
    let payload = bcs::to_bytes(&(
        &record.digest,
        &record.issuer,
        &record.created_at,
        &record.signature,
    ))?;
    Ok(*blake3::hash(&payload).as_bytes())
}

/// Inclusion proof for one anchored digest.
pub struct LedgerProof {
    pub position: u64,
    pub leaf: [u8; 32],
    pub root: [u8; 32],
    pub proof: MerkleProof<[u8; 32], MergeBlake3>,
}

impl LedgerProof {
    pub fn verify(&self) -> bool {
        self.proof
            .verify(self.root, vec![(self.position, self.leaf)])
            .unwrap_or(false)
    }

    pub fn items_hex(&self) -> Vec<String> {
        self.proof.proof_items().iter().map(hex::encode).collect()
    }
}

/// Append-only provenance ledger (Merkle Mountain Range).
///
/// Stands in for an on-chain anchor: every issued record is appended once and
/// can later be proven to be part of the current root. Nodes live in memory;
/// the record store is the durable copy and the ledger is rebuilt from it at
/// startup.
pub struct ProvenanceLedger {
    store: MemStore<[u8; 32]>,
    mmr_size: u64,
    positions: HashMap<String, (u64, [u8; 32])>,
}

impl Default for ProvenanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvenanceLedger {
    pub fn new() -> Self {
        Self {
            store: MemStore::default(),
            mmr_size: 0,
            positions: HashMap::new(),
        }
    }

    /// Replay records (oldest first) into a fresh ledger.
    pub fn rebuild<'a>(records: impl IntoIterator<Item = &'a ProvenanceRecord>) -> anyhow::Result<Self> {
        let mut ledger = Self::new();
        for record in records {
            ledger.append(record)?;
        }
        Ok(ledger)
    }

    /// Anchor `record`; returns `(root, leaf_pos)`. A digest is anchored at
    /// most once, re-appending returns its existing position.
    pub fn append(&mut self, record: &ProvenanceRecord) -> anyhow::Result<([u8; 32], u64)> {
        if let Some((pos, _)) = self.positions.get(&record.digest) {
            let pos = *pos;
            return Ok((self.root()?, pos));
        }

        let leaf = leaf_hash(record)?;
        let mut mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        let pos = mmr
            .push(leaf)
            .map_err(|e| anyhow::anyhow!("MMR append error: {}", e))?;
        let root = mmr
            .get_root()
            .map_err(|e| anyhow::anyhow!("MMR get_root error: {}", e))?;
        self.mmr_size = mmr.mmr_size();
        mmr.commit()
            .map_err(|e| anyhow::anyhow!("MMR commit error: {}", e))?;

        self.positions.insert(record.digest.clone(), (pos, leaf));
        Ok((root, pos))
    }

    pub fn root(&self) -> anyhow::Result<[u8; 32]> {
        let mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        mmr.get_root()
            .map_err(|e| anyhow::anyhow!("MMR get_root error: {}", e))
    }

    pub fn position(&self, digest: &str) -> Option<u64> {
        self.positions.get(digest).map(|(pos, _)| *pos)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Inclusion proof for `digest` against the current root, `None` if the
    /// digest was never anchored.
    pub fn prove(&self, digest: &str) -> anyhow::Result<Option<LedgerProof>> {
        let Some(&(position, leaf)) = self.positions.get(digest) else {
            return Ok(None);
        };
        let mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        let root = mmr
            .get_root()
            .map_err(|e| anyhow::anyhow!("MMR get_root error: {}", e))?;
        let proof = mmr
            .gen_proof(vec![position])
            .map_err(|e| anyhow::anyhow!("MMR gen_proof error: {}", e))?;
        Ok(Some(LedgerProof {
            position,
            leaf,
            root,
            proof,
        }))
    }
}
