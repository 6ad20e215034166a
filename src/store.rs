use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StoreError;
use crate::fingerprint;
use crate::provenance::ProvenanceRecord;

const RECORDS_TREE: &str = "records";
const ATTRIBUTION_TREE: &str = "attribution";

pub fn open_database(path: impl AsRef<Path>) -> Result<sled::Db, StoreError> {
    Ok(sled::open(path)?)
}

/// Throwaway database removed on drop (tests, benches).
pub fn temporary_database() -> Result<sled::Db, StoreError> {
    Ok(sled::Config::new().temporary(true).open()?)
}

/// Insert `value` under `key` unless the key is taken.
/// Returns the value that ends up stored and whether it was ours.
fn insert_first(tree: &sled::Tree, key: &[u8], value: Vec<u8>) -> Result<(sled::IVec, bool), StoreError> {
    match tree.compare_and_swap(key, None as Option<&[u8]>, Some(value.clone()))? {
        Ok(()) => Ok((sled::IVec::from(value), true)),
        Err(cas) => match cas.current {
            Some(existing) => Ok((existing, false)),
            // Raced with a delete; nothing is stored under the key anymore.
            None => {
                tree.insert(key, value.clone())?;
                Ok((sled::IVec::from(value), true))
            }
        },
    }
}

/// Remove `key` only while it still holds exactly `value`.
fn remove_exact(tree: &sled::Tree, key: &[u8], value: Vec<u8>) -> Result<bool, StoreError> {
    Ok(tree
        .compare_and_swap(key, Some(value), None as Option<&[u8]>)?
        .is_ok())
}

/// Provenance records keyed by content digest.
///
/// **Issuance rule**: the first record stored for a digest is canonical.
/// The embedder may mint any number of records for identical bytes; this is
/// the layer that de-duplicates them.
#[derive(Clone)]
pub struct RecordStore {
    records: sled::Tree,
}

impl RecordStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            records: db.open_tree(RECORDS_TREE)?,
        })
    }

    /// Store `record` unless its digest already has one.
    /// Returns `(canonical_record, newly_issued)`.
    pub fn issue(&self, record: &ProvenanceRecord) -> Result<(ProvenanceRecord, bool), StoreError> {
        let value = serde_json::to_vec(record)?;
        let (stored, fresh) = insert_first(&self.records, record.digest.as_bytes(), value)?;
        if fresh {
            self.records.flush()?;
            return Ok((record.clone(), true));
        }
        Ok((serde_json::from_slice(&stored)?, false))
    }

    /// Withdraw `record` if it is still the one stored for its digest.
    /// Used to undo an issuance whose embed did not complete.
    pub fn revoke(&self, record: &ProvenanceRecord) -> Result<bool, StoreError> {
        let removed = remove_exact(&self.records, record.digest.as_bytes(), serde_json::to_vec(record)?)?;
        if removed {
            self.records.flush()?;
        }
        Ok(removed)
    }

    pub fn get(&self, digest: &str) -> Result<Option<ProvenanceRecord>, StoreError> {
        match self.records.get(digest.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every record, oldest first (ties broken by digest).
    pub fn all(&self) -> Result<Vec<ProvenanceRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.records.iter() {
            let (_, raw) = entry?;
            records.push(serde_json::from_slice::<ProvenanceRecord>(&raw)?);
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.digest.cmp(&b.digest))
        });
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Registered work in the attribution registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionEntry {
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceptual_hash: Option<String>,
    pub creator: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub registered_at: String,
}

/// Creator/licensing registry keyed by digest, searchable by perceptual hash.
#[derive(Clone)]
pub struct AttributionRegistry {
    entries: sled::Tree,
}

impl AttributionRegistry {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            entries: db.open_tree(ATTRIBUTION_TREE)?,
        })
    }

    /// First registration for a digest wins. Returns whether `entry` was stored.
    pub fn register(&self, entry: &AttributionEntry) -> Result<bool, StoreError> {
        let value = serde_json::to_vec(entry)?;
        let (_, fresh) = insert_first(&self.entries, entry.digest.as_bytes(), value)?;
        Ok(fresh)
    }

    /// Remove `entry` if it is still the one registered for its digest.
    pub fn unregister(&self, entry: &AttributionEntry) -> Result<bool, StoreError> {
        remove_exact(&self.entries, entry.digest.as_bytes(), serde_json::to_vec(entry)?)
    }

    pub fn find_exact(&self, digest: &str) -> Result<Option<AttributionEntry>, StoreError> {
        match self.entries.get(digest.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Closest registered work within `max_distance` bits. Ties go to the
    /// lowest digest, since sled iterates keys in order.
    pub fn find_similar(
        &self,
        perceptual_hash: &str,
        max_distance: u32,
    ) -> Result<Option<(AttributionEntry, u32)>, StoreError> {
        let mut best: Option<(AttributionEntry, u32)> = None;
        for item in self.entries.iter() {
            let (_, raw) = item?;
            let entry: AttributionEntry = serde_json::from_slice(&raw)?;
            let Some(candidate) = entry.perceptual_hash.as_deref() else {
                continue;
            };
            let Some(distance) = fingerprint::perceptual_distance(perceptual_hash, candidate) else {
                continue;
            };
            if distance > max_distance {
                continue;
            }
            if best.as_ref().map_or(true, |(_, d)| distance < *d) {
                best = Some((entry, distance));
            }
        }
        Ok(best)
    }
}
