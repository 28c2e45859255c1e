//! Content-addressed cache of parsed upload tables.
//!
//! Identical uploads hash to the same [`Fingerprint`] and are parsed once. Tables live in
//! an arena owned by the cache and are addressed by generational [`TableId`]s;
//! invalidated slots are reused by later loads under a new generation.

use crate::error::Result;
use crate::ingestion::RawTable;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Hex-encoded SHA-256 of the raw upload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a cached table. A handle stops resolving once its table is invalidated,
/// even after the slot is reused for another upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    index: usize,
    generation: u64,
}

impl TableId {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    fingerprint: Fingerprint,
    table: RawTable,
}

#[derive(Debug, Default)]
struct Entry {
    generation: u64,
    slot: Option<Slot>,
}

#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: Vec<Entry>,
    index: HashMap<Fingerprint, TableId>,
    free: Vec<usize>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of the table for `bytes`, parsing the CSV only when this content has
    /// not been seen. A parse failure leaves the cache unchanged.
    pub fn load(&mut self, bytes: &[u8]) -> Result<TableId> {
        let fingerprint = Fingerprint::of(bytes);
        if let Some(id) = self.index.get(&fingerprint) {
            debug!("Dataset cache hit for {}", fingerprint);
            return Ok(*id);
        }

        let table = RawTable::from_csv_bytes(bytes)?;
        debug!(
            "Dataset cache miss for {}, parsed {} rows",
            fingerprint,
            table.len()
        );

        let slot = Slot {
            fingerprint: fingerprint.clone(),
            table,
        };
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry::default());
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[index];
        entry.slot = Some(slot);
        let id = TableId {
            index,
            generation: entry.generation,
        };
        self.index.insert(fingerprint, id);
        Ok(id)
    }

    fn slot(&self, id: TableId) -> Option<&Slot> {
        self.entries
            .get(id.index)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_ref())
    }

    pub fn get(&self, id: TableId) -> Option<&RawTable> {
        self.slot(id).map(|slot| &slot.table)
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<TableId> {
        self.index.get(fingerprint).copied()
    }

    pub fn fingerprint(&self, id: TableId) -> Option<&Fingerprint> {
        self.slot(id).map(|slot| &slot.fingerprint)
    }

    /// Drops the table. Returns false if `id` no longer refers to a cached table.
    pub fn invalidate(&mut self, id: TableId) -> bool {
        let entry = match self.entries.get_mut(id.index) {
            Some(entry) if entry.generation == id.generation => entry,
            _ => return false,
        };
        match entry.slot.take() {
            Some(slot) => {
                entry.generation += 1;
                self.index.remove(&slot.fingerprint);
                self.free.push(id.index);
                true
            }
            None => false,
        }
    }

    /// Drops every table. Ids handed out before the call stop resolving.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.slot.take().is_some() {
                entry.generation += 1;
            }
            self.free.push(index);
        }
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
