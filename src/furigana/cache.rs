//! In-process reading cache
//!
//! Append-only for the lifetime of the process: entries are inserted once,
//! never updated or evicted individually, and only dropped by a bulk clear.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::Reading;

/// Where a cached reading came from (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Inserted directly into memory
    Memory,
    /// Loaded from the local dictionary
    Local,
    /// Returned by the remote endpoint
    Remote,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    reading: Reading,
    provenance: Provenance,
}

/// Entry counts by provenance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory: usize,
    pub local: usize,
    pub remote: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.memory + self.local + self.remote
    }
}

/// Word to reading map shared by concurrent enrichment passes
#[derive(Debug, Default)]
pub struct ReadingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, word: &str) -> Option<Reading> {
        self.entries.read().get(word).map(|e| e.reading.clone())
    }

    /// Insert unless the word is already cached; returns the cached reading
    ///
    /// The first insert wins, so concurrent resolvers of one word all observe
    /// the same reading.
    pub fn insert(&self, reading: Reading, provenance: Provenance) -> Reading {
        let mut entries = self.entries.write();
        entries
            .entry(reading.word.clone())
            .or_insert(CacheEntry { reading, provenance })
            .reading
            .clone()
    }

    pub fn provenance(&self, word: &str) -> Option<Provenance> {
        self.entries.read().get(word).map(|e| e.provenance)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let mut stats = CacheStats::default();
        for entry in entries.values() {
            match entry.provenance {
                Provenance::Memory => stats.memory += 1,
                Provenance::Local => stats.local += 1,
                Provenance::Remote => stats.remote += 1,
            }
        }
        stats
    }
}
