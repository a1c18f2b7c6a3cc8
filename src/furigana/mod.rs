//! Furigana Resolution
//!
//! Readings are looked up through three tiers, cheapest first:
//! 1. the in-process memory cache (`cache`)
//! 2. the local persistent dictionary (`dictionary`)
//! 3. the remote batch endpoint (`remote`)
//!
//! Anything found in tiers 2 and 3 is written into memory. Batches issue at
//! most one remote request covering only the words the first two tiers missed.

pub mod cache;
pub mod dictionary;
pub mod remote;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RemoteError, ResolveError};

pub use cache::{CacheStats, Provenance, ReadingCache};
pub use dictionary::{LocalDictionary, SqliteDictionary};
pub use remote::{HttpFuriganaClient, RemoteFurigana};

/// Phonetic reading of a word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Written form
    pub word: String,
    /// Kana reading
    pub reading: String,
    /// Usage frequency rank, lower is more common
    pub frequency_rank: Option<u32>,
}

impl Reading {
    pub fn new(word: impl Into<String>, reading: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            reading: reading.into(),
            frequency_rank: None,
        }
    }

    pub fn with_rank(word: impl Into<String>, reading: impl Into<String>, rank: u32) -> Self {
        Self {
            frequency_rank: Some(rank),
            ..Self::new(word, reading)
        }
    }
}

/// Tiered reading resolver, one per scanning session
pub struct FuriganaResolver {
    memory: ReadingCache,
    local: Option<Arc<dyn LocalDictionary>>,
    remote: Option<Arc<dyn RemoteFurigana>>,
    remote_timeout: Duration,
}

impl Default for FuriganaResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FuriganaResolver {
    /// Resolver with only the memory tier
    pub fn new() -> Self {
        Self {
            memory: ReadingCache::new(),
            local: None,
            remote: None,
            remote_timeout: Duration::from_secs(3),
        }
    }

    /// Attach the local dictionary tier
    pub fn with_local(mut self, local: Arc<dyn LocalDictionary>) -> Self {
        self.local = Some(local);
        self
    }

    /// Attach the remote tier
    pub fn with_remote(mut self, remote: Arc<dyn RemoteFurigana>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Upper bound on a single remote request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Memory cache, e.g. to seed known readings
    pub fn memory(&self) -> &ReadingCache {
        &self.memory
    }

    /// Resolve a single word
    pub async fn resolve(&self, word: &str) -> Result<Reading, ResolveError> {
        if let Some(reading) = self.memory.get(word) {
            return Ok(reading);
        }

        if let Some(local) = &self.local {
            match local.lookup_reading(word) {
                Ok(Some(reading)) => return Ok(self.memory.insert(reading, Provenance::Local)),
                Ok(None) => {}
                Err(e) => warn!("Local dictionary lookup failed for {:?}: {:#}", word, e),
            }
        }

        let Some(remote) = &self.remote else {
            return Err(ResolveError::NotFound(word.to_string()));
        };

        match tokio::time::timeout(self.remote_timeout, remote.lookup(word)).await {
            Ok(Ok(Some(reading))) if reading.word == word => Ok(self.memory.insert(reading, Provenance::Remote)),
            Ok(Ok(_)) => Err(ResolveError::NotFound(word.to_string())),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(RemoteError::Timeout.into()),
        }
    }

    /// Resolve a set of words, returning whatever could be found
    ///
    /// Fails only when the remote tier failed and no other tier produced a
    /// reading. A reachable remote that knew none of the words is not a failure.
    pub async fn resolve_batch<I, S>(&self, words: I) -> Result<HashMap<String, Reading>, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        let mut found = HashMap::with_capacity(distinct.len());
        let mut misses = Vec::new();

        for word in distinct {
            match self.memory.get(&word) {
                Some(reading) => {
                    found.insert(word, reading);
                }
                None => misses.push(word),
            }
        }
        let memory_hits = found.len();

        if let Some(local) = self.local.as_ref().filter(|_| !misses.is_empty()) {
            match local.lookup_readings_batch(&misses) {
                Ok(readings) => {
                    for (word, reading) in readings {
                        if reading.word != word || !misses.contains(&word) {
                            continue;
                        }
                        let reading = self.memory.insert(reading, Provenance::Local);
                        found.insert(word, reading);
                    }
                }
                Err(e) => warn!("Local dictionary batch lookup failed: {:#}", e),
            }
            misses.retain(|w| !found.contains_key(w));
        }
        let local_hits = found.len() - memory_hits;

        debug!(
            "Batch of {} words: {} from memory, {} from local, {} missing",
            found.len() + misses.len(),
            memory_hits,
            local_hits,
            misses.len()
        );

        if misses.is_empty() {
            return Ok(found);
        }
        let Some(remote) = &self.remote else {
            return Ok(found);
        };

        let outcome = match tokio::time::timeout(self.remote_timeout, remote.lookup_batch(&misses)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        };

        match outcome {
            Ok(readings) => {
                let mut remote_hits = 0;
                for word in &misses {
                    // Entries filed under another word's key are ignored
                    if let Some(reading) = readings.get(word).filter(|r| r.word == *word) {
                        let reading = self.memory.insert(reading.clone(), Provenance::Remote);
                        found.insert(word.clone(), reading);
                        remote_hits += 1;
                    }
                }
                debug!("Remote resolved {} of {} words", remote_hits, misses.len());
                Ok(found)
            }
            Err(e) if found.is_empty() => Err(e.into()),
            Err(e) => {
                warn!(
                    "Remote furigana lookup failed, returning {} cached readings: {}",
                    found.len(),
                    e
                );
                Ok(found)
            }
        }
    }

    /// Warm the memory cache; failures are logged and ignored
    ///
    /// Returns the number of words now resolvable from memory.
    pub async fn prefetch<I, S>(&self, words: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.resolve_batch(words).await {
            Ok(found) => found.len(),
            Err(e) => {
                debug!("Prefetch failed: {}", e);
                0
            }
        }
    }

    /// Purge the memory tier; the local dictionary is untouched
    pub fn clear_cache(&self) {
        self.memory.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.memory.stats()
    }
}
