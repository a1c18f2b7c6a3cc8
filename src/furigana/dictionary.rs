//! Local persistent reading dictionary
//!
//! Exact-match lookups against an SQLite table of `word -> reading` rows.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::Reading;

/// Upper bound on bound parameters per query
const MAX_BATCH_PARAMS: usize = 500;

/// Local reading store
pub trait LocalDictionary: Send + Sync {
    /// Exact-match lookup of one word
    fn lookup_reading(&self, word: &str) -> Result<Option<Reading>>;

    /// Exact-match lookup of many words; missing words are simply absent
    fn lookup_readings_batch(&self, words: &[String]) -> Result<HashMap<String, Reading>> {
        let mut found = HashMap::new();
        for word in words {
            if let Some(reading) = self.lookup_reading(word)? {
                found.insert(word.clone(), reading);
            }
        }
        Ok(found)
    }
}

/// SQLite-backed dictionary
pub struct SqliteDictionary {
    conn: Mutex<Connection>,
}

impl SqliteDictionary {
    /// Open or create a dictionary database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open dictionary database {:?}", path.as_ref()))?;
        let dictionary = Self::with_connection(conn)?;
        info!("Local dictionary opened at {:?}", path.as_ref());
        Ok(dictionary)
    }

    /// Open an in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS readings (
                 word           TEXT PRIMARY KEY,
                 reading        TEXT NOT NULL,
                 frequency_rank INTEGER
             );",
        )
        .context("Failed to initialize readings schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace one reading
    pub fn insert(&self, reading: &Reading) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO readings (word, reading, frequency_rank) VALUES (?1, ?2, ?3)",
            params![reading.word, reading.reading, reading.frequency_rank],
        )?;
        Ok(())
    }

    /// Import `word<TAB>reading[<TAB>rank]` lines; returns the number imported
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn import_tsv(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary file {:?}", path))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut imported = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO readings (word, reading, frequency_rank) VALUES (?1, ?2, ?3)",
            )?;
            for (number, line) in content.lines().enumerate() {
                let line = line.trim_end_matches('\r');
                if line.trim().is_empty() || line.starts_with('#') {
                    continue;
                }
                let mut fields = line.split('\t');
                let (Some(word), Some(reading)) = (fields.next(), fields.next()) else {
                    anyhow::bail!("{:?} line {}: expected word<TAB>reading", path, number + 1);
                };
                let rank = match fields.next().map(str::trim).filter(|r| !r.is_empty()) {
                    Some(r) => Some(
                        r.parse::<u32>()
                            .with_context(|| format!("{:?} line {}: invalid rank {:?}", path, number + 1, r))?,
                    ),
                    None => None,
                };
                stmt.execute(params![word.trim(), reading.trim(), rank])?;
                imported += 1;
            }
        }
        tx.commit()?;

        info!("Imported {} readings from {:?}", imported, path);
        Ok(imported)
    }

    /// Number of stored readings
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn row_to_reading(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        word: row.get(0)?,
        reading: row.get(1)?,
        frequency_rank: row.get(2)?,
    })
}

impl LocalDictionary for SqliteDictionary {
    fn lookup_reading(&self, word: &str) -> Result<Option<Reading>> {
        let reading = self
            .conn
            .lock()
            .query_row(
                "SELECT word, reading, frequency_rank FROM readings WHERE word = ?1",
                params![word],
                row_to_reading,
            )
            .optional()?;
        Ok(reading)
    }

    fn lookup_readings_batch(&self, words: &[String]) -> Result<HashMap<String, Reading>> {
        let mut found = HashMap::new();
        let conn = self.conn.lock();

        for chunk in words.chunks(MAX_BATCH_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT word, reading, frequency_rank FROM readings WHERE word IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), row_to_reading)?;
            for row in rows {
                let reading = row?;
                found.insert(reading.word.clone(), reading);
            }
        }

        debug!("Local dictionary matched {} of {} words", found.len(), words.len());
        Ok(found)
    }
}
