//! Append-only JSON-lines journal: the durable form of every agent store.
//!
//! Each line is one JSON-encoded record. The whole sequence is held in memory;
//! `persist` rewrites the file from it. Storage location is chosen by the
//! caller, typically `<data_dir>/<agent_name>/<store>.jsonl`.
//!
//! Unlike a best-effort cache, a journal never skips a bad line: the turn
//! history is the canonical conversation record, so corruption is reported
//! with its line number and a missing file is the only case that loads empty.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use kgagent_core::entity::EntityRecord;
use kgagent_core::error::PersistenceError;
use kgagent_core::message::TurnRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Turn history (every user, lookup, and assistant turn).
pub type HistoryStore = Journal<TurnRecord>;

/// Memory stream (inbound queries and outbound answers).
pub type MemoryStore = Journal<TurnRecord>;

/// Entities surfaced from knowledge-graph hits.
pub type EntityStore = Journal<EntityRecord>;

/// An append-only, file-backed sequence of records.
#[derive(Debug, Clone)]
pub struct Journal<T> {
    path: PathBuf,
    records: Vec<T>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned,
{
    /// An empty journal that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    /// Load a journal from a JSONL file.
    ///
    /// A missing file yields an empty journal. Any other read failure, and
    /// any line that does not decode, is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Journal file absent, starting empty");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(PersistenceError::io(&path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<T>(line).map_err(|e| PersistenceError::Corrupt {
                path: path.clone(),
                line: idx + 1,
                reason: e.to_string(),
            })?;
            records.push(record);
        }

        debug!(path = %path.display(), count = records.len(), "Journal loaded");
        Ok(Self { path, records })
    }

    /// Write the full sequence to the journal's own path.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        self.persist_to(&self.path)
    }

    /// Write the full sequence to `path`.
    ///
    /// Records go to a sibling temp file first, which is then renamed over
    /// the target, so a failed write never truncates an existing journal.
    pub fn persist_to(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let tmp = path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp).map_err(|e| PersistenceError::io(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            for record in &self.records {
                serde_json::to_writer(&mut writer, record).map_err(|e| {
                    PersistenceError::io(&tmp, std::io::Error::new(ErrorKind::InvalidData, e))
                })?;
                writer.write_all(b"\n").map_err(|e| PersistenceError::io(&tmp, e))?;
            }
            let file = writer
                .into_inner()
                .map_err(|e| PersistenceError::io(&tmp, e.into_error()))?;
            file.sync_all().map_err(|e| PersistenceError::io(&tmp, e))?;
        }

        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(PersistenceError::io(path, e));
        }

        debug!(path = %path.display(), count = self.records.len(), "Journal persisted");
        Ok(())
    }
}

impl<T> Journal<T> {
    /// Append a record. There is no removal operation.
    pub fn append(&mut self, record: T) {
        self.records.push(record);
    }

    /// Append several records, keeping their order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = T>) {
        self.records.extend(records);
    }

    /// The full ordered sequence.
    pub fn all(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize> Journal<T> {
    /// Serialized rendering for the outbound prompt: `"<label>:[{...},{...}]"`.
    pub fn render(&self, label: &str) -> Result<String, serde_json::Error> {
        let body = serde_json::to_string(&self.records)?;
        Ok(format!("{label}:{body}"))
    }
}
