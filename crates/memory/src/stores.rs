//! The three journals an agent owns, laid out under one directory.
//!
//! ```text
//! <data_dir>/<agent_name>/
//! ├── history.jsonl         # turn history (seeds the context window)
//! ├── memory_stream.jsonl   # inbound queries and outbound answers
//! └── entity_store.jsonl    # entities surfaced from graph hits
//! ```

use std::path::Path;

use kgagent_core::error::PersistenceError;
use tracing::info;

use crate::journal::{EntityStore, HistoryStore, Journal, MemoryStore};

pub const HISTORY_FILE: &str = "history.jsonl";
pub const MEMORY_STREAM_FILE: &str = "memory_stream.jsonl";
pub const ENTITY_STORE_FILE: &str = "entity_store.jsonl";

/// All persisted state of one agent.
#[derive(Debug, Clone)]
pub struct AgentStores {
    pub history: HistoryStore,
    pub memory: MemoryStore,
    pub entities: EntityStore,
}

impl AgentStores {
    /// Empty stores that will persist under `dir`.
    pub fn empty(dir: &Path) -> Self {
        Self {
            history: Journal::new(dir.join(HISTORY_FILE)),
            memory: Journal::new(dir.join(MEMORY_STREAM_FILE)),
            entities: Journal::new(dir.join(ENTITY_STORE_FILE)),
        }
    }

    /// Load every store from `dir`. Absent files load empty.
    pub fn load(dir: &Path) -> Result<Self, PersistenceError> {
        let stores = Self {
            history: Journal::load(dir.join(HISTORY_FILE))?,
            memory: Journal::load(dir.join(MEMORY_STREAM_FILE))?,
            entities: Journal::load(dir.join(ENTITY_STORE_FILE))?,
        };
        info!(
            dir = %dir.display(),
            history = stores.history.len(),
            memory = stores.memory.len(),
            entities = stores.entities.len(),
            "Agent stores loaded"
        );
        Ok(stores)
    }

    /// Persist every store to its own file.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        self.history.persist()?;
        self.memory.persist()?;
        self.entities.persist()?;
        Ok(())
    }
}
