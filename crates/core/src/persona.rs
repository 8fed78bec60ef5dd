//! Persona: the two context slots that open every prompt.
//!
//! The system persona describes the agent; the user persona describes the
//! person it is talking to. Both come from plain text files:
//!
//! 1. **Built-in defaults**: used when a file is not configured
//! 2. **`system_persona.txt`**: agent personality, tone, rules
//! 3. **`user_persona.txt`**: user-specific context
//!
//! A configured file that cannot be read is skipped with a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where to load persona text from.
#[derive(Debug, Clone, Default)]
pub struct PersonaPaths {
    pub system_persona: Option<PathBuf>,
    pub user_persona: Option<PathBuf>,
}

/// The loaded persona pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Agent name (used for diagnostics and store keys)
    pub name: String,

    /// Content of the system-role persona slot
    pub system: String,

    /// Content of the user-role persona slot
    pub user: String,

    /// Which files were loaded (for diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_files: Vec<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            user: user.into(),
            loaded_files: vec![],
        }
    }

    /// Persona used when no files are configured.
    pub fn default_persona(name: impl Into<String>) -> Self {
        let name = name.into();
        let system = format!(
            "You are {name}, a helpful assistant backed by a knowledge graph. \
             Ground your answers in the knowledge lookups and the memory stream \
             you are given. Be concise and accurate."
        );
        Self::new(name, system, "The user has not shared any details about themselves yet.")
    }

    /// Load the persona pair, falling back to defaults per slot.
    pub fn load(name: impl Into<String>, paths: &PersonaPaths) -> Self {
        let mut persona = Self::default_persona(name);

        if let Some(path) = &paths.system_persona
            && let Some(content) = Self::read_file_safe(path)
        {
            persona.system = content;
            persona.loaded_files.push(path.display().to_string());
        }

        if let Some(path) = &paths.user_persona
            && let Some(content) = Self::read_file_safe(path)
        {
            persona.user = content;
            persona.loaded_files.push(path.display().to_string());
        }

        debug!(
            name = %persona.name,
            files_loaded = persona.loaded_files.len(),
            "Persona loaded"
        );
        persona
    }

    /// Read a persona file, returning None when it is missing or blank.
    fn read_file_safe(path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => Some(content.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable persona file");
                None
            }
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::default_persona("kgagent")
    }
}
