//! Entity records surfaced from knowledge-graph hits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relation recorded for an entity that was itself a subject of the query.
pub const SUBJECT_RELATION: &str = "SUBJECT";

/// An entity the agent has seen in the knowledge graph. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_name: String,
    /// The relation through which the entity was reached
    pub relation: String,
    pub timestamp: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(entity_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            relation: relation.into(),
            timestamp: Utc::now(),
        }
    }
}
