//! Entity extraction from a knowledge-graph relation map.

use std::collections::{BTreeSet, HashSet};

use kgagent_config::RetrievalConfig;
use kgagent_core::entity::{EntityRecord, SUBJECT_RELATION};
use kgagent_core::graph::RelationMap;

/// Default bound on entities taken from one graph hit.
pub const MAX_ENTITIES_FROM_KG: usize = 5;
/// Values the graph engine emits that never name a real entity.
pub const ENTITY_EXCEPTIONS: &[&str] = &["Unknown relation"];

/// Pulls a bounded, deduplicated entity set out of a relation map.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    max_entities: usize,
    exceptions: Vec<String>,
}

impl EntityExtractor {
    pub fn new(max_entities: usize, exceptions: Vec<String>) -> Self {
        Self {
            max_entities,
            exceptions,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_entities, config.entity_exceptions.clone())
    }

    /// Extract entity names from `relation_map`.
    ///
    /// Keys are visited in insertion order. Each key is taken together with
    /// every entity it relates to, and the bound is only checked once that
    /// key is fully expanded, so the result may exceed `max_entities`.
    /// Exception values are removed after deduplication.
    pub fn extract(&self, relation_map: &RelationMap) -> BTreeSet<String> {
        let mut collected: Vec<&str> = Vec::new();
        for (key, edges) in relation_map.iter() {
            collected.push(key);
            collected.extend(edges.iter().map(|e| e.entity.as_str()));
            if collected.len() > self.max_entities {
                break;
            }
        }

        collected
            .into_iter()
            .filter(|name| !self.exceptions.iter().any(|x| x.as_str() == *name))
            .map(str::to_string)
            .collect()
    }

    /// Turn an extracted set into store records.
    ///
    /// Relation-map keys get [`SUBJECT_RELATION`]; every other entity gets
    /// the first relation through which it was reached. Records follow
    /// relation-map order.
    pub fn entity_records(
        &self,
        relation_map: &RelationMap,
        entities: &BTreeSet<String>,
    ) -> Vec<EntityRecord> {
        let keys: HashSet<&str> = relation_map.keys().collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut records = Vec::with_capacity(entities.len());

        for (key, edges) in relation_map.iter() {
            if entities.contains(key) && seen.insert(key) {
                records.push(EntityRecord::new(key, SUBJECT_RELATION));
            }
            for edge in edges {
                let name = edge.entity.as_str();
                if entities.contains(name) && !keys.contains(name) && seen.insert(name) {
                    records.push(EntityRecord::new(name, &edge.relation));
                }
            }
        }
        records
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(
            MAX_ENTITIES_FROM_KG,
            ENTITY_EXCEPTIONS.iter().map(|s| s.to_string()).collect(),
        )
    }
}
