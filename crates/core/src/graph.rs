//! Knowledge graph trait: the abstraction over the triple store.
//!
//! The graph engine answers a natural-language query with a subgraph and,
//! when it found anything, a relation map:
//!
//! ```json
//! {
//!   "Harry":  [["DREAMED_OF", "Unknown relation"], ["FELL_HARD_ON", "Concrete floor"]],
//!   "Potter": [["WORE", "Round glasses"]]
//! }
//! ```
//!
//! A result without a relation map is a graph miss. That is ordinary control
//! flow (the caller falls back to search), never an error.

use std::fmt;

use async_trait::async_trait;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BackendError;

/// One `[relation, related_entity]` pair of a relation map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct RelationEdge {
    pub relation: String,
    pub entity: String,
}

impl RelationEdge {
    pub fn new(relation: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            entity: entity.into(),
        }
    }
}

impl From<(String, String)> for RelationEdge {
    fn from((relation, entity): (String, String)) -> Self {
        Self { relation, entity }
    }
}

impl From<RelationEdge> for (String, String) {
    fn from(edge: RelationEdge) -> Self {
        (edge.relation, edge.entity)
    }
}

/// Mapping from entity name to its ordered relation list.
///
/// Keys keep the order in which the graph engine emitted them; entity
/// extraction depends on that order for its size bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationMap {
    entries: Vec<(String, Vec<RelationEdge>)>,
}

impl RelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key with its relations. Insertion order is preserved.
    pub fn insert(&mut self, entity: impl Into<String>, edges: Vec<RelationEdge>) {
        self.entries.push((entity.into(), edges));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RelationEdge])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Subject entities, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<RelationEdge>)> for RelationMap {
    fn from_iter<I: IntoIterator<Item = (K, Vec<RelationEdge>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for RelationMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, edges) in &self.entries {
            map.serialize_entry(key, edges)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RelationMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RelationMapVisitor;

        impl<'de> Visitor<'de> for RelationMapVisitor {
            type Value = RelationMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of entity name to [relation, entity] pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RelationMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, edges)) = access.next_entry::<String, Vec<RelationEdge>>()? {
                    entries.push((key, edges));
                }
                Ok(RelationMap { entries })
            }
        }

        deserializer.deserialize_map(RelationMapVisitor)
    }
}

/// Metadata attached to a graph query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kg_rel_map: Option<RelationMap>,
}

/// Raw answer of the graph engine to a natural-language query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQueryResult {
    /// Natural-language response synthesized by the graph engine
    #[serde(default)]
    pub response: String,

    /// Present only when the graph found something
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GraphMetadata>,

    /// Engine-specific rendering of the matched subgraph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_subgraph: Option<serde_json::Value>,
}

impl GraphQueryResult {
    /// A result carrying no metadata.
    pub fn miss() -> Self {
        Self::default()
    }

    /// Convert into a hit, or `None` when there is no relation map.
    pub fn into_hit(self) -> Option<KnowledgeGraphHit> {
        let relation_map = self.metadata?.kg_rel_map?;
        Some(KnowledgeGraphHit {
            response: self.response,
            relation_map,
            raw_subgraph: self.raw_subgraph.unwrap_or(serde_json::Value::Null),
        })
    }
}

/// A successful graph lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraphHit {
    pub response: String,
    pub relation_map: RelationMap,
    #[serde(default)]
    pub raw_subgraph: serde_json::Value,
}

/// A text document handed to the graph engine for triple extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    /// Where the text came from (file path, "agent_answer", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Documents to ingest plus extraction hints for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<Document>,
    /// Upper bound on triples the engine should extract per chunk
    pub max_triplets_per_chunk: usize,
}

/// The knowledge graph storage engine.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// The backend name (e.g., "http", "in_memory").
    fn name(&self) -> &str;

    /// Query the graph with natural-language text.
    async fn query(&self, text: &str) -> Result<GraphQueryResult, BackendError>;

    /// Ingest documents as new triples.
    async fn ingest(&self, request: IngestRequest) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARRY: &str = r#"{
        "response": "Harry fell.",
        "metadata": {
            "kg_rel_map": {
                "Harry": [["DREAMED_OF", "Unknown relation"], ["FELL_HARD_ON", "Concrete floor"]],
                "Potter": [["WORE", "Round glasses"]]
            }
        }
    }"#;

    #[test]
    fn relation_map_preserves_key_order() {
        let json = r#"{"Zed": [], "Alpha": [["R", "B"]], "Mid": []}"#;
        let map: RelationMap = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["Zed", "Alpha", "Mid"]);
    }

    #[test]
    fn parse_hit_from_json() {
        let result: GraphQueryResult = serde_json::from_str(HARRY).unwrap();
        let hit = result.into_hit().unwrap();
        assert_eq!(hit.response, "Harry fell.");
        assert_eq!(hit.relation_map.len(), 2);
        let (key, edges) = hit.relation_map.iter().next().unwrap();
        assert_eq!(key, "Harry");
        assert_eq!(edges[1], RelationEdge::new("FELL_HARD_ON", "Concrete floor"));
    }

    #[test]
    fn missing_metadata_is_a_miss() {
        let result: GraphQueryResult = serde_json::from_str(r#"{"response": "Empty Response"}"#).unwrap();
        assert!(result.into_hit().is_none());
    }

    #[test]
    fn metadata_without_relation_map_is_a_miss() {
        let result: GraphQueryResult =
            serde_json::from_str(r#"{"response": "", "metadata": {}}"#).unwrap();
        assert!(result.into_hit().is_none());
    }

    #[test]
    fn relation_map_serializes_as_object() {
        let map: RelationMap = vec![("Harry", vec![RelationEdge::new("WORE", "Glasses")])]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"Harry":[["WORE","Glasses"]]}"#);
    }

    #[test]
    fn malformed_edge_is_rejected() {
        let json = r#"{"Harry": [["ONLY_RELATION"]]}"#;
        assert!(serde_json::from_str::<RelationMap>(json).is_err());
    }
}
