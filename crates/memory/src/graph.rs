//! In-memory knowledge graph: useful for testing and offline sessions.
//!
//! Holds a flat list of `(subject, relation, object)` triples. A query hits
//! every subject whose name occurs in the query text (case-insensitive) and
//! returns its relations in insertion order. Triple extraction from ingested
//! text is the job of a real graph engine; this backend only records the
//! documents it was given.

use async_trait::async_trait;
use kgagent_core::error::BackendError;
use kgagent_core::graph::{
    Document, GraphMetadata, GraphQueryResult, IngestRequest, KnowledgeGraph, RelationEdge,
    RelationMap,
};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Triple {
    subject: String,
    relation: String,
    object: String,
}

#[derive(Default)]
struct GraphState {
    triples: Vec<Triple>,
    documents: Vec<Document>,
}

/// An in-memory triple store.
pub struct InMemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
        }
    }

    /// Build a graph from `(subject, relation, object)` triples.
    pub fn with_triples<S: Into<String>>(triples: impl IntoIterator<Item = (S, S, S)>) -> Self {
        let triples = triples
            .into_iter()
            .map(|(s, r, o)| Triple {
                subject: s.into(),
                relation: r.into(),
                object: o.into(),
            })
            .collect();
        Self {
            state: Arc::new(RwLock::new(GraphState {
                triples,
                documents: Vec::new(),
            })),
        }
    }

    pub async fn add_triple(
        &self,
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) {
        self.state.write().await.triples.push(Triple {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        });
    }

    /// Documents received through `ingest`, oldest first.
    pub async fn documents(&self) -> Vec<Document> {
        self.state.read().await.documents.clone()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryGraph {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn query(&self, text: &str) -> Result<GraphQueryResult, BackendError> {
        let state = self.state.read().await;
        let text_lower = text.to_lowercase();

        let mut grouped: Vec<(String, Vec<RelationEdge>)> = Vec::new();
        for triple in &state.triples {
            if !text_lower.contains(&triple.subject.to_lowercase()) {
                continue;
            }
            let edge = RelationEdge::new(&triple.relation, &triple.object);
            match grouped.iter_mut().find(|(s, _)| *s == triple.subject) {
                Some((_, edges)) => edges.push(edge),
                None => grouped.push((triple.subject.clone(), vec![edge])),
            }
        }

        if grouped.is_empty() {
            return Ok(GraphQueryResult::miss());
        }

        let response = grouped
            .iter()
            .flat_map(|(s, edges)| {
                edges
                    .iter()
                    .map(move |e| format!("{s} {} {}.", e.relation, e.entity))
            })
            .collect::<Vec<_>>()
            .join(" ");

        let triples: Vec<[&str; 3]> = grouped
            .iter()
            .flat_map(|(s, edges)| {
                edges
                    .iter()
                    .map(move |e| [s.as_str(), e.relation.as_str(), e.entity.as_str()])
            })
            .collect();
        let subgraph = serde_json::to_value(&triples).ok();

        Ok(GraphQueryResult {
            response,
            metadata: Some(GraphMetadata {
                kg_rel_map: Some(grouped.into_iter().collect::<RelationMap>()),
            }),
            raw_subgraph: subgraph,
        })
    }

    async fn ingest(&self, request: IngestRequest) -> Result<(), BackendError> {
        self.state.write().await.documents.extend(request.documents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harry_graph() -> InMemoryGraph {
        InMemoryGraph::with_triples([
            ("Harry", "DREAMED_OF", "Unknown relation"),
            ("Harry", "FELL_HARD_ON", "Concrete floor"),
            ("Potter", "WORE", "Round glasses"),
            ("Hermione", "READ", "Hogwarts: A History"),
        ])
    }

    #[tokio::test]
    async fn query_groups_relations_by_subject() {
        let graph = harry_graph();
        let hit = graph
            .query("What do you know about Harry Potter?")
            .await
            .unwrap()
            .into_hit()
            .unwrap();

        let keys: Vec<&str> = hit.relation_map.keys().collect();
        assert_eq!(keys, vec!["Harry", "Potter"]);
        let (_, edges) = hit.relation_map.iter().next().unwrap();
        assert_eq!(edges.len(), 2);
        assert!(hit.response.contains("Potter WORE Round glasses."));
    }

    #[tokio::test]
    async fn unrelated_query_is_a_miss() {
        let graph = harry_graph();
        let result = graph.query("What is the capital of France?").await.unwrap();
        assert!(result.metadata.is_none());
        assert!(result.into_hit().is_none());
    }

    #[tokio::test]
    async fn ingest_records_documents() {
        let graph = InMemoryGraph::new();
        graph
            .ingest(IngestRequest {
                documents: vec![Document::new("Paris is the capital of France.")],
                max_triplets_per_chunk: 8,
            })
            .await
            .unwrap();
        let docs = graph.documents().await;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("Paris"));
    }

    #[tokio::test]
    async fn added_triples_become_queryable() {
        let graph = InMemoryGraph::new();
        assert!(graph.query("paris").await.unwrap().into_hit().is_none());
        graph.add_triple("Paris", "CAPITAL_OF", "France").await;
        assert!(graph.query("Tell me about paris").await.unwrap().into_hit().is_some());
    }
}
