//! Knowledge retrieval: graph first, web search on a miss, answers written back.
//!
//! # Flow
//!
//! 1. Query the knowledge graph with the raw user text
//! 2. **Hit** (relation map present): hand the structured hit to the caller
//! 3. **Miss**: ask the search backend and return its answer verbatim
//! 4. After the final answer exists, write it to a scratch file and ingest
//!    it into the graph so the next question about it is a hit

pub mod entities;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kgagent_config::{AppConfig, RetrievalConfig};
use kgagent_core::entity::EntityRecord;
use kgagent_core::error::{BackendError, Error, PersistenceError, Result};
use kgagent_core::graph::{Document, IngestRequest, KnowledgeGraph, KnowledgeGraphHit};
use kgagent_core::message::TurnRecord;
use kgagent_core::search::SearchBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use entities::EntityExtractor;

/// Where an answer's knowledge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Graph,
    Search,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Search => "search",
        }
    }
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The graph knew about the query's subjects.
    Graph(KnowledgeGraphHit),
    /// The graph missed; this is the search backend's answer, unmodified.
    Fallback { answer: String },
}

impl Resolution {
    pub fn source(&self) -> AnswerSource {
        match self {
            Self::Graph(_) => AnswerSource::Graph,
            Self::Fallback { .. } => AnswerSource::Search,
        }
    }

    /// The natural-language text of the lookup.
    pub fn text(&self) -> &str {
        match self {
            Self::Graph(hit) => &hit.response,
            Self::Fallback { answer } => answer,
        }
    }

    pub fn hit(&self) -> Option<&KnowledgeGraphHit> {
        match self {
            Self::Graph(hit) => Some(hit),
            Self::Fallback { .. } => None,
        }
    }
}

/// Coordinates the knowledge graph and the fallback search backend.
pub struct KnowledgeOrchestrator {
    graph: Arc<dyn KnowledgeGraph>,
    search: Arc<dyn SearchBackend>,
    extractor: EntityExtractor,
    search_prompt: String,
    scratch_path: PathBuf,
    max_triplets_per_chunk: usize,
}

impl KnowledgeOrchestrator {
    pub fn new(
        graph: Arc<dyn KnowledgeGraph>,
        search: Arc<dyn SearchBackend>,
        retrieval: &RetrievalConfig,
        scratch_path: impl Into<PathBuf>,
        search_prompt: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            search,
            extractor: EntityExtractor::from_config(retrieval),
            search_prompt: search_prompt.into(),
            scratch_path: scratch_path.into(),
            max_triplets_per_chunk: retrieval.max_triplets_per_chunk,
        }
    }

    pub fn from_config(
        graph: Arc<dyn KnowledgeGraph>,
        search: Arc<dyn SearchBackend>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            graph,
            search,
            &config.retrieval,
            config.scratch_path(),
            &config.search.system_prompt,
        )
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Resolve `query` against the graph, falling back to search on a miss.
    ///
    /// A miss is not an error. Backend failures of either collaborator are
    /// returned unchanged.
    pub async fn resolve(&self, query: &str) -> std::result::Result<Resolution, BackendError> {
        let result = self.graph.query(query).await?;
        if let Some(hit) = result.into_hit() {
            info!(
                graph = %self.graph.name(),
                subjects = hit.relation_map.len(),
                "Knowledge graph hit"
            );
            return Ok(Resolution::Graph(hit));
        }

        info!(
            graph = %self.graph.name(),
            search = %self.search.name(),
            "Knowledge graph miss, falling back to search"
        );
        let answer = self
            .search
            .search(vec![
                TurnRecord::system(&self.search_prompt),
                TurnRecord::user(query),
            ])
            .await?;
        Ok(Resolution::Fallback { answer })
    }

    /// Entities surfaced by a graph hit.
    pub fn extract_entities(&self, hit: &KnowledgeGraphHit) -> BTreeSet<String> {
        self.extractor.extract(&hit.relation_map)
    }

    pub fn entity_records(
        &self,
        hit: &KnowledgeGraphHit,
        entities: &BTreeSet<String>,
    ) -> Vec<EntityRecord> {
        self.extractor.entity_records(&hit.relation_map, entities)
    }

    /// Query the graph and, on a hit, return a Cypher query that expands the
    /// hit's subject entities one or two hops out.
    pub async fn check_graph(&self, query: &str) -> std::result::Result<Option<String>, BackendError> {
        let result = self.graph.query(query).await?;
        Ok(result.into_hit().map(|hit| {
            let subjects: Vec<&str> = hit.relation_map.keys().collect();
            neighbourhood_query(&subjects)
        }))
    }

    /// Persist `answer` to the scratch file and ingest it into the graph.
    pub async fn write_back(&self, answer: &str) -> Result<()> {
        if let Some(parent) = self.scratch_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }
        tokio::fs::write(&self.scratch_path, format!("{answer}\n"))
            .await
            .map_err(|e| PersistenceError::io(&self.scratch_path, e))?;

        let document = Document::new(answer)
            .with_source(self.scratch_path.display().to_string());
        self.graph
            .ingest(IngestRequest {
                documents: vec![document],
                max_triplets_per_chunk: self.max_triplets_per_chunk,
            })
            .await
            .map_err(Error::Backend)?;

        debug!(path = %self.scratch_path.display(), "Answer written back to knowledge graph");
        Ok(())
    }
}

/// Cypher query matching every path of one or two hops from `entities`.
pub fn neighbourhood_query(entities: &[&str]) -> String {
    let list = entities
        .iter()
        .map(|e| format!("'{}'", e.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("MATCH p = (n) - [*1 .. 2] - ()\nWHERE n.id IN [{list}]\nRETURN p")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CountingGraph, ScriptedSearch, harry_graph};
    use kgagent_core::message::Role;

    fn orchestrator(
        graph: Arc<CountingGraph>,
        search: Arc<ScriptedSearch>,
        scratch: &Path,
    ) -> KnowledgeOrchestrator {
        KnowledgeOrchestrator::new(
            graph,
            search,
            &RetrievalConfig::default(),
            scratch,
            "Be precise and concise.",
        )
    }

    #[tokio::test]
    async fn hit_returns_structured_result_without_search() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = Arc::new(CountingGraph::new(harry_graph()));
        let search = Arc::new(ScriptedSearch::answering("unused"));
        let orch = orchestrator(graph.clone(), search.clone(), &tmp.path().join("out.txt"));

        let resolution = orch.resolve("Tell me about Harry Potter").await.unwrap();
        assert_eq!(resolution.source(), AnswerSource::Graph);
        let hit = resolution.hit().unwrap();
        assert_eq!(hit.relation_map.len(), 2);
        assert_eq!(orch.extract_entities(hit).len(), 4);
        assert!(search.calls().is_empty());
        assert_eq!(graph.query_count(), 1);
    }

    #[tokio::test]
    async fn miss_returns_search_answer_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = Arc::new(CountingGraph::new(harry_graph()));
        let search = Arc::new(ScriptedSearch::answering(" Paris, obviously. "));
        let orch = orchestrator(graph, search.clone(), &tmp.path().join("out.txt"));

        let resolution = orch.resolve("What is the capital of France?").await.unwrap();
        assert_eq!(
            resolution,
            Resolution::Fallback {
                answer: " Paris, obviously. ".into()
            }
        );
        assert!(resolution.hit().is_none());

        let calls = search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert_eq!(calls[0][0].content, "Be precise and concise.");
        assert_eq!(calls[0][1].content, "What is the capital of France?");
    }

    #[tokio::test]
    async fn search_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = Arc::new(CountingGraph::new(harry_graph()));
        let search = Arc::new(ScriptedSearch::failing(BackendError::AuthenticationFailed(
            "bad key".into(),
        )));
        let orch = orchestrator(graph, search, &tmp.path().join("out.txt"));

        let err = orch.resolve("unknown topic").await.unwrap_err();
        assert!(matches!(err, BackendError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn check_graph_builds_cypher_for_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = Arc::new(CountingGraph::new(harry_graph()));
        let search = Arc::new(ScriptedSearch::answering("unused"));
        let orch = orchestrator(graph, search, &tmp.path().join("out.txt"));

        let cypher = orch.check_graph("Harry Potter").await.unwrap().unwrap();
        assert_eq!(
            cypher,
            "MATCH p = (n) - [*1 .. 2] - ()\nWHERE n.id IN ['Harry', 'Potter']\nRETURN p"
        );
        assert!(orch.check_graph("nothing here").await.unwrap().is_none());
    }

    #[test]
    fn neighbourhood_query_escapes_quotes() {
        let cypher = neighbourhood_query(&["O'Brien"]);
        assert!(cypher.contains(r"['O\'Brien']"));
    }

    #[tokio::test]
    async fn write_back_persists_and_ingests() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("data").join("external_response.txt");
        let graph = Arc::new(CountingGraph::new(harry_graph()));
        let search = Arc::new(ScriptedSearch::answering("unused"));
        let orch = orchestrator(graph.clone(), search, &scratch);

        orch.write_back("Paris is the capital of France.").await.unwrap();

        let written = std::fs::read_to_string(&scratch).unwrap();
        assert_eq!(written, "Paris is the capital of France.\n");
        let ingests = graph.ingests();
        assert_eq!(ingests.len(), 1);
        assert_eq!(ingests[0].max_triplets_per_chunk, 8);
        assert_eq!(ingests[0].documents[0].text, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn write_back_reports_ingest_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = Arc::new(CountingGraph::failing_ingest(harry_graph()));
        let search = Arc::new(ScriptedSearch::answering("unused"));
        let orch = orchestrator(graph, search, &tmp.path().join("out.txt"));

        let err = orch.write_back("answer").await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Network(_))));
    }

    #[test]
    fn default_scratch_file_is_per_agent() {
        let mut config = AppConfig::default();
        config.agent.data_dir = Some(PathBuf::from("/srv/kgagent"));
        config.agent.name = "ron".into();
        let orch = KnowledgeOrchestrator::from_config(
            Arc::new(CountingGraph::new(harry_graph())),
            Arc::new(ScriptedSearch::answering("unused")),
            &config,
        );
        assert_eq!(
            orch.scratch_path(),
            Path::new("/srv/kgagent/ron/external_response.txt")
        );
    }
}
