//! Shared test helpers: scripted collaborators.

use async_trait::async_trait;
use kgagent_core::error::BackendError;
use kgagent_core::graph::{GraphQueryResult, IngestRequest, KnowledgeGraph};
use kgagent_core::message::TurnRecord;
use kgagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use kgagent_core::search::SearchBackend;
use kgagent_memory::InMemoryGraph;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue and
/// records the request. Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    results: Mutex<VecDeque<Result<ProviderResponse, BackendError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ProviderResponse, BackendError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, BackendError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no more responses (call #{call})"))
    }
}

/// Create a simple text response with small usage numbers.
pub fn make_text_response(text: &str) -> ProviderResponse {
    make_response_with_usage(text, Some(15))
}

/// Create a text response reporting `total_tokens` of usage, or none.
pub fn make_response_with_usage(text: &str, total_tokens: Option<u32>) -> ProviderResponse {
    ProviderResponse {
        message: TurnRecord::assistant(text),
        usage: total_tokens.map(|total| Usage {
            prompt_tokens: total.saturating_sub(5),
            completion_tokens: total.min(5),
            total_tokens: total,
        }),
        model: "mock-model".into(),
    }
}

/// A search backend with a fixed answer that records every query.
pub struct ScriptedSearch {
    answer: Result<String, BackendError>,
    calls: Mutex<Vec<Vec<TurnRecord>>>,
}

impl ScriptedSearch {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            answer: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<TurnRecord>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted_search"
    }

    async fn search(&self, messages: Vec<TurnRecord>) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(messages);
        self.answer.clone()
    }
}

/// Wraps an [`InMemoryGraph`], counting queries and optionally failing ingestion.
pub struct CountingGraph {
    inner: InMemoryGraph,
    fail_ingest: bool,
    queries: Mutex<usize>,
    ingests: Mutex<Vec<IngestRequest>>,
}

impl CountingGraph {
    pub fn new(inner: InMemoryGraph) -> Self {
        Self {
            inner,
            fail_ingest: false,
            queries: Mutex::new(0),
            ingests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_ingest(inner: InMemoryGraph) -> Self {
        Self {
            fail_ingest: true,
            ..Self::new(inner)
        }
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    pub fn ingests(&self) -> Vec<IngestRequest> {
        self.ingests.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeGraph for CountingGraph {
    fn name(&self) -> &str {
        "counting"
    }

    async fn query(&self, text: &str) -> Result<GraphQueryResult, BackendError> {
        *self.queries.lock().unwrap() += 1;
        self.inner.query(text).await
    }

    async fn ingest(&self, request: IngestRequest) -> Result<(), BackendError> {
        self.ingests.lock().unwrap().push(request.clone());
        if self.fail_ingest {
            return Err(BackendError::Network("graph service unreachable".into()));
        }
        self.inner.ingest(request).await
    }
}

/// The relation graph used throughout the tests.
pub fn harry_graph() -> InMemoryGraph {
    InMemoryGraph::with_triples([
        ("Harry", "DREAMED_OF", "Unknown relation"),
        ("Harry", "FELL_HARD_ON", "Concrete floor"),
        ("Potter", "WORE", "Round glasses"),
    ])
}
