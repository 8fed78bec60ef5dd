//! Knowledge graph backend over HTTP/JSON.
//!
//! The graph service wraps a property-graph database and its LLM-driven
//! triple extractor behind two endpoints:
//!
//! - `POST {base}/query` with `{"query": "<text>"}` answers with a
//!   [`GraphQueryResult`] (`response`, optional `metadata.kg_rel_map`,
//!   optional `raw_subgraph`).
//! - `POST {base}/ingest` with an [`IngestRequest`] body; any 2xx is success.

use async_trait::async_trait;
use kgagent_config::{GraphConfig, TransportConfig};
use kgagent_core::error::BackendError;
use kgagent_core::graph::{GraphQueryResult, IngestRequest, KnowledgeGraph};
use serde::Serialize;
use tracing::debug;

use crate::transport;

pub struct HttpKnowledgeGraph {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    transport: TransportConfig,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
}

impl HttpKnowledgeGraph {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        transport: &TransportConfig,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: transport::build_client(transport)?,
            transport: transport.clone(),
        })
    }

    /// Build the graph client from configuration. Requires `graph.url`.
    pub fn from_config(config: &GraphConfig) -> Result<Self, BackendError> {
        let url = config.url.clone().ok_or_else(|| {
            BackendError::NotConfigured("graph URL missing (set KGAGENT_GRAPH_URL)".into())
        })?;
        Self::new(url, config.api_key.clone(), &config.transport)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, BackendError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(transport::map_send_error)?;
        let status = response.status().as_u16();
        let retry_after = transport::retry_after(&response);
        let text = response.text().await.map_err(transport::map_send_error)?;

        if !(200..300).contains(&status) {
            debug!(url = %url, status, body = %text, "Graph service returned error");
            return Err(transport::map_status(status, &text, retry_after));
        }
        Ok(text)
    }

    fn parse_query_result(body: &str) -> Result<GraphQueryResult, BackendError> {
        serde_json::from_str(body)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse graph result: {e}")))
    }
}

#[async_trait]
impl KnowledgeGraph for HttpKnowledgeGraph {
    fn name(&self) -> &str {
        "http"
    }

    async fn query(&self, text: &str) -> Result<GraphQueryResult, BackendError> {
        debug!(base_url = %self.base_url, "Querying knowledge graph");
        let body = QueryBody { query: text };
        let raw = transport::with_retries("graph", &self.transport, || self.post("query", &body))
            .await?;
        Self::parse_query_result(&raw)
    }

    async fn ingest(&self, request: IngestRequest) -> Result<(), BackendError> {
        debug!(
            base_url = %self.base_url,
            documents = request.documents.len(),
            "Ingesting into knowledge graph"
        );
        transport::with_retries("graph", &self.transport, || self.post("ingest", &request))
            .await
            .map(|_| ())
    }
}
