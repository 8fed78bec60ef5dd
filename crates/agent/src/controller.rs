//! The agent controller: one conversation, one request at a time.
//!
//! A turn runs:
//!
//! 1. **Evict** if the previous response pushed the window over budget
//! 2. **Resolve** the query (graph, or search on a miss)
//! 3. **Stage** query, lookup and entities in a [`TurnScratch`]
//! 4. **Complete** with the assembled prompt
//! 5. **Commit** staged state to the window and the stores, then measure usage
//! 6. **Write back** the answer into the knowledge graph
//!
//! A failure in steps 1, 2 or 4 returns before anything is committed.
//! Eviction works on a copy of the window, which replaces the agent's
//! window only at the commit step.

use std::collections::BTreeSet;
use std::sync::Arc;

use kgagent_config::AppConfig;
use kgagent_core::error::Result;
use kgagent_core::graph::KnowledgeGraph;
use kgagent_core::message::TurnRecord;
use kgagent_core::persona::Persona;
use kgagent_core::provider::{Provider, ProviderRequest};
use kgagent_core::search::SearchBackend;
use kgagent_memory::AgentStores;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::token::estimate_records_tokens;
use crate::context::{ContextWindow, WindowSettings};
use crate::retrieval::{AnswerSource, KnowledgeOrchestrator};
use crate::scratch::TurnScratch;

/// External collaborators of an agent.
pub struct Collaborators {
    pub provider: Arc<dyn Provider>,
    pub search: Arc<dyn SearchBackend>,
    pub graph: Arc<dyn KnowledgeGraph>,
}

/// Everything one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub answer: String,
    /// Entities surfaced by a graph hit; empty on the search path
    pub entities: BTreeSet<String>,
    pub source: AnswerSource,
    /// Backend-reported usage, or the local estimate when none was reported
    pub total_tokens: usize,
    /// Whether the next turn will start with an eviction
    pub eviction_pending: bool,
    /// Set when the answer could not be written back to the graph
    pub write_back_error: Option<String>,
}

/// A knowledge-graph backed conversational agent.
pub struct Agent {
    name: String,
    provider: Arc<dyn Provider>,
    orchestrator: KnowledgeOrchestrator,
    window: ContextWindow,
    stores: AgentStores,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Agent {
    /// Build an agent whose window is seeded from the loaded turn history.
    pub fn new(
        config: &AppConfig,
        persona: Persona,
        stores: AgentStores,
        collaborators: Collaborators,
    ) -> Self {
        let window = ContextWindow::new(
            &persona,
            stores.history.all(),
            WindowSettings::from(&config.context),
        );
        let orchestrator = KnowledgeOrchestrator::from_config(
            collaborators.graph,
            collaborators.search,
            config,
        );

        info!(
            agent = %persona.name,
            provider = %collaborators.provider.name(),
            model = %config.completion.model,
            history = stores.history.len(),
            "Agent initialized"
        );

        Self {
            name: persona.name,
            provider: collaborators.provider,
            orchestrator,
            window,
            stores,
            model: config.completion.model.clone(),
            temperature: config.completion.temperature,
            max_tokens: config.completion.max_tokens,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn stores(&self) -> &AgentStores {
        &self.stores
    }

    pub fn orchestrator(&self) -> &KnowledgeOrchestrator {
        &self.orchestrator
    }

    /// Answer `query`.
    pub async fn query(&mut self, query: &str) -> Result<String> {
        Ok(self.respond(query).await?.answer)
    }

    /// Answer `query` and return the entities a graph hit surfaced.
    pub async fn query_with_entities(&mut self, query: &str) -> Result<(String, BTreeSet<String>)> {
        let report = self.respond(query).await?;
        Ok((report.answer, report.entities))
    }

    /// Run one full turn.
    pub async fn respond(&mut self, query: &str) -> Result<TurnReport> {
        let mut window = self.window.clone();
        if window.pending_eviction() {
            window
                .evict_and_summarize(self.provider.as_ref(), &self.model)
                .await?;
        }

        let resolution = self.orchestrator.resolve(query).await?;
        let mut scratch = TurnScratch::new(query, &resolution);
        if let Some(hit) = resolution.hit() {
            let entities = self.orchestrator.extract_entities(hit);
            let records = self.orchestrator.entity_records(hit, &entities);
            scratch.stage_entities(entities, records);
        }

        let prompt = window.assemble(
            scratch.staged_turns(),
            &self.stores.memory,
            &self.stores.entities,
        )?;
        let estimated = estimate_records_tokens(&prompt);
        debug!(
            agent = %self.name,
            source = %scratch.source(),
            messages = prompt.len(),
            estimated_tokens = estimated,
            "Sending turn to completion backend"
        );

        let request = ProviderRequest::new(&self.model, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let response = self.provider.complete(request).await?;

        let answer = response.message.content.clone();
        let total_tokens = match response.usage {
            Some(usage) => usage.total_tokens as usize,
            None => estimated + estimate_records_tokens(std::slice::from_ref(&response.message)),
        };

        let committed = scratch.commit(TurnRecord::assistant(&answer));
        window.extend(committed.turns.iter().cloned());
        let eviction_pending = window.measure(total_tokens);
        self.window = window;
        self.stores.history.extend(committed.turns);
        self.stores.memory.extend(committed.memory);
        self.stores.entities.extend(committed.entity_records);

        let write_back_error = match self.orchestrator.write_back(&answer).await {
            Ok(()) => None,
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Write-back failed, answer kept");
                Some(e.to_string())
            }
        };

        info!(
            agent = %self.name,
            source = %committed.source,
            entities = committed.entities.len(),
            total_tokens,
            eviction_pending,
            "Turn complete"
        );

        Ok(TurnReport {
            answer,
            entities: committed.entities,
            source: committed.source,
            total_tokens,
            eviction_pending,
            write_back_error,
        })
    }

    /// Persist all stores.
    pub fn persist(&self) -> Result<()> {
        self.stores.persist()?;
        debug!(agent = %self.name, "Agent stores persisted");
        Ok(())
    }
}
