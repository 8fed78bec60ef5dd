//! Per-call scratch state.
//!
//! Everything a turn produces before the completion backend has answered is
//! staged here, not in the agent. The scratch is created when a call starts
//! and consumed by the commit; a failed call simply drops it, so nothing
//! from an aborted turn can reach the next one.

use std::collections::BTreeSet;

use kgagent_core::entity::EntityRecord;
use kgagent_core::message::TurnRecord;

use crate::retrieval::{AnswerSource, Resolution};

/// Staged output of one in-flight turn.
#[derive(Debug)]
pub struct TurnScratch {
    turns: Vec<TurnRecord>,
    query: TurnRecord,
    source: AnswerSource,
    entities: BTreeSet<String>,
    entity_records: Vec<EntityRecord>,
}

/// A scratch that has been committed: what goes into each store.
#[derive(Debug)]
pub struct CommittedTurn {
    /// History items, in order: query, lookup, answer
    pub turns: Vec<TurnRecord>,
    /// Memory stream items: the query and the answer
    pub memory: Vec<TurnRecord>,
    pub source: AnswerSource,
    pub entities: BTreeSet<String>,
    pub entity_records: Vec<EntityRecord>,
}

impl TurnScratch {
    /// Stage the user query and the lookup that resolved it.
    pub fn new(query: &str, resolution: &Resolution) -> Self {
        let query = TurnRecord::user(query);
        let lookup = TurnRecord::assistant(format!(
            "Knowledge lookup ({}): {}",
            resolution.source(),
            resolution.text()
        ));
        Self {
            turns: vec![query.clone(), lookup],
            query,
            source: resolution.source(),
            entities: BTreeSet::new(),
            entity_records: Vec::new(),
        }
    }

    /// Stage entities surfaced by a graph hit.
    pub fn stage_entities(&mut self, entities: BTreeSet<String>, records: Vec<EntityRecord>) {
        self.entities = entities;
        self.entity_records = records;
    }

    /// Turns to place in the prompt after the window's view.
    pub fn staged_turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn source(&self) -> AnswerSource {
        self.source
    }

    pub fn entities(&self) -> &BTreeSet<String> {
        &self.entities
    }

    /// Close the turn with the backend's answer.
    pub fn commit(mut self, answer: TurnRecord) -> CommittedTurn {
        self.turns.push(answer.clone());
        CommittedTurn {
            turns: self.turns,
            memory: vec![self.query, answer],
            source: self.source,
            entities: self.entities,
            entity_records: self.entity_records,
        }
    }
}
