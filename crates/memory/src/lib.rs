//! Durable stores and an in-memory knowledge graph for kgagent.

pub mod graph;
pub mod journal;
pub mod stores;

pub use graph::InMemoryGraph;
pub use journal::{EntityStore, HistoryStore, Journal, MemoryStore};
pub use stores::AgentStores;
