//! # kgagent Core
//!
//! Domain types, collaborator traits, and error definitions for the kgagent
//! knowledge-graph agent. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion backend, fallback search, knowledge
//! graph) is a trait here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod entity;
pub mod provider;
pub mod search;
pub mod graph;
pub mod persona;

// Re-export key types at crate root for ergonomics
pub use error::{BackendError, Error, PersistenceError, Result};
pub use message::{Role, TurnRecord};
pub use entity::EntityRecord;
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use search::SearchBackend;
pub use graph::{
    Document, GraphMetadata, GraphQueryResult, IngestRequest, KnowledgeGraph, KnowledgeGraphHit,
    RelationEdge, RelationMap,
};
pub use persona::{Persona, PersonaPaths};
