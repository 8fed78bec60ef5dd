//! The kgagent agent core.
//!
//! Answers questions from a knowledge graph first and a web search backend
//! second, keeping a token-budgeted conversation window and three durable
//! stores per agent:
//!
//! 1. **Receive** a user query
//! 2. **Resolve** it against the knowledge graph, or search on a miss
//! 3. **Assemble** persona, history, memory stream and entity store
//! 4. **Complete** with the configured backend and measure reported usage
//! 5. **Write back** the answer so the graph learns from it
//!
//! When a response reports more tokens than the eviction threshold, the
//! next turn first replaces older history with a generated summary.

pub mod context;
pub mod controller;
pub mod retrieval;
pub mod scratch;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextWindow, Eviction, WindowSettings};
pub use controller::{Agent, Collaborators, TurnReport};
pub use retrieval::{AnswerSource, EntityExtractor, KnowledgeOrchestrator, Resolution};
pub use scratch::TurnScratch;
