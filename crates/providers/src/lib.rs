//! HTTP backends for kgagent.
//!
//! Every client implements one of the collaborator traits from
//! `kgagent_core` and owns its transport policy (timeouts, retries); the
//! agent core never retries.

pub mod graph_http;
pub mod openai_compat;
pub mod search;
pub mod transport;

pub use graph_http::HttpKnowledgeGraph;
pub use openai_compat::OpenAiCompatProvider;
pub use search::ChatSearchBackend;
