//! Fallback search backend: consulted when the knowledge graph has no answer.

use async_trait::async_trait;
use crate::error::BackendError;
use crate::message::TurnRecord;

/// An external search model that answers a short message sequence with text.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Answer the given messages. The result is returned to the user verbatim.
    async fn search(&self, messages: Vec<TurnRecord>) -> Result<String, BackendError>;
}
