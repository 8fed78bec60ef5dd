//! The context window: a transient, token-budgeted view of the conversation.
//!
//! ```text
//! [0] system persona      ─┐ never evicted
//! [1] user persona        ─┘
//! [2..] history items        seeded from the turn history, rewritten by eviction
//! ---- appended per request, never stored in the view ----
//! "Memory Stream:[...]"
//! "Knowledge Entity Store:[...]"
//! ```
//!
//! Token accounting is two-pass. A request is sent with the current view,
//! the backend reports how many tokens it actually used, and only then is a
//! pending eviction recorded. The eviction itself runs before the next
//! request, so budget decisions never rely on a local tokenizer that may
//! drift from the backend's own count.

use std::ops::Range;

use kgagent_config::ContextConfig;
use kgagent_core::error::{Error, Result};
use kgagent_core::message::TurnRecord;
use kgagent_core::persona::Persona;
use kgagent_core::provider::{Provider, ProviderRequest};
use kgagent_memory::{EntityStore, MemoryStore};
use tracing::{debug, info};

use super::token::estimate_records_tokens;

/// Backend context length in tokens.
pub const CONTEXT_LENGTH: usize = 4096;
/// Fraction of the context length that triggers eviction.
pub const EVICTION_RATE: f64 = 0.7;
/// Most recent history items kept verbatim by eviction.
pub const NONEVICTION_LENGTH: usize = 5;
/// Leading persona slots that are never evicted.
pub const PERSONA_SLOTS: usize = 2;
/// Upper bound on the words of a generated summary.
pub const SUMMARY_WORD_LIMIT: usize = 50;

pub const SUMMARY_PREFIX: &str = "Summarized past conversation:";
pub const MEMORY_STREAM_LABEL: &str = "Memory Stream";
pub const ENTITY_STORE_LABEL: &str = "Knowledge Entity Store";

/// Budget settings of a context window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    pub context_length: usize,
    pub eviction_rate: f64,
    pub noneviction_length: usize,
    pub summary_word_limit: usize,
}

impl WindowSettings {
    pub fn eviction_threshold(&self) -> usize {
        (self.context_length as f64 * self.eviction_rate) as usize
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            context_length: CONTEXT_LENGTH,
            eviction_rate: EVICTION_RATE,
            noneviction_length: NONEVICTION_LENGTH,
            summary_word_limit: SUMMARY_WORD_LIMIT,
        }
    }
}

impl From<&ContextConfig> for WindowSettings {
    fn from(config: &ContextConfig) -> Self {
        Self {
            context_length: config.context_length,
            eviction_rate: config.eviction_rate,
            noneviction_length: config.noneviction_length,
            summary_word_limit: config.summary_word_limit,
        }
    }
}

/// What a completed eviction did.
#[derive(Debug, Clone, PartialEq)]
pub struct Eviction {
    /// Number of history items replaced by the summary
    pub evicted: usize,
    /// The inserted summary item's content
    pub summary: String,
}

/// Token-budgeted view over persona, history and the two context stores.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    settings: WindowSettings,
    view: Vec<TurnRecord>,
    last_total_tokens: Option<usize>,
    pending_eviction: bool,
}

impl ContextWindow {
    /// Seed a window with the persona pair followed by `history`.
    pub fn new(persona: &Persona, history: &[TurnRecord], settings: WindowSettings) -> Self {
        let mut view = Vec::with_capacity(PERSONA_SLOTS + history.len());
        view.push(TurnRecord::system(&persona.system));
        view.push(TurnRecord::user(&persona.user));
        view.extend_from_slice(history);
        Self {
            settings,
            view,
            last_total_tokens: None,
            pending_eviction: false,
        }
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// The full view, persona slots included.
    pub fn view(&self) -> &[TurnRecord] {
        &self.view
    }

    /// History items after the persona slots.
    pub fn history(&self) -> &[TurnRecord] {
        &self.view[PERSONA_SLOTS..]
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.len() <= PERSONA_SLOTS
    }

    /// Append committed turns to the view.
    pub fn extend(&mut self, records: impl IntoIterator<Item = TurnRecord>) {
        self.view.extend(records);
    }

    /// Build the outbound prompt: the view, then `staged` turns of the
    /// current call, then one rendering of each context store.
    pub fn assemble(
        &self,
        staged: &[TurnRecord],
        memory: &MemoryStore,
        entities: &EntityStore,
    ) -> Result<Vec<TurnRecord>> {
        let mut prompt = Vec::with_capacity(self.view.len() + staged.len() + 2);
        prompt.extend_from_slice(&self.view);
        prompt.extend_from_slice(staged);
        prompt.push(TurnRecord::user(memory.render(MEMORY_STREAM_LABEL)?));
        prompt.push(TurnRecord::user(entities.render(ENTITY_STORE_LABEL)?));
        Ok(prompt)
    }

    /// Record the backend-reported token total of the last request.
    ///
    /// Returns whether an eviction is now pending.
    pub fn measure(&mut self, total_tokens: usize) -> bool {
        let threshold = self.settings.eviction_threshold();
        self.last_total_tokens = Some(total_tokens);
        if total_tokens > threshold {
            info!(total_tokens, threshold, "Token budget exceeded, eviction pending");
            self.pending_eviction = true;
        }
        self.pending_eviction
    }

    pub fn pending_eviction(&self) -> bool {
        self.pending_eviction
    }

    pub fn last_total_tokens(&self) -> Option<usize> {
        self.last_total_tokens
    }

    /// Local estimate of the view's size, recomputed on every call.
    pub fn estimated_tokens(&self) -> usize {
        estimate_records_tokens(&self.view)
    }

    /// Index range eviction would replace.
    ///
    /// The last `noneviction_length` items survive when the view is longer
    /// than the persona slots plus that tail; otherwise everything after the
    /// persona slots goes.
    pub fn eviction_range(&self) -> Range<usize> {
        let len = self.view.len();
        let keep = self.settings.noneviction_length;
        if len <= PERSONA_SLOTS + keep {
            PERSONA_SLOTS..len
        } else {
            PERSONA_SLOTS..len - keep
        }
    }

    /// Replace older history with one generated summary item at index 2.
    ///
    /// The summary comes from a dedicated completion request over exactly the
    /// evicted items. When that request fails the view is left untouched,
    /// the eviction stays pending and [`Error::Summarization`] is returned.
    /// An empty range is a no-op that clears the pending flag.
    pub async fn evict_and_summarize(
        &mut self,
        summarizer: &dyn Provider,
        model: &str,
    ) -> Result<Option<Eviction>> {
        let range = self.eviction_range();
        if range.is_empty() {
            debug!("Nothing to evict");
            self.pending_eviction = false;
            return Ok(None);
        }

        let limit = self.settings.summary_word_limit;
        let mut messages = Vec::with_capacity(range.len() + 1);
        messages.push(TurnRecord::system(format!(
            "Summarize these previous conversations into {limit} words"
        )));
        messages.extend_from_slice(&self.view[range.clone()]);

        let response = summarizer
            .complete(ProviderRequest::new(model, messages))
            .await
            .map_err(Error::Summarization)?;

        let summary = format!(
            "{SUMMARY_PREFIX}{}",
            truncate_words(&response.message.content, limit)
        );
        let evicted = range.len();
        self.view
            .splice(range, std::iter::once(TurnRecord::assistant(&summary)));
        self.pending_eviction = false;

        info!(
            evicted,
            remaining = self.view.len(),
            estimated_tokens = self.estimated_tokens(),
            "Context evicted and summarized"
        );
        Ok(Some(Eviction { evicted, summary }))
    }
}

/// Keep at most `limit` whitespace-separated words.
fn truncate_words(text: &str, limit: usize) -> String {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(limit).collect();
    if words.next().is_none() {
        return text.trim().to_string();
    }
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use kgagent_core::entity::EntityRecord;
    use kgagent_core::error::BackendError;
    use kgagent_core::message::Role;
    use kgagent_memory::Journal;

    fn persona() -> Persona {
        Persona::new("tester", "You are a test agent.", "The user likes tests.")
    }

    fn history(n: usize) -> Vec<TurnRecord> {
        (1..=n)
            .map(|i| {
                if i % 2 == 1 {
                    TurnRecord::user(format!("msg{i}"))
                } else {
                    TurnRecord::assistant(format!("msg{i}"))
                }
            })
            .collect()
    }

    fn window(n: usize) -> ContextWindow {
        ContextWindow::new(&persona(), &history(n), WindowSettings::default())
    }

    #[test]
    fn seeded_with_persona_slots() {
        let w = window(3);
        assert_eq!(w.len(), 5);
        assert_eq!(w.view()[0].role, Role::System);
        assert_eq!(w.view()[1].role, Role::User);
        assert_eq!(w.view()[1].content, "The user likes tests.");
        assert_eq!(w.history().len(), 3);
    }

    #[test]
    fn assemble_orders_view_staged_and_stores() {
        let w = window(2);
        let mut memory: MemoryStore = Journal::new("m.jsonl");
        memory.append(TurnRecord::user("earlier question"));
        let mut entities: EntityStore = Journal::new("e.jsonl");
        entities.append(EntityRecord::new("Harry", "SUBJECT"));

        let staged = vec![TurnRecord::user("new question")];
        let prompt = w.assemble(&staged, &memory, &entities).unwrap();

        assert_eq!(prompt.len(), 2 + 2 + 1 + 2);
        assert_eq!(prompt[4].content, "new question");
        assert!(prompt[5].content.starts_with("Memory Stream:["));
        assert!(prompt[5].content.contains("earlier question"));
        assert!(prompt[6].content.starts_with("Knowledge Entity Store:["));
        assert!(prompt[6].content.contains("Harry"));
        // Pure read
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn measure_sets_pending_only_above_threshold() {
        let mut w = window(0);
        assert_eq!(w.settings().eviction_threshold(), 2867);
        assert!(!w.measure(2867));
        assert!(!w.pending_eviction());
        assert!(w.measure(2868));
        assert!(w.pending_eviction());
        assert_eq!(w.last_total_tokens(), Some(2868));
    }

    #[test]
    fn estimate_tracks_mutations() {
        let mut w = window(0);
        let before = w.estimated_tokens();
        w.extend([TurnRecord::user("a".repeat(400))]);
        assert_eq!(w.estimated_tokens(), before + 104);
    }

    #[tokio::test]
    async fn long_history_keeps_tail() {
        // [sys, user, msg1..msg10] -> [sys, user, summary, msg6..msg10]
        let mut w = window(10);
        assert_eq!(w.len(), 12);
        w.measure(3000);
        let provider = SequentialMockProvider::new(vec![make_text_response("They talked.")]);

        let eviction = w
            .evict_and_summarize(&provider, "gpt-3.5-turbo")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(eviction.evicted, 5);
        assert_eq!(w.len(), 8);
        assert_eq!(w.view()[2].role, Role::Assistant);
        assert_eq!(w.view()[2].content, "Summarized past conversation:They talked.");
        let tail: Vec<&str> = w.view()[3..].iter().map(|r| r.content.as_str()).collect();
        assert_eq!(tail, vec!["msg6", "msg7", "msg8", "msg9", "msg10"]);
        assert!(!w.pending_eviction());

        // The summary request covers exactly the evicted slice.
        let requests = provider.requests();
        let sent: Vec<&str> = requests[0].messages[1..]
            .iter()
            .map(|r| r.content.as_str())
            .collect();
        assert_eq!(sent, vec!["msg1", "msg2", "msg3", "msg4", "msg5"]);
        assert!(requests[0].messages[0].content.contains("50 words"));
    }

    #[tokio::test]
    async fn short_history_is_evicted_entirely() {
        for n in 1..=NONEVICTION_LENGTH {
            let mut w = window(n);
            let provider = SequentialMockProvider::new(vec![make_text_response("short")]);
            let eviction = w.evict_and_summarize(&provider, "m").await.unwrap().unwrap();
            assert_eq!(eviction.evicted, n);
            assert_eq!(w.len(), PERSONA_SLOTS + 1);
            assert!(w.view()[2].content.starts_with(SUMMARY_PREFIX));
        }
    }

    #[tokio::test]
    async fn one_more_than_tail_evicts_one() {
        let mut w = window(NONEVICTION_LENGTH + 1);
        let provider = SequentialMockProvider::new(vec![make_text_response("s")]);
        let eviction = w.evict_and_summarize(&provider, "m").await.unwrap().unwrap();
        assert_eq!(eviction.evicted, 1);
        assert_eq!(w.len(), PERSONA_SLOTS + 1 + NONEVICTION_LENGTH);
    }

    #[tokio::test]
    async fn empty_history_is_a_noop() {
        let mut w = window(0);
        w.measure(5000);
        let provider = SequentialMockProvider::new(vec![]);
        assert!(w.evict_and_summarize(&provider, "m").await.unwrap().is_none());
        assert_eq!(w.len(), PERSONA_SLOTS);
        assert!(!w.pending_eviction());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_summary_leaves_view_unchanged() {
        let mut w = window(10);
        w.measure(4000);
        let before = w.view().to_vec();
        let provider = SequentialMockProvider::with_results(vec![Err(
            BackendError::QuotaExceeded("out of credits".into()),
        )]);

        let err = w.evict_and_summarize(&provider, "m").await.unwrap_err();
        assert!(matches!(err, Error::Summarization(BackendError::QuotaExceeded(_))));
        assert_eq!(w.view(), before.as_slice());
        assert!(w.pending_eviction());
    }

    #[tokio::test]
    async fn summary_is_word_limited() {
        let mut w = window(3);
        let long = "word ".repeat(80);
        let provider = SequentialMockProvider::new(vec![make_text_response(&long)]);
        let eviction = w.evict_and_summarize(&provider, "m").await.unwrap().unwrap();
        let body = eviction.summary.trim_start_matches(SUMMARY_PREFIX);
        assert_eq!(body.split_whitespace().count(), SUMMARY_WORD_LIMIT);
    }

    #[test]
    fn truncate_words_keeps_short_text() {
        assert_eq!(truncate_words("  a b c ", 5), "a b c");
        assert_eq!(truncate_words("a b c d", 2), "a b");
    }
}
