use chrono::Utc;
use uuid::Uuid;

use crate::{
    document::{Category, DocumentMeta},
    encoder::TextEncoder,
    error::Result,
    store::VectorStore,
};

/// Canonical reply when nothing in the store is close enough to the query.
pub const REFUSAL: &str = "I'm sorry, I don't have information on that at the moment. Please check with your college administration.";

/// Lead-in sentence for a populated answer.
pub const LEAD_IN: &str = "Based on the college information:\n\n";

/// Retrieval and assembly knobs. The defaults are the production policy;
/// tests and embedders can tighten or loosen them per engine.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalPolicy {
    /// Nearest neighbors fetched per query.
    pub top_k: usize,
    /// Minimum cosine similarity for an excerpt to be used (inclusive).
    pub score_threshold: f32,
    /// Excerpts included in an answer, counted from the best match down.
    pub max_excerpts: usize,
    /// Hard cap on answer length in characters before the ellipsis marker.
    pub max_answer_chars: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.5,
            max_excerpts: 2,
            max_answer_chars: 800,
        }
    }
}

/// A document handed to `Engine::ingest`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IngestRequest {
    pub content: String,
    pub category: Category,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// The retrieval-and-response engine: one encoder, one store, no other
/// state. Each `answer` or `ingest` call is an independent request-response
/// cycle; chat history and sessions live in whatever hosts the engine.
pub struct Engine<E, S> {
    encoder: E,
    store: S,
    policy: RetrievalPolicy,
}

impl<E: TextEncoder, S: VectorStore> Engine<E, S> {
    pub fn new(encoder: E, store: S) -> Self {
        Self::with_policy(encoder, store, RetrievalPolicy::default())
    }

    pub fn with_policy(encoder: E, store: S, policy: RetrievalPolicy) -> Self {
        Self {
            encoder,
            store,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer a free-text question from stored announcements.
    ///
    /// The reply is extractive: verbatim `"{title}: {content}"` excerpts
    /// from the closest matches above the similarity threshold, or the
    /// canonical refusal when nothing qualifies. Encoder and store failures
    /// propagate; "no good match" does not.
    pub fn answer(&mut self, query: &str) -> Result<String> {
        // An empty query reads as "no matches", not an error.
        if query.trim().is_empty() {
            return Ok(REFUSAL.to_string());
        }

        let query_vector = self.encoder.encode(query)?;
        let matches = self.store.query(&query_vector, self.policy.top_k)?;

        let Some(best) = matches.first() else {
            return Ok(REFUSAL.to_string());
        };
        if best.score < self.policy.score_threshold {
            tracing::debug!(
                best_score = best.score,
                threshold = self.policy.score_threshold,
                "best match below threshold"
            );
            return Ok(REFUSAL.to_string());
        }

        let excerpts: Vec<String> = matches
            .iter()
            .filter(|m| m.score >= self.policy.score_threshold)
            .take(self.policy.max_excerpts)
            .map(|m| format!("{}: {}", m.meta.title, m.meta.content))
            .collect();

        let mut response = format!("{LEAD_IN}{}", excerpts.join("\n\n"));

        // Hard character cap, not word-boundary aware.
        if response.chars().count() > self.policy.max_answer_chars {
            response = response
                .chars()
                .take(self.policy.max_answer_chars)
                .collect();
            response.push_str("...");
        }

        Ok(response)
    }

    /// Ingest one announcement into the knowledge store.
    ///
    /// Empty content is rejected before the encoder or store is touched.
    /// Collaborator failures are logged and reported as `false`; this is a
    /// best-effort boolean contract, the caller owns user-facing messaging.
    pub fn ingest(&mut self, request: &IngestRequest) -> bool {
        if request.content.trim().is_empty() {
            return false;
        }

        match self.try_ingest(request) {
            Ok(id) => {
                tracing::info!(
                    id,
                    category = %request.category,
                    title = %request.title,
                    "document ingested"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "ingest failed");
                false
            }
        }
    }

    fn try_ingest(&mut self, request: &IngestRequest) -> Result<String> {
        let vector = self.encoder.encode(&request.content)?;

        // Random id rather than a content hash: re-ingesting the same text
        // accumulates a new record instead of silently overwriting.
        let id = Uuid::new_v4().to_string();

        let meta = DocumentMeta {
            title: request.title.clone(),
            content: request.content.clone(),
            category: request.category,
            department: request.department.clone(),
            date: request.date.clone(),
            ingested_at: Utc::now(),
        };

        self.store.upsert(&id, &vector, &meta)?;
        Ok(id)
    }
}
