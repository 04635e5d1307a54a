//! Role-scoped retrieval engine.
//!
//! Answers one question against the chunks a role may see:
//!
//! 1. Filter the corpus by role (`chunk.role == role_to_query`, or everything
//!    when `role_to_query` is the admin role).
//! 2. Build a fresh index over the filtered subset.
//! 3. Take the `top_k` nearest chunks and newline-join them, nearest first,
//!    as the context.
//! 4. Render recent conversation turns as alternating dialogue lines.
//! 5. Ask the chat model with the fixed system instruction.
//! 6. Return the answer together with the matched positions (within the
//!    subset) and their `(source, page)` provenance.
//!
//! An empty subset is not an error: the index is empty, the context is empty,
//! and the model's instruction makes it answer that the information is not
//! available.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::{Chunk, ConversationTurn, Corpus};

/// Role whose queries see every chunk regardless of its own role tag.
pub const DEFAULT_ADMIN_ROLE: &str = "ADMIN";

/// Nearest chunks fed to the model per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Prior turns merged into the prompt.
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Fixed system instruction for document answers.
pub const SYSTEM_PROMPT: &str = "You are an enterprise assistant providing clear, well-structured information.

IMPORTANT: Format your responses with:
- Clear headings (use ## or ###)
- Numbered lists (1. 2. 3.) for steps or sequences
- Bullet points (- ) for lists of items
- Bold text for **key terms**
- Proper paragraphs with line breaks

NO ASCII ART BOXES OR DIAGRAMS. Use clean text formatting only.

If information is not in the context, say:
'This information is not available in the document.'";

/// Which role a viewer's question is scoped to.
///
/// Viewers holding a privileged role may query on behalf of any requested
/// role; everyone else is pinned to their own role.
pub fn resolve_query_role(viewer_role: &str, requested_role: &str, privileged: &[String]) -> String {
    if privileged.iter().any(|p| p == viewer_role) {
        requested_role.to_string()
    } else {
        viewer_role.to_string()
    }
}

/// Role filter predicate.
pub fn role_admits(chunk_role: &str, role_to_query: &str, admin_role: &str) -> bool {
    chunk_role == role_to_query || role_to_query == admin_role
}

/// The chunks of a corpus visible to one role, in corpus order.
///
/// Subset position `i` maps to corpus position `positions()[i]`.
#[derive(Debug, Clone)]
pub struct RoleSubset<'a> {
    corpus: &'a Corpus,
    positions: Vec<usize>,
}

impl<'a> RoleSubset<'a> {
    pub fn filter(corpus: &'a Corpus, role_to_query: &str, admin_role: &str) -> Self {
        let positions = corpus
            .chunks()
            .iter()
            .enumerate()
            .filter(|(_, c)| role_admits(&c.role, role_to_query, admin_role))
            .map(|(i, _)| i)
            .collect();
        Self { corpus, positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Corpus positions of the subset, index-aligned with the subset.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Whether the subset is the entire corpus.
    pub fn is_whole_corpus(&self) -> bool {
        self.positions.len() == self.corpus.len()
    }

    pub fn get(&self, subset_position: usize) -> Option<&'a Chunk> {
        self.positions
            .get(subset_position)
            .and_then(|&p| self.corpus.get(p))
    }

    pub fn texts(&self) -> Vec<String> {
        self.iter().map(|c| c.text.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Chunk> + '_ {
        self.positions.iter().filter_map(|&p| self.corpus.get(p))
    }

    /// Distinct source documents in the subset, in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for c in self.iter() {
            if !seen.contains(&c.source_document) {
                seen.push(c.source_document.clone());
            }
        }
        seen
    }
}

/// `(source, page)` provenance of a matched chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    pub source_document: String,
    pub page_number: u32,
}

/// Result of one retrieval-augmented answer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub answer: String,
    /// Matched positions within the role subset, nearest first.
    pub matched_positions: Vec<usize>,
    /// Provenance of each matched position, index-aligned.
    pub matched_pages: Vec<PageRef>,
}

/// Render prior turns as `User:` / `Assistant:` lines, oldest first.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for t in turns {
        out.push_str(&format!("User: {}\nAssistant: {}\n", t.question, t.answer));
    }
    out
}

/// Newline-join chunk texts in the given order.
pub fn build_context<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for t in texts {
        out.push_str(t);
        out.push('\n');
    }
    out
}

/// The user turn sent with [`SYSTEM_PROMPT`].
pub fn build_user_prompt(history: &str, context: &str, question: &str) -> String {
    format!(
        "\nPrevious Conversation:\n{}\n\nContext from Document:\n{}\n\nQuestion:\n{}\n\nPlease provide a clear, well-structured answer using markdown formatting.\n",
        history, context, question
    )
}

/// Retrieval engine bound to one embedding service and one chat model.
pub struct Retriever<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub chat: &'a dyn ChatModel,
    pub top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn EmbeddingProvider, chat: &'a dyn ChatModel) -> Self {
        Self {
            embedder,
            chat,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Build the index for a role subset.
    ///
    /// With `corpus_index` (vectors cached for every corpus position) the
    /// subset index is cut from the cached vectors, or reused outright when
    /// the subset is the whole corpus. Without it, subset texts are embedded.
    pub async fn subset_index(
        &self,
        subset: &RoleSubset<'_>,
        corpus_index: Option<&VectorIndex>,
    ) -> Result<VectorIndex> {
        match corpus_index {
            Some(full) if subset.is_whole_corpus() && full.len() == subset.len() => {
                Ok(full.clone())
            }
            Some(full) => full.subset(subset.positions()),
            None => VectorIndex::build(self.embedder, &subset.texts()).await,
        }
    }

    /// Answer `question` from the chunks in `subset`.
    pub async fn retrieve(
        &self,
        question: &str,
        subset: &RoleSubset<'_>,
        corpus_index: Option<&VectorIndex>,
        history: &[ConversationTurn],
    ) -> Result<RetrievalOutcome> {
        let index = self.subset_index(subset, corpus_index).await?;
        let neighbors = index.query(self.embedder, question, self.top_k).await?;

        let mut matched_positions = Vec::with_capacity(neighbors.len());
        let mut matched_pages = Vec::with_capacity(neighbors.len());
        let mut matched_texts = Vec::with_capacity(neighbors.len());
        for n in &neighbors {
            if let Some(chunk) = subset.get(n.position) {
                matched_positions.push(n.position);
                matched_pages.push(PageRef {
                    source_document: chunk.source_document.clone(),
                    page_number: chunk.page_number,
                });
                matched_texts.push(chunk.text.as_str());
            }
        }

        tracing::debug!(
            subset = subset.len(),
            matched = ?matched_pages
                .iter()
                .map(|p| (p.source_document.as_str(), p.page_number))
                .collect::<Vec<_>>(),
            "retrieved chunks"
        );

        let context = build_context(matched_texts);
        let history_text = format_history(history);
        let user_prompt = build_user_prompt(&history_text, &context, question);
        let answer = self.chat.chat(SYSTEM_PROMPT, &user_prompt).await?;

        Ok(RetrievalOutcome {
            answer,
            matched_positions,
            matched_pages,
        })
    }
}
