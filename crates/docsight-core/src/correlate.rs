//! Image correlation: match extracted diagrams to an answer.
//!
//! Given the `(source, page)` pairs of the matched chunks, the correlator
//!
//! 1. builds the prefixes `{source}_page{page}_`,
//! 2. collects every extracted image whose filename starts with one of them
//!    (deduplicated, first-seen order),
//! 3. mines rule references from the question and the answer,
//! 4. when references and candidates both exist, keeps the candidates whose
//!    page text mentions `RULE <n>` for a referenced `n`,
//! 5. falls back to the full candidate set when that keeps nothing.
//!
//! Page-text lookup failures keep the image. Over-inclusion is preferred to
//! silently dropping a diagram whose page could not be read.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

use crate::models::{page_image_prefix, ExtractedImage};
use crate::retrieval::PageRef;

static RULE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RULE\s+(\d+)").expect("rule reference pattern"));

static SECTION_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:RULE\s+)?(\d+)\s*\(").expect("section reference pattern")
});

/// Source of page text for rule verification.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    /// Text of one zero-based page.
    ///
    /// `Ok(None)` means the document or page does not exist, so the image
    /// cannot depict a cited rule. `Err` means the page could not be read.
    async fn page_text(&self, source_document: &str, page_number: u32) -> Result<Option<String>>;
}

/// Rule numbers cited in the question or answer.
///
/// Collects integers after `RULE` (any case) in both texts, plus integers
/// followed by an opening parenthesis (`25(c)`) in the answer.
pub fn mine_rule_references(question: &str, answer: &str) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for text in [question, answer] {
        for cap in RULE_REF.captures_iter(text) {
            refs.insert(cap[1].to_string());
        }
    }
    for cap in SECTION_REF.captures_iter(answer) {
        refs.insert(cap[1].to_string());
    }
    refs
}

/// One pattern matching `RULE <n>` for any of `rules`, word-boundary guarded
/// in front and followed by a non-digit or the end of text.
pub fn rule_pattern(rules: &BTreeSet<String>) -> Result<Regex, regex::Error> {
    let alternation: Vec<String> = rules.iter().map(|r| regex::escape(r)).collect();
    Regex::new(&format!(
        r"(?i)\bRULE\s+(?:{})(?:[^0-9]|$)",
        alternation.join("|")
    ))
}

/// Images extracted from any matched page, deduplicated in first-seen order.
pub fn candidate_images(matched_pages: &[PageRef], images: &[String]) -> Vec<String> {
    let prefixes: BTreeSet<String> = matched_pages
        .iter()
        .map(|p| page_image_prefix(&p.source_document, p.page_number))
        .collect();

    let mut out: Vec<String> = Vec::new();
    for img in images {
        if prefixes.iter().any(|p| img.starts_with(p.as_str())) && !out.contains(img) {
            out.push(img.clone());
        }
    }
    out
}

/// Outcome of one correlation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Correlation {
    /// Final image filenames.
    pub images: Vec<String>,
    /// Every image sharing a matched page.
    pub candidates: Vec<String>,
    pub rule_references: BTreeSet<String>,
    /// True when rule filtering kept nothing and all candidates were returned.
    pub used_fallback: bool,
}

/// Correlate extracted images with a question/answer pair.
pub async fn correlate_images(
    question: &str,
    answer: &str,
    matched_pages: &[PageRef],
    images: &[String],
    pages: &dyn PageTextSource,
) -> Correlation {
    let candidates = candidate_images(matched_pages, images);
    let rule_references = mine_rule_references(question, answer);

    let mut kept = Vec::new();
    if !rule_references.is_empty() && !candidates.is_empty() {
        match rule_pattern(&rule_references) {
            Ok(pattern) => {
                for img in &candidates {
                    if keep_for_rules(img, &pattern, pages).await {
                        kept.push(img.clone());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, rules = ?rule_references, "invalid rule pattern, skipping rule filter");
            }
        }
    }

    let used_fallback = kept.is_empty() && !candidates.is_empty();
    if used_fallback {
        kept = candidates.clone();
    }

    Correlation {
        images: kept,
        candidates,
        rule_references,
        used_fallback,
    }
}

async fn keep_for_rules(
    image: &str,
    pattern: &Regex,
    pages: &dyn PageTextSource,
) -> bool {
    let parsed = match ExtractedImage::parse(image) {
        Some(p) => p,
        None => {
            tracing::debug!(image, "unparseable image name, keeping candidate");
            return true;
        }
    };

    match pages
        .page_text(&parsed.source_document, parsed.page_number)
        .await
    {
        Ok(Some(text)) => pattern.is_match(&text),
        Ok(None) => false,
        Err(e) => {
            tracing::debug!(image, error = %e, "page text unavailable, keeping candidate");
            true
        }
    }
}
