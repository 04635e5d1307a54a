//! Core data models used throughout Docsight.
//!
//! These types represent the chunks, corpus, extracted images, and conversation
//! turns that flow through the load → retrieve → correlate pipeline.

use serde::Serialize;

/// A bounded slice of one document page's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Access role derived from the source filename prefix.
    pub role: String,
    /// Source document filename (e.g. `"A_manual.pdf"`).
    pub source_document: String,
    /// Zero-based page index within the source document.
    pub page_number: u32,
}

/// The ordered sequence of all chunks for all loaded documents.
///
/// A chunk is identified by its position. Storing whole [`Chunk`] records
/// keeps the text/role/source/page views index-aligned by construction; the
/// accessor methods expose those parallel views.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    chunks: Vec<Chunk>,
}

impl Corpus {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn roles(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.role.as_str()).collect()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.chunks
            .iter()
            .map(|c| c.source_document.as_str())
            .collect()
    }

    pub fn pages(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.page_number).collect()
    }

    /// Distinct source documents, in first-seen order.
    pub fn source_documents(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for c in &self.chunks {
            if !seen.iter().any(|s: &String| s == &c.source_document) {
                seen.push(c.source_document.clone());
            }
        }
        seen
    }
}

/// An embedded raster image written to the image directory at load time.
///
/// The filename `{source}_page{page}_{seq}.{ext}` is the only link back to
/// the originating document and page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedImage {
    pub filename: String,
    pub source_document: String,
    pub page_number: u32,
    pub sequence_index: usize,
}

impl ExtractedImage {
    pub fn new(source_document: &str, page_number: u32, sequence_index: usize, ext: &str) -> Self {
        Self {
            filename: image_filename(source_document, page_number, sequence_index, ext),
            source_document: source_document.to_string(),
            page_number,
            sequence_index,
        }
    }

    /// Recover source, page, and sequence from an image filename.
    ///
    /// Splits from the right so that source names containing underscores
    /// survive. Returns `None` when the filename does not follow the pattern.
    pub fn parse(filename: &str) -> Option<Self> {
        let mut parts = filename.rsplitn(3, '_');
        let seq_ext = parts.next()?;
        let page_part = parts.next()?;
        let source = parts.next()?;
        if source.is_empty() {
            return None;
        }

        let page_number = page_part.strip_prefix("page")?.parse::<u32>().ok()?;
        let seq = seq_ext.split('.').next()?;
        let sequence_index = seq.parse::<usize>().ok()?;

        Some(Self {
            filename: filename.to_string(),
            source_document: source.to_string(),
            page_number,
            sequence_index,
        })
    }
}

/// Deterministic image key: `{source}_page{page}_{seq}.{ext}`.
pub fn image_filename(source_document: &str, page_number: u32, seq: usize, ext: &str) -> String {
    format!("{}_page{}_{}.{}", source_document, page_number, seq, ext)
}

/// Prefix shared by every image extracted from one document page.
pub fn page_image_prefix(source_document: &str, page_number: u32) -> String {
    format!("{}_page{}_", source_document, page_number)
}

/// Access role encoded in a document filename: the prefix up to the first
/// underscore, upper-cased. A filename without an underscore is its own role.
pub fn role_from_filename(filename: &str) -> String {
    filename
        .split('_')
        .next()
        .unwrap_or(filename)
        .to_uppercase()
}

/// One prior question/answer exchange for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, role: &str, src: &str, page: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            role: role.to_string(),
            source_document: src.to_string(),
            page_number: page,
        }
    }

    #[test]
    fn test_parallel_views_aligned() {
        let corpus = Corpus::new(vec![
            chunk("a", "A", "A_x.pdf", 0),
            chunk("b", "B", "B_y.pdf", 3),
            chunk("c", "A", "A_x.pdf", 1),
        ]);
        assert_eq!(corpus.texts().len(), corpus.roles().len());
        assert_eq!(corpus.roles().len(), corpus.sources().len());
        assert_eq!(corpus.sources().len(), corpus.pages().len());
        assert_eq!(corpus.pages(), vec![0, 3, 1]);
        assert_eq!(corpus.source_documents(), vec!["A_x.pdf", "B_y.pdf"]);
    }

    #[test]
    fn test_image_filename_roundtrip() {
        let img = ExtractedImage::new("A_manual.pdf", 2, 0, "png");
        assert_eq!(img.filename, "A_manual.pdf_page2_0.png");
        assert_eq!(ExtractedImage::parse(&img.filename), Some(img));
    }

    #[test]
    fn test_parse_source_with_underscores() {
        let img = ExtractedImage::parse("OPS_deck_plan_v2.pdf_page11_3.jpeg").unwrap();
        assert_eq!(img.source_document, "OPS_deck_plan_v2.pdf");
        assert_eq!(img.page_number, 11);
        assert_eq!(img.sequence_index, 3);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ExtractedImage::parse("diagram.png").is_none());
        assert!(ExtractedImage::parse("A.pdf_pg2_0.png").is_none());
        assert!(ExtractedImage::parse("A.pdf_pagex_0.png").is_none());
        assert!(ExtractedImage::parse("_page1_0.png").is_none());
    }

    #[test]
    fn test_role_from_filename() {
        assert_eq!(role_from_filename("engine_manual.pdf"), "ENGINE");
        assert_eq!(role_from_filename("ADMIN_a_b.pdf"), "ADMIN");
        assert_eq!(role_from_filename("plain.pdf"), "PLAIN.PDF");
    }
}
