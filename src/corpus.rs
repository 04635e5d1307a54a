//! Corpus loading and snapshot publication.
//!
//! Loading walks the document directory for `{ROLE}_{name}.pdf` files (sorted
//! by name), and for each document:
//!
//! 1. extracts per-page text and chunks it (role from the filename prefix),
//! 2. exports embedded images to the image directory,
//! 3. records a [`DocumentSummary`].
//!
//! All chunk texts are then embedded once to build the full index. The
//! result is an immutable [`Snapshot`]. [`SharedCorpus`] publishes snapshots
//! by swapping an `Arc`, so in-flight queries keep the snapshot they started
//! with and never observe a half-built corpus.
//!
//! A document that fails to extract is logged and skipped. A load that
//! produces no chunks at all is an error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use docsight_core::chunk::chunk_page;
use docsight_core::correlate::PageTextSource;
use docsight_core::embedding::EmbeddingProvider;
use docsight_core::index::VectorIndex;
use docsight_core::models::{role_from_filename, Chunk, Corpus, ExtractedImage};

use crate::config::Config;
use crate::pdf;

/// Per-document load statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub role: String,
    pub pages: usize,
    pub chunks: usize,
    pub images: usize,
}

/// One published, immutable view of the corpus.
pub struct Snapshot {
    pub corpus: Corpus,
    /// Full index, position-aligned with `corpus`.
    pub index: VectorIndex,
    /// Every extracted image filename, sorted.
    pub images: Vec<String>,
    pub documents: Vec<DocumentSummary>,
    page_texts: HashMap<String, Vec<String>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            corpus: Corpus::default(),
            index: VectorIndex::default(),
            images: Vec::new(),
            documents: Vec::new(),
            page_texts: HashMap::new(),
        }
    }

    /// Assemble a snapshot from already-computed parts.
    pub fn from_parts(
        corpus: Corpus,
        index: VectorIndex,
        mut images: Vec<String>,
        documents: Vec<DocumentSummary>,
        page_texts: HashMap<String, Vec<String>>,
    ) -> Result<Self> {
        if index.len() != corpus.len() {
            bail!(
                "index holds {} vectors for {} chunks",
                index.len(),
                corpus.len()
            );
        }
        images.sort();
        images.dedup();
        Ok(Self {
            corpus,
            index,
            images,
            documents,
            page_texts,
        })
    }

    /// Cached text of one zero-based page.
    pub fn cached_page_text(&self, source_document: &str, page_number: u32) -> Option<&str> {
        self.page_texts
            .get(source_document)
            .and_then(|pages| pages.get(page_number as usize))
            .map(|s| s.as_str())
    }

    pub fn has_image(&self, filename: &str) -> bool {
        self.images.binary_search_by(|i| i.as_str().cmp(filename)).is_ok()
    }
}

#[async_trait]
impl PageTextSource for Snapshot {
    async fn page_text(&self, source_document: &str, page_number: u32) -> Result<Option<String>> {
        Ok(self
            .cached_page_text(source_document, page_number)
            .map(|s| s.to_string()))
    }
}

struct LoadedDocument {
    summary: DocumentSummary,
    chunks: Vec<Chunk>,
    images: Vec<ExtractedImage>,
    pages: Vec<String>,
}

fn load_document(
    path: &Path,
    filename: &str,
    images_dir: &Path,
    chunk_size: usize,
) -> Result<LoadedDocument, pdf::ExtractError> {
    let bytes = std::fs::read(path)?;
    let role = role_from_filename(filename);
    let pages = pdf::page_texts(&bytes)?;

    let mut chunks = Vec::new();
    for (i, text) in pages.iter().enumerate() {
        chunks.extend(chunk_page(text, &role, filename, i as u32, chunk_size));
    }

    let exported = pdf::extract_images(&bytes)?;
    let images = pdf::write_images(filename, &exported, images_dir)?;

    Ok(LoadedDocument {
        summary: DocumentSummary {
            filename: filename.to_string(),
            role,
            pages: pages.len(),
            chunks: chunks.len(),
            images: images.len(),
        },
        chunks,
        images,
        pages,
    })
}

/// PDF files directly inside `dir`, sorted by filename.
pub fn list_documents(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.exists() {
        bail!("Document directory does not exist: {}", dir.display());
    }

    let mut docs = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(".pdf") {
            docs.push((name, entry.into_path()));
        }
    }
    docs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(docs)
}

/// Load every document and build the full index.
pub async fn load_snapshot(config: &Config, embedder: &dyn EmbeddingProvider) -> Result<Snapshot> {
    let docs = list_documents(&config.documents.dir)?;
    let images_dir = config.documents.images_dir.clone();
    let chunk_size = config.chunking.chunk_size;

    let mut chunks = Vec::new();
    let mut images = Vec::new();
    let mut documents = Vec::new();
    let mut page_texts = HashMap::new();

    for (filename, path) in docs {
        let dir = images_dir.clone();
        let name = filename.clone();
        let loaded =
            tokio::task::spawn_blocking(move || load_document(&path, &name, &dir, chunk_size))
                .await?;

        match loaded {
            Ok(doc) => {
                tracing::debug!(
                    document = %doc.summary.filename,
                    role = %doc.summary.role,
                    pages = doc.summary.pages,
                    chunks = doc.summary.chunks,
                    images = doc.summary.images,
                    "loaded document"
                );
                chunks.extend(doc.chunks);
                images.extend(doc.images.into_iter().map(|i| i.filename));
                page_texts.insert(filename, doc.pages);
                documents.push(doc.summary);
            }
            Err(e) => {
                tracing::warn!(document = %filename, error = %e, "skipping document");
            }
        }
    }

    if chunks.is_empty() {
        bail!(
            "No text chunks loaded from {}; add readable {{ROLE}}_name.pdf files",
            config.documents.dir.display()
        );
    }

    let corpus = Corpus::new(chunks);
    let texts: Vec<String> = corpus.texts().iter().map(|t| t.to_string()).collect();
    let index = VectorIndex::build(embedder, &texts)
        .await
        .with_context(|| format!("Failed to embed {} chunks", texts.len()))?;

    let snapshot = Snapshot::from_parts(corpus, index, images, documents, page_texts)?;
    tracing::info!(
        documents = snapshot.documents.len(),
        chunks = snapshot.corpus.len(),
        images = snapshot.images.len(),
        model = embedder.model_name(),
        "corpus loaded"
    );
    Ok(snapshot)
}

/// The currently published snapshot, swappable as a whole.
pub struct SharedCorpus {
    current: RwLock<Arc<Snapshot>>,
    reload: tokio::sync::Mutex<()>,
}

impl SharedCorpus {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    /// The snapshot current at the time of the call.
    pub fn get(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut g) => *g = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuild from disk and publish. Concurrent reloads run one at a time;
    /// on failure the previous snapshot stays published.
    pub async fn reload(&self, config: &Config, embedder: &dyn EmbeddingProvider) -> Result<Arc<Snapshot>> {
        let _guard = self.reload.lock().await;
        let snapshot = load_snapshot(config, embedder).await?;
        self.publish(snapshot);
        tracing::info!("published new corpus snapshot");
        Ok(self.get())
    }
}

/// Resolve an image name inside `images_dir`, refusing path components.
///
/// Returns `None` for names that are not a single plain file name or that do
/// not exist on disk.
pub fn resolve_image(images_dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return None;
    }
    let path = images_dir.join(name);
    path.is_file().then_some(path)
}
