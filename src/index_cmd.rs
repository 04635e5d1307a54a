//! `docsight index`: load the corpus once and report what was found.
//!
//! Runs the same load path as the server (text, chunks, image export,
//! embeddings) and prints a per-document table followed by per-role totals.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::corpus::load_snapshot;
use crate::embedding::create_provider;

pub async fn run_index(config: &Config) -> Result<()> {
    let embedder = create_provider(&config.embedding)?;
    let snapshot = load_snapshot(config, embedder.as_ref()).await?;

    println!(
        "{:<40} {:<12} {:>6} {:>7} {:>7}",
        "DOCUMENT", "ROLE", "PAGES", "CHUNKS", "IMAGES"
    );
    let mut per_role: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
    for doc in &snapshot.documents {
        println!(
            "{:<40} {:<12} {:>6} {:>7} {:>7}",
            doc.filename, doc.role, doc.pages, doc.chunks, doc.images
        );
        let entry = per_role.entry(doc.role.as_str()).or_default();
        entry.0 += 1;
        entry.1 += doc.chunks;
        entry.2 += doc.images;
    }

    println!();
    for (role, (docs, chunks, images)) in &per_role {
        println!(
            "{}: {} documents, {} chunks, {} images",
            role, docs, chunks, images
        );
    }
    println!(
        "Total: {} documents, {} chunks, {} images (embedding model: {})",
        snapshot.documents.len(),
        snapshot.corpus.len(),
        snapshot.images.len(),
        embedder.model_name()
    );

    Ok(())
}
