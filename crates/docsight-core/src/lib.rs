//! # Docsight Core
//!
//! Shared, I/O-free logic for Docsight: data models, word chunking, the
//! exact L2 vector index, role-scoped retrieval, diagram correlation, the
//! image follow-up classifier, and the per-user image window.
//!
//! This crate contains no tokio, sqlx, filesystem, or network code. External
//! services (embedding, chat, vision, page text, chat history) are reached
//! through the traits defined here and implemented by the `docsight` app
//! crate.

pub mod chunk;
pub mod correlate;
pub mod embedding;
pub mod history;
pub mod index;
pub mod intent;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod session;
