//! # Docsight
//!
//! Role-scoped question answering over technical PDF documents.
//!
//! Documents named `{ROLE}_{name}.pdf` are split into page-tagged chunks,
//! embedded, and indexed. A question is answered only from the chunks its
//! role may see; diagrams extracted from the matched pages are attached to
//! the answer and interpreted by a vision model. Follow-up questions such as
//! "explain the above diagram" are routed to the most recently shown image.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ documents/  │──▶│ Corpus load  │──▶│  Snapshot    │
//! │ ROLE_*.pdf  │   │ text+images  │   │ chunks+index │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │
//!                 ┌──────────────────────────┤
//!                 ▼                          ▼
//!          ┌─────────────┐            ┌─────────────┐
//!          │ Ask pipeline│◀──────────▶│ HTTP / CLI  │
//!          │ LLM + vision│            │             │
//!          └─────────────┘            └─────────────┘
//! ```
//!
//! Pure logic (chunking, the vector index, retrieval, correlation, intent,
//! session window) lives in `docsight-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`pdf`] | Page text and image extraction |
//! | [`corpus`] | Corpus loading and snapshot publication |
//! | [`embedding`] | Embedding service clients |
//! | [`llm`] | Chat and vision model clients |
//! | [`analysis`] | Vision analysis and image annotation |
//! | [`ask`] | The question-answering pipeline |
//! | [`history`] | SQLite chat history |
//! | [`server`] | HTTP server |
//! | [`index_cmd`] | `docsight index` report |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod ask;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod history;
pub mod index_cmd;
pub mod llm;
pub mod migrate;
pub mod pdf;
pub mod server;
