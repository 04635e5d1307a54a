//! The question-answering pipeline.
//!
//! One call to [`Assistant::ask`] runs, in order:
//!
//! 1. query role resolution (privileged viewers may query another role),
//! 2. image selection: an explicit `last_image` wins; otherwise, when the
//!    question reads like an image follow-up and the user has a session
//!    image, the most recent one is used,
//! 3. with a selected image that exists on disk: vision highlight of that
//!    image, returned as an `image_analysis` answer,
//! 4. otherwise: role-scoped retrieval with recent history, image
//!    correlation, and one vision interpretation per correlated image,
//!    returned as a `document_query` answer.
//!
//! Both branches append the turn to chat history. Only the document branch
//! updates the user's session image window.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use docsight_core::correlate::correlate_images;
use docsight_core::embedding::EmbeddingProvider;
use docsight_core::history::HistoryStore;
use docsight_core::intent::is_image_analysis_request;
use docsight_core::llm::ChatModel;
use docsight_core::retrieval::{resolve_query_role, RoleSubset, Retriever};
use docsight_core::session::ImageSessions;

use crate::analysis::{AnalysisInfo, HighlightResult, ImageAnalyzer};
use crate::config::RetrievalConfig;
use crate::corpus::{resolve_image, Snapshot};

/// One question from an identified viewer.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub username: String,
    pub viewer_role: String,
    /// Role the viewer asks on behalf of; honored only for privileged viewers.
    pub requested_role: String,
    pub question: String,
    pub last_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    DocumentQuery,
    ImageAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageDetail {
    pub image: String,
    pub interpretation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_info: Option<AnalysisInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Distinct source documents visible to the queried role.
    pub source: Vec<String>,
    pub images: Vec<String>,
    pub image_details: Vec<ImageDetail>,
    pub analysis_type: AnalysisType,
}

/// Long-lived services the pipeline runs against.
#[derive(Clone)]
pub struct Assistant {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chat: Arc<dyn ChatModel>,
    pub analyzer: ImageAnalyzer,
    pub history: Arc<dyn HistoryStore>,
    pub sessions: Arc<ImageSessions>,
    pub images_dir: PathBuf,
    pub retrieval: RetrievalConfig,
}

impl Assistant {
    /// Answer one question against `snapshot`.
    pub async fn ask(&self, snapshot: &Snapshot, req: &AskRequest) -> Result<AskResponse> {
        let role_to_query = resolve_query_role(
            &req.viewer_role,
            &req.requested_role,
            &self.retrieval.privileged_roles,
        );
        let subset = RoleSubset::filter(&snapshot.corpus, &role_to_query, &self.retrieval.admin_role);
        tracing::debug!(
            user = %req.username,
            role = %role_to_query,
            subset = subset.len(),
            "answering question"
        );

        if let Some(name) = self.select_image(req) {
            match resolve_image(&self.images_dir, &name) {
                Some(path) => {
                    let result = self.analyzer.highlight(&path, &req.question).await;
                    let detail = match result {
                        HighlightResult::Success {
                            interpretation,
                            highlighted_image,
                            analysis_info,
                            ..
                        } => ImageDetail {
                            image: name.clone(),
                            interpretation,
                            highlighted_image: Some(highlighted_image),
                            analysis_info: Some(analysis_info),
                        },
                        HighlightResult::Error { message } => ImageDetail {
                            image: name.clone(),
                            interpretation: message,
                            highlighted_image: None,
                            analysis_info: None,
                        },
                    };

                    self.history
                        .append(&req.username, &req.question, &detail.interpretation)
                        .await?;

                    return Ok(AskResponse {
                        answer: detail.interpretation.clone(),
                        source: subset.sources(),
                        images: vec![name],
                        image_details: vec![detail],
                        analysis_type: AnalysisType::ImageAnalysis,
                    });
                }
                None => {
                    tracing::debug!(image = %name, "selected image not found, answering from documents");
                }
            }
        }

        let history = self
            .history
            .recent(&req.username, self.retrieval.history_turns)
            .await?;
        let retriever =
            Retriever::new(self.embedder.as_ref(), self.chat.as_ref()).with_top_k(self.retrieval.top_k);
        let outcome = retriever
            .retrieve(&req.question, &subset, Some(&snapshot.index), &history)
            .await?;

        self.history
            .append(&req.username, &req.question, &outcome.answer)
            .await?;

        let correlation = correlate_images(
            &req.question,
            &outcome.answer,
            &outcome.matched_pages,
            &snapshot.images,
            snapshot,
        )
        .await;
        tracing::debug!(
            candidates = correlation.candidates.len(),
            images = correlation.images.len(),
            rules = ?correlation.rule_references,
            fallback = correlation.used_fallback,
            "correlated images"
        );

        let mut image_details = Vec::new();
        for img in &correlation.images {
            if let Some(path) = resolve_image(&self.images_dir, img) {
                let interpretation = self.analyzer.interpret(&path, &req.question).await;
                image_details.push(ImageDetail {
                    image: img.clone(),
                    interpretation,
                    highlighted_image: None,
                    analysis_info: None,
                });
            }
        }

        self.sessions.store(&req.username, &correlation.images);

        Ok(AskResponse {
            answer: outcome.answer,
            source: subset.sources(),
            images: correlation.images,
            image_details,
            analysis_type: AnalysisType::DocumentQuery,
        })
    }

    fn select_image(&self, req: &AskRequest) -> Option<String> {
        if let Some(name) = req.last_image.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        if is_image_analysis_request(&req.question) {
            return self.sessions.most_recent(&req.username);
        }
        None
    }
}

/// `docsight ask`: run the full pipeline once and print the JSON response.
pub async fn run_ask(
    config: &crate::config::Config,
    username: &str,
    role: &str,
    as_role: Option<&str>,
    question: &str,
    last_image: Option<String>,
) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }
    let state = crate::server::build_state(config).await?;
    let role = role.trim().to_uppercase();
    let req = AskRequest {
        username: username.to_string(),
        requested_role: as_role
            .map(|r| r.trim().to_uppercase())
            .unwrap_or_else(|| role.clone()),
        viewer_role: role,
        question: question.to_string(),
        last_image,
    };
    let response = state.assistant.ask(&state.corpus.get(), &req).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
