//! HTTP API tests against a live router on an ephemeral port.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use common::{
    fixture_pdf, raw_rgb_2x2, test_config, white_png, EchoVision, FixturePage, ScriptedChat,
    WordHashEmbedder,
};
use docsight::analysis::ImageAnalyzer;
use docsight::ask::Assistant;
use docsight::corpus::{load_snapshot, SharedCorpus};
use docsight::history::SqliteHistory;
use docsight::server::{build_router, AppState, ROLE_HEADER, USER_HEADER};
use docsight::{db, migrate};
use docsight_core::session::ImageSessions;
use tempfile::TempDir;

const POLICY_IMAGE: &str = "B_policy.pdf_page0_0.png";

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_as(&self, user: &str, role: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(USER_HEADER, user)
            .header(ROLE_HEADER, role)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

async fn spawn_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let (config, _) = test_config(tmp.path());
    std::fs::write(
        config.documents.dir.join("B_policy.pdf"),
        fixture_pdf(&[FixturePage {
            text: "Crew annual leave policy and rotation",
            image: None,
        }]),
    )
    .unwrap();
    std::fs::write(
        config.documents.images_dir.join(POLICY_IMAGE),
        white_png(40, 30),
    )
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let history = SqliteHistory::new(pool);

    let snapshot = load_snapshot(&config, &WordHashEmbedder).await.unwrap();
    let assistant = Assistant {
        embedder: Arc::new(WordHashEmbedder),
        chat: Arc::new(ScriptedChat::new("Leave is 30 days.")),
        analyzer: ImageAnalyzer::new(Arc::new(EchoVision::new())),
        history: Arc::new(history.clone()),
        sessions: Arc::new(ImageSessions::default()),
        images_dir: config.documents.images_dir.clone(),
        retrieval: config.retrieval.clone(),
    };
    let state = AppState {
        config: Arc::new(config),
        corpus: Arc::new(SharedCorpus::new(snapshot)),
        assistant,
        history,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn health_reports_corpus_size() {
    let srv = spawn_server().await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["documents"], 1);
    assert!(body["chunks"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn ask_without_identity_is_rejected() {
    let srv = spawn_server().await;
    let resp = srv
        .client
        .post(srv.url("/ask"))
        .json(&json!({"question": "leave?", "role": "B"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains(USER_HEADER));
}

#[tokio::test]
async fn ask_answers_and_records_history() {
    let srv = spawn_server().await;
    let resp = srv
        .post_as(
            "bo",
            "b",
            "/ask",
            json!({"question": "how much annual leave", "role": "b"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "Leave is 30 days.");
    assert_eq!(body["source"], json!(["B_policy.pdf"]));
    assert_eq!(body["analysis_type"], "document_query");

    let resp = srv
        .client
        .get(srv.url("/history"))
        .header(USER_HEADER, "bo")
        .header(ROLE_HEADER, "B")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let entries = body["history"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["question"], "how much annual leave");
    assert_eq!(entries[0]["answer"], "Leave is 30 days.");

    // Another user sees nothing.
    let resp = srv
        .client
        .get(srv.url("/history"))
        .header(USER_HEADER, "cy")
        .header(ROLE_HEADER, "B")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ask_rejects_empty_question() {
    let srv = spawn_server().await;
    let resp = srv
        .post_as("bo", "B", "/ask", json!({"question": "   ", "role": "B"}))
        .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn image_endpoints_resolve_and_analyze() {
    let srv = spawn_server().await;

    let resp = srv
        .post_as(
            "bo",
            "B",
            "/analyze-diagram",
            json!({"image_name": "nope.png", "question": "what is this"}),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = srv
        .post_as(
            "bo",
            "B",
            "/analyze-diagram",
            json!({"image_name": POLICY_IMAGE, "question": "what is this"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["original_image"], POLICY_IMAGE);
    assert!(body["highlighted_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert_eq!(body["analysis_info"]["image_size"], "40x30");

    let resp = srv
        .post_as(
            "bo",
            "B",
            "/analyze-component",
            json!({"image_name": POLICY_IMAGE, "component_name": "relief valve"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["component"], "relief valve");
    assert_eq!(body["image"], POLICY_IMAGE);
    assert!(body["analysis"].as_str().unwrap().starts_with("vision saw"));

    let resp = srv
        .post_as(
            "bo",
            "B",
            "/interpret-image-detailed",
            json!({"image_name": POLICY_IMAGE, "question": "explain"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["question"], "explain");
    assert!(body["interpretation"]
        .as_str()
        .unwrap()
        .starts_with("vision saw"));
}

#[tokio::test]
async fn path_traversal_image_names_are_not_found() {
    let srv = spawn_server().await;
    let resp = srv
        .post_as(
            "bo",
            "B",
            "/interpret-image-detailed",
            json!({"image_name": "../documents/B_policy.pdf", "question": "x"}),
        )
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn extracted_images_are_served_statically() {
    let srv = spawn_server().await;
    let resp = srv
        .client
        .get(srv.url(&format!("/extracted_images/{}", POLICY_IMAGE)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(&bytes[..4], b"\x89PNG");
}

#[tokio::test]
async fn upload_requires_matching_role_and_reindexes() {
    let srv = spawn_server().await;
    let pdf = fixture_pdf(&[FixturePage {
        text: "RULE 25 Fire pump arrangement on the aft deck",
        image: Some(raw_rgb_2x2()),
    }]);

    let resp = srv
        .client
        .put(srv.url("/documents/A/manual.pdf"))
        .header(USER_HEADER, "bo")
        .header(ROLE_HEADER, "B")
        .body(pdf.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Not authorized to upload for this role");

    let resp = srv
        .client
        .put(srv.url("/documents/A/notes.txt"))
        .header(USER_HEADER, "ana")
        .header(ROLE_HEADER, "A")
        .body(pdf.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = srv
        .client
        .put(srv.url("/documents/A/manual.pdf"))
        .header(USER_HEADER, "ana")
        .header(ROLE_HEADER, "A")
        .body(pdf)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "File uploaded and indexed successfully");
    assert_eq!(body["documents"], 2);
    assert_eq!(body["images"], 1);

    let health: Value = srv
        .client
        .get(srv.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["documents"], 2);

    let resp = srv
        .client
        .get(srv.url("/extracted_images/A_manual.pdf_page0_0.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn reload_is_admin_only() {
    let srv = spawn_server().await;
    let resp = srv.post_as("bo", "B", "/documents/reload", json!({})).await;
    assert_eq!(resp.status(), 403);

    let resp = srv.post_as("root", "admin", "/documents/reload", json!({})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Documents reloaded");
    assert_eq!(body["documents"], 1);
}

#[tokio::test]
async fn upload_of_unreadable_pdf_is_stored_but_not_indexed() {
    let srv = spawn_server().await;
    let resp = srv
        .client
        .put(srv.url("/documents/A/scan.pdf"))
        .header(USER_HEADER, "ana")
        .header(ROLE_HEADER, "A")
        .body(b"%PDF-1.4 truncated".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "File stored but could not be indexed");
    assert_eq!(body["documents"], 1);
}
