#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use docsight::config::{parse_config, Config};
use docsight_core::embedding::EmbeddingProvider;
use docsight_core::llm::{ChatModel, VisionModel};

/// An image XObject attached to a fixture page.
pub struct FixtureImage {
    pub width: u32,
    pub height: u32,
    /// `Some("DCTDecode")` for JPEG bytes, `None` for raw 8-bit RGB.
    pub filter: Option<&'static str>,
    pub data: Vec<u8>,
}

pub struct FixturePage {
    pub text: &'static str,
    pub image: Option<FixtureImage>,
}

/// Minimal valid PDF with one text line per page and optional image XObjects.
/// Writes the body first, then an xref with exact byte offsets so both
/// pdf-extract and lopdf can parse it.
pub fn fixture_pdf(pages: &[FixturePage]) -> Vec<u8> {
    // Object layout: 1 catalog, 2 pages, 3 font, then per page:
    // page, content, [image].
    let mut next_id = 4;
    let mut page_ids = Vec::new();
    let mut plan = Vec::new();
    for p in pages {
        let page_id = next_id;
        let content_id = next_id + 1;
        let image_id = p.image.as_ref().map(|_| next_id + 2);
        next_id += if image_id.is_some() { 3 } else { 2 };
        page_ids.push(page_id);
        plan.push((page_id, content_id, image_id));
    }

    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<(u32, usize)> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push((1, out.len()));
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    offsets.push((2, out.len()));
    let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            page_ids.len()
        )
        .as_bytes(),
    );

    offsets.push((3, out.len()));
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (p, (page_id, content_id, image_id)) in pages.iter().zip(plan.iter()) {
        let xobjects = match image_id {
            Some(id) => format!(" /XObject << /Im1 {} 0 R >>", id),
            None => String::new(),
        };
        offsets.push((*page_id, out.len()));
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >>{} >> >> endobj\n",
                page_id, content_id, xobjects
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", p.text);
        offsets.push((*content_id, out.len()));
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );

        if let (Some(id), Some(img)) = (image_id, p.image.as_ref()) {
            let filter = img
                .filter
                .map(|f| format!(" /Filter /{}", f))
                .unwrap_or_default();
            offsets.push((*id, out.len()));
            out.extend_from_slice(
                format!(
                    "{} 0 obj << /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8{} /Length {} >> stream\n",
                    id,
                    img.width,
                    img.height,
                    filter,
                    img.data.len()
                )
                .as_bytes(),
            );
            out.extend_from_slice(&img.data);
            out.extend_from_slice(b"\nendstream endobj\n");
        }
    }

    offsets.sort_by_key(|(id, _)| *id);
    let size = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for (_, off) in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", size).as_bytes());
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// 2x2 raw RGB pixels (red, green, blue, white).
pub fn raw_rgb_2x2() -> FixtureImage {
    FixtureImage {
        width: 2,
        height: 2,
        filter: None,
        data: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
    }
}

/// A small JPEG, embedded as-is with `/DCTDecode`.
pub fn jpeg_8x8() -> FixtureImage {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40]));
    let mut data = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut data), image::ImageFormat::Jpeg)
        .unwrap();
    FixtureImage {
        width: 8,
        height: 8,
        filter: Some("DCTDecode"),
        data,
    }
}

pub fn white_png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Config rooted in `root` with `documents/`, `extracted_images/`, and a
/// history database, using the Ollama embedding provider (no network at
/// construction time).
pub fn test_config(root: &Path) -> (Config, PathBuf) {
    let docs = root.join("documents");
    let images = root.join("extracted_images");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::create_dir_all(&images).unwrap();
    let text = format!(
        r#"
[db]
path = "{db}"

[documents]
dir = "{docs}"
images_dir = "{images}"

[retrieval]
top_k = 2

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 32
url = "http://127.0.0.1:9"
max_retries = 0

[llm]
provider = "disabled"

[server]
bind = "127.0.0.1:0"
"#,
        db = root.join("data/docsight.sqlite").display(),
        docs = docs.display(),
        images = images.display(),
    );
    let path = root.join("docsight.toml");
    std::fs::write(&path, &text).unwrap();
    (parse_config(&text).unwrap(), path)
}

/// Bag-of-words embedder: each lower-cased word adds 1.0 to a hashed bucket.
pub struct WordHashEmbedder;

fn bucket(word: &str) -> usize {
    word.bytes()
        .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
        % 32
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }
    fn dims(&self) -> usize {
        32
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 32];
                for w in t.split_whitespace() {
                    v[bucket(&w.to_lowercase())] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat model that returns a fixed answer and records every user prompt.
pub struct ScriptedChat {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Vision model that echoes a short description.
pub struct EchoVision {
    pub calls: Mutex<usize>,
}

impl EchoVision {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl VisionModel for EchoVision {
    fn model_name(&self) -> &str {
        "llava"
    }
    async fn chat_with_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        let heading = prompt.lines().next().unwrap_or_default();
        Ok(format!("vision saw {} bytes: {}", image.len(), heading))
    }
}
