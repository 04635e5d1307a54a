//! Image analysis with a vision model.
//!
//! Three operations over one extracted image:
//! - [`ImageAnalyzer::interpret`]: structured description in the context of
//!   a question.
//! - [`ImageAnalyzer::highlight`]: the same kind of description plus an
//!   annotated PNG copy (red frame and a fixed label) and metadata.
//! - [`ImageAnalyzer::analyze_component`]: a deep dive on one named part.
//!
//! Model failures never propagate: `interpret` and `analyze_component`
//! return explanatory text, `highlight` returns [`HighlightResult::Error`].

use anyhow::{Context, Result};
use base64::Engine;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use docsight_core::llm::VisionModel;

/// Overlay text drawn on highlighted images.
pub const ANNOTATION_LABEL: &str = "[AI Analyzed Diagram]";

const BORDER_WIDTH: u32 = 5;
const BORDER_COLOR: [u8; 4] = [255, 0, 0, 180];
const LABEL_ORIGIN: (u32, u32) = (10, 10);
const LABEL_COLOR: [u8; 3] = [255, 0, 0];

pub fn interpret_prompt(question: &str) -> String {
    format!(
        "Please analyze this diagram/technical image in detail.

User's Question: {}

Format your response with clear structure:

## Overview
What does this diagram show?

## Key Components
- List each important component or element visible in the image
- Describe their function or purpose

## Relevant Details
- Important specifications or labels visible
- Technical specifications if shown
- Any measurements or values

## Connection to Your Question
How does this diagram relate to the user's question?

## Recommendations
Any important notes or recommendations based on the diagram.

Use bullet points and short paragraphs. NO ASCII ART.",
        question
    )
}

pub fn highlight_prompt(question: &str) -> String {
    format!(
        "Analyze this technical diagram carefully.

User's Question: {}

Provide analysis in this format:

## Components Identified
List the specific components or elements that answer the user's question.

## Locations
For each component, describe where it is located in the diagram (e.g., top-left, center, bottom-right).

## Function and Purpose
Explain what each component does and its purpose in the system.

## Connections
Describe any connections or relationships between components.

## Key Takeaways
Summarize the most important information from the diagram relevant to the question.

Use bullet points and clear headings. NO ASCII ART OR BOXES.",
        question
    )
}

pub fn component_prompt(component: &str) -> String {
    format!(
        "Examine this diagram carefully and focus on the '{c}'.

Provide detailed analysis with these sections:

## Location
Describe exactly where the {c} is located in the diagram.

## Specifications
List all specifications or technical specs visible for this component.

## Connections
What other components does it connect to? How are they connected?

## Function
Explain what the {c} does and its role in the system.

## Safety Notes
Any safety considerations, warnings, or hazards associated with this component?

## Maintenance
Maintenance requirements, inspection points, or operational notes.

## Identification
Any part numbers, labels, or codes visible on or near this component?

Use clear formatting with bullet points. NO ASCII ART.",
        c = component
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisInfo {
    pub model_used: String,
    /// `"{width}x{height}"` of the source image.
    pub image_size: String,
    pub annotation_applied: bool,
}

/// Outcome of [`ImageAnalyzer::highlight`], tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HighlightResult {
    Success {
        interpretation: String,
        /// File name of the analyzed image.
        original_image: String,
        /// `data:image/png;base64,...`
        highlighted_image: String,
        analysis_info: AnalysisInfo,
    },
    Error {
        message: String,
    },
}

/// Vision-model front end for extracted images.
#[derive(Clone)]
pub struct ImageAnalyzer {
    vision: Arc<dyn VisionModel>,
}

impl ImageAnalyzer {
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    async fn ask(&self, path: &Path, prompt: &str) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        self.vision.chat_with_image(prompt, &bytes).await
    }

    pub async fn interpret(&self, path: &Path, question: &str) -> String {
        match self.ask(path, &interpret_prompt(question)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(image = %path.display(), error = %e, "image interpretation failed");
                format!("Could not interpret image. Error: {}", e)
            }
        }
    }

    pub async fn highlight(&self, path: &Path, question: &str) -> HighlightResult {
        match self.try_highlight(path, question).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(image = %path.display(), error = %e, "diagram highlight failed");
                HighlightResult::Error {
                    message: format!("Could not highlight diagram. Error: {}", e),
                }
            }
        }
    }

    async fn try_highlight(&self, path: &Path, question: &str) -> Result<HighlightResult> {
        let interpretation = self.ask(path, &highlight_prompt(question)).await?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let annotated = tokio::task::spawn_blocking(move || annotate(&bytes)).await??;

        Ok(HighlightResult::Success {
            interpretation,
            original_image: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            highlighted_image: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&annotated.png)
            ),
            analysis_info: AnalysisInfo {
                model_used: self.vision.model_name().to_string(),
                image_size: format!("{}x{}", annotated.width, annotated.height),
                annotation_applied: true,
            },
        })
    }

    pub async fn analyze_component(&self, path: &Path, component: &str) -> String {
        match self.ask(path, &component_prompt(component)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(image = %path.display(), error = %e, "component analysis failed");
                format!("Could not analyze component. Error: {}", e)
            }
        }
    }
}

/// An annotated PNG and the source dimensions.
pub struct Annotated {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Draw the analysis frame and label onto a copy of an encoded image.
///
/// The frame is a 5px red border (alpha 180) whose outer edge is inset 5px
/// from the image edge. The label is drawn in opaque red at (10, 10).
pub fn annotate(bytes: &[u8]) -> Result<Annotated> {
    let mut img = image::load_from_memory(bytes)
        .context("Failed to decode image")?
        .to_rgba8();
    let (width, height) = img.dimensions();

    draw_frame(&mut img);
    draw_label(&mut img, ANNOTATION_LABEL, LABEL_ORIGIN);

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .context("Failed to encode annotated image")?;

    Ok(Annotated { png, width, height })
}

fn blend(px: &mut image::Rgba<u8>, color: [u8; 4]) {
    let a = color[3] as u32;
    for c in 0..3 {
        px.0[c] = ((px.0[c] as u32 * (255 - a) + color[c] as u32 * a) / 255) as u8;
    }
}

fn draw_frame(img: &mut image::RgbaImage) {
    let (w, h) = img.dimensions();
    let inset = BORDER_WIDTH;
    if w <= inset * 2 || h <= inset * 2 {
        return;
    }
    let (x0, y0, x1, y1) = (inset, inset, w - inset, h - inset);
    for y in y0..=y1.min(h - 1) {
        for x in x0..=x1.min(w - 1) {
            let inner = x >= x0 + BORDER_WIDTH
                && x + BORDER_WIDTH <= x1
                && y >= y0 + BORDER_WIDTH
                && y + BORDER_WIDTH <= y1;
            if !inner {
                blend(img.get_pixel_mut(x, y), BORDER_COLOR);
            }
        }
    }
}

/// 5x7 glyphs for the label characters; unknown characters render blank.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '[' => [0b01110, 0b01000, 0b01000, 0b01000, 0b01000, 0b01000, 0b01110],
        ']' => [0b01110, 0b00010, 0b00010, 0b00010, 0b00010, 0b00010, 0b01110],
        _ => [0; 7],
    }
}

fn draw_label(img: &mut image::RgbaImage, text: &str, origin: (u32, u32)) {
    let (w, h) = img.dimensions();
    for (i, c) in text.to_uppercase().chars().enumerate() {
        let rows = glyph(c);
        let gx = origin.0 + i as u32 * 6;
        for (dy, bits) in rows.iter().enumerate() {
            for dx in 0..5u32 {
                if bits & (0b10000 >> dx) == 0 {
                    continue;
                }
                let (x, y) = (gx + dx, origin.1 + dy as u32);
                if x < w && y < h {
                    let px = img.get_pixel_mut(x, y);
                    px.0[..3].copy_from_slice(&LABEL_COLOR);
                    px.0[3] = 255;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn white_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    struct FakeVision {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeVision {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
        fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionModel for FakeVision {
        fn model_name(&self) -> &str {
            "llava"
        }
        async fn chat_with_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
            assert!(!image.is_empty());
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("vision service down"))
        }
    }

    #[test]
    fn test_annotate_border_and_label() {
        let out = annotate(&white_png(40, 30)).unwrap();
        assert_eq!((out.width, out.height), (40, 30));
        let img = image::load_from_memory(&out.png).unwrap().to_rgba8();

        // Outside the frame.
        assert_eq!(img.get_pixel(2, 2).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(20, 27).0, [255, 255, 255, 255]);
        // On the frame: white blended with red at alpha 180.
        assert_eq!(img.get_pixel(6, 20).0, [255, 75, 75, 255]);
        assert_eq!(img.get_pixel(20, 25).0, [255, 75, 75, 255]);
        // Inside the frame, clear of the label.
        assert_eq!(img.get_pixel(20, 20).0, [255, 255, 255, 255]);
        // Top bar of the opening bracket.
        assert_eq!(img.get_pixel(11, 10).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_annotate_tiny_image_no_panic() {
        let out = annotate(&white_png(4, 3)).unwrap();
        assert_eq!((out.width, out.height), (4, 3));
    }

    #[test]
    fn test_annotate_rejects_garbage() {
        assert!(annotate(b"definitely not an image").is_err());
    }

    #[test]
    fn test_component_prompt_scoped() {
        let p = component_prompt("relief valve");
        assert!(p.contains("focus on the 'relief valve'"));
        assert!(p.contains("where the relief valve is located"));
        assert!(p.contains("## Safety Notes"));
    }

    #[tokio::test]
    async fn test_highlight_success_shape() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("A.pdf_page0_0.png");
        std::fs::write(&path, white_png(40, 30)).unwrap();
        let vision = Arc::new(FakeVision::ok("## Components Identified\n- pump"));
        let analyzer = ImageAnalyzer::new(vision.clone());

        let res = analyzer.highlight(&path, "where is the pump").await;
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["interpretation"], "## Components Identified\n- pump");
        assert_eq!(json["original_image"], "A.pdf_page0_0.png");
        assert_eq!(json["analysis_info"]["image_size"], "40x30");
        assert_eq!(json["analysis_info"]["model_used"], "llava");
        assert_eq!(json["analysis_info"]["annotation_applied"], true);
        assert!(json["highlighted_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(vision.prompts.lock().unwrap()[0].contains("User's Question: where is the pump"));
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("x.png");
        std::fs::write(&path, white_png(20, 20)).unwrap();
        let analyzer = ImageAnalyzer::new(Arc::new(FakeVision::failing()));

        let text = analyzer.interpret(&path, "q").await;
        assert!(text.starts_with("Could not interpret image. Error: vision service down"));
        let text = analyzer.analyze_component(&path, "valve").await;
        assert!(text.starts_with("Could not analyze component. Error:"));

        let res = analyzer.highlight(&path, "q").await;
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Could not highlight diagram. Error:"));
    }
}
