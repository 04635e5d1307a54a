//! Image follow-up intent classifier.
//!
//! A small rule-based classifier that decides whether a question refers to
//! a previously shown diagram ("analyze the above diagram", "what is
//! highlighted", "where is ..."). Patterns are tested in table order against
//! the lower-cased question; the first match wins.
//!
//! False positives and negatives are expected. The ask pipeline only acts on
//! a match when the user also has a stored session image.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// What a matching pattern indicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCue {
    /// "analyze the above diagram"
    Analyze,
    /// "this diagram", "that part"
    Deictic,
    /// "what is shown"
    WhatIsShown,
    /// "explain / interpret / describe / tell me about the image"
    Explain,
    /// "highlight the diagram", "highlighted part"
    Highlight,
    /// "show me", "where is", "identify the"
    Locate,
    /// "image analysis"
    ImageAnalysis,
}

/// Ordered pattern table.
pub const IMAGE_REQUEST_PATTERNS: &[(&str, ImageCue)] = &[
    (
        r"analyze\s+the\s+(above|this|that|current|image|diagram|blueprint|schematic|highlighted)",
        ImageCue::Analyze,
    ),
    (
        r"(above|this|that|highlighted)\s+(image|part|diagram|section)",
        ImageCue::Deictic,
    ),
    (
        r"what\s+is\s+(shown|displayed|this|that|highlighted)",
        ImageCue::WhatIsShown,
    ),
    (
        r"explain\s+(the\s+)?(above|this|that|image|diagram|highlighted)",
        ImageCue::Explain,
    ),
    (
        r"interpret\s+(the\s+)?(above|this|that|image|diagram|highlighted)",
        ImageCue::Explain,
    ),
    (
        r"describe\s+(the\s+)?(above|this|that|image|diagram|highlighted)",
        ImageCue::Explain,
    ),
    (
        r"tell\s+me\s+about\s+(the\s+)?(above|this|that|image|diagram|highlighted)",
        ImageCue::Explain,
    ),
    (
        r"highlight(ed)?\s+(the\s+)?(above|this|that|image|diagram)",
        ImageCue::Highlight,
    ),
    (r"show\s+me", ImageCue::Locate),
    (r"where\s+is", ImageCue::Locate),
    (r"identify\s+(the|this|that|highlighted)", ImageCue::Locate),
    (r"image\s+analysis", ImageCue::ImageAnalysis),
    (r"what.*highlighted", ImageCue::Highlight),
    (
        r"highlighted\s+(part|section|area|component)",
        ImageCue::Highlight,
    ),
];

static COMPILED: LazyLock<Vec<(Regex, ImageCue)>> = LazyLock::new(|| {
    IMAGE_REQUEST_PATTERNS
        .iter()
        .filter_map(|(p, cue)| Regex::new(p).ok().map(|re| (re, *cue)))
        .collect()
});

/// The first cue whose pattern matches the lower-cased question.
pub fn classify(question: &str) -> Option<ImageCue> {
    let lowered = question.to_lowercase();
    COMPILED
        .iter()
        .find(|(re, _)| re.is_match(&lowered))
        .map(|(_, cue)| *cue)
}

/// Whether the question looks like a follow-up about a shown image.
pub fn is_image_analysis_request(question: &str) -> bool {
    classify(question).is_some()
}
