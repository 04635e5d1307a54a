//! PDF page text and embedded image extraction.
//!
//! Text comes from `pdf-extract` (one string per page). Images come from
//! `lopdf`: every image XObject referenced by a page is exported in a
//! natively viewable format.
//!
//! | Stream filter | Output |
//! |---|---|
//! | `DCTDecode` | stream bytes as-is, `.jpeg` |
//! | `JPXDecode` | stream bytes as-is, `.jpx` |
//! | none / `FlateDecode`, 8-bit `DeviceRGB` or `DeviceGray` | re-encoded `.png` |
//!
//! Anything else is skipped. Sequence numbers count every image on the page,
//! skipped ones included, so they are stable across runs.

use std::path::Path;

use docsight_core::models::ExtractedImage;

/// Extraction error. Callers log it and skip the document.
#[derive(Debug)]
pub enum ExtractError {
    Io(std::io::Error),
    Pdf(String),
    Image(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "I/O error: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Image(e) => write!(f, "image export failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

/// Text of every page, in page order (index 0 = first page).
pub fn page_texts(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("text extractor panicked".to_string())),
    }
}

/// One exported page image, not yet written to disk.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_number: u32,
    pub sequence_index: usize,
    pub ext: &'static str,
    pub bytes: Vec<u8>,
}

/// Export every supported image XObject from every page.
pub fn extract_images(bytes: &[u8]) -> Result<Vec<PageImage>, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let mut out = Vec::new();

    for (page_no, page_id) in doc.get_pages() {
        let page_number = page_no.saturating_sub(1);
        let images = match doc.get_page_images(page_id) {
            Ok(images) => images,
            Err(e) => {
                tracing::debug!(page = page_number, error = %e, "no readable images on page");
                continue;
            }
        };

        for (sequence_index, img) in images.iter().enumerate() {
            match export_image(&doc, img) {
                Ok(Some((ext, data))) => out.push(PageImage {
                    page_number,
                    sequence_index,
                    ext,
                    bytes: data,
                }),
                Ok(None) => {
                    tracing::debug!(
                        page = page_number,
                        seq = sequence_index,
                        filters = ?img.filters,
                        color_space = ?img.color_space,
                        "skipping unsupported image encoding"
                    );
                }
                Err(e) => {
                    tracing::debug!(page = page_number, seq = sequence_index, error = %e, "image export failed");
                }
            }
        }
    }

    Ok(out)
}

fn export_image(
    doc: &lopdf::Document,
    img: &lopdf::xobject::PdfImage,
) -> Result<Option<(&'static str, Vec<u8>)>, ExtractError> {
    let filters: Vec<&str> = img
        .filters
        .as_ref()
        .map(|f| f.iter().map(|s| s.as_str()).collect())
        .unwrap_or_default();

    if filters.contains(&"DCTDecode") {
        return Ok(Some(("jpeg", img.content.to_vec())));
    }
    if filters.contains(&"JPXDecode") {
        return Ok(Some(("jpx", img.content.to_vec())));
    }

    let raw = match filters.as_slice() {
        [] => img.content.to_vec(),
        ["FlateDecode"] => doc
            .get_object(img.id)
            .and_then(|o| o.as_stream())
            .and_then(|s| s.decompressed_content())
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        _ => return Ok(None),
    };

    if img.bits_per_component.unwrap_or(8) != 8 || img.width <= 0 || img.height <= 0 {
        return Ok(None);
    }
    let (w, h) = (img.width as u32, img.height as u32);

    let dynamic = match img.color_space.as_deref() {
        Some("DeviceRGB") => image::RgbImage::from_raw(w, h, raw).map(image::DynamicImage::ImageRgb8),
        Some("DeviceGray") => {
            image::GrayImage::from_raw(w, h, raw).map(image::DynamicImage::ImageLuma8)
        }
        _ => return Ok(None),
    };
    let dynamic = dynamic.ok_or_else(|| {
        ExtractError::Image(format!("pixel data does not match {}x{}", w, h))
    })?;

    let mut png = Vec::new();
    dynamic
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ExtractError::Image(e.to_string()))?;
    Ok(Some(("png", png)))
}

/// Write exported images for `source_document` into `dir`.
///
/// Files are named `{source}_page{page}_{seq}.{ext}`; existing files with the
/// same name are overwritten.
pub fn write_images(
    source_document: &str,
    images: &[PageImage],
    dir: &Path,
) -> Result<Vec<ExtractedImage>, ExtractError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(images.len());
    for img in images {
        let record =
            ExtractedImage::new(source_document, img.page_number, img.sequence_index, img.ext);
        std::fs::write(dir.join(&record.filename), &img.bytes)?;
        written.push(record);
    }
    Ok(written)
}
