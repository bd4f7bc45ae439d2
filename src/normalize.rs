//! Print-size normalization of merged documents.
//!
//! Pages larger than the print envelope are scaled down uniformly so they
//! fit without cropping. The original content streams are left untouched:
//! each oversized page gets two small wrapper streams that push a scaling
//! matrix before its content and restore the graphics state afterwards.
//! Pages that already fit are never modified, and no page is ever enlarged.

use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use serde::Serialize;
use std::path::Path;
use tokio::task;

use crate::error::{PrintMergeError, Result};
use crate::io::{WriteOptions, write_document};
use crate::merge::pages::{self, PageSize, Rect};
use crate::utils::format_pdf_number;

/// Slack allowed when comparing a page against the envelope, in points.
pub const ENVELOPE_TOLERANCE: f32 = 0.01;

/// Page boxes mapped alongside the MediaBox.
const SECONDARY_BOXES: [&[u8]; 4] = [b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

/// Largest page the output medium takes without cropping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageEnvelope {
    /// Width in points.
    pub width: f32,
    /// Height in points.
    pub height: f32,
}

impl PageEnvelope {
    /// ISO A4, 595 × 842 pt.
    pub const A4: Self = Self {
        width: 595.0,
        height: 842.0,
    };

    /// Scale factor that fits `page` into the envelope, or `None` if the
    /// page already fits.
    pub fn scale_for(&self, page: &Rect) -> Option<f32> {
        let (width, height) = (page.width(), page.height());
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        if width <= self.width + ENVELOPE_TOLERANCE && height <= self.height + ENVELOPE_TOLERANCE {
            return None;
        }
        Some((self.width / width).min(self.height / height))
    }
}

impl Default for PageEnvelope {
    fn default() -> Self {
        Self::A4
    }
}

/// Outcome of normalizing one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationReport {
    /// Size of every page after normalization, in page order.
    pub pages: Vec<PageSize>,

    /// Number of pages that were scaled down.
    pub scaled: usize,
}

/// Rescales oversized pages to fit a [`PageEnvelope`].
#[derive(Debug, Clone, Default)]
pub struct PrintNormalizer {
    envelope: PageEnvelope,
}

impl PrintNormalizer {
    /// Normalize the PDF at `path` in place.
    ///
    /// The file is only rewritten when at least one page was scaled, and the
    /// rewrite is atomic: on failure the original file is left intact.
    ///
    /// # Errors
    ///
    /// Returns `Optimization` if the document cannot be loaded, transformed
    /// or saved.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn normalize(&self, path: &Path) -> Result<NormalizationReport> {
        let normalizer = self.clone();
        let path = path.to_path_buf();

        let report = task::spawn_blocking(move || normalizer.normalize_file(&path))
            .await
            .map_err(|e| PrintMergeError::optimization(e.to_string()))??;

        tracing::debug!(pages = report.pages.len(), scaled = report.scaled, "Document normalized");
        Ok(report)
    }

    fn normalize_file(&self, path: &Path) -> Result<NormalizationReport> {
        let mut doc =
            Document::load(path).map_err(|e| PrintMergeError::optimization(e.to_string()))?;

        let report = self.normalize_document(&mut doc)?;

        if report.scaled > 0 {
            write_document(&mut doc, path, &WriteOptions::default())
                .map_err(|e| PrintMergeError::optimization(e.to_string()))?;
        }
        Ok(report)
    }

    /// Scale every oversized page of `doc`.
    ///
    /// # Errors
    ///
    /// Returns `Optimization` if a page cannot be rewritten.
    pub fn normalize_document(&self, doc: &mut Document) -> Result<NormalizationReport> {
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let mut sizes = Vec::with_capacity(page_ids.len());
        let mut scaled = 0;

        for page_id in page_ids {
            let media_box = pages::media_box(doc, page_id);

            let Some(scale) = self.envelope.scale_for(&media_box) else {
                sizes.push(media_box.into());
                continue;
            };

            // Map the MediaBox origin to (0, 0).
            let tx = -media_box.llx * scale;
            let ty = -media_box.lly * scale;
            let new_box = media_box.transform(scale, tx, ty);

            scale_page(doc, page_id, scale, tx, ty, new_box)
                .map_err(|e| PrintMergeError::optimization(format!("page {page_id:?}: {e}")))?;

            tracing::trace!(
                ?page_id,
                from_width = media_box.width(),
                from_height = media_box.height(),
                scale,
                "Page scaled"
            );
            sizes.push(new_box.into());
            scaled += 1;
        }

        Ok(NormalizationReport {
            pages: sizes,
            scaled,
        })
    }
}

fn scale_page(
    doc: &mut Document,
    page_id: ObjectId,
    scale: f32,
    tx: f32,
    ty: f32,
    new_media_box: Rect,
) -> lopdf::Result<()> {
    let page = doc.get_dictionary(page_id)?;

    let boxes: Vec<(&[u8], Rect)> = SECONDARY_BOXES
        .into_iter()
        .filter_map(|key| pages::read_rect(doc, page, key).map(|rect| (key, rect)))
        .collect();
    let contents = content_streams(doc, page.get(b"Contents").ok());
    let annotations = annotation_ids(doc, page.get(b"Annots").ok());

    let mut wrapped = contents;
    if !wrapped.is_empty() {
        let matrix = format_pdf_number(scale);
        let prefix = format!(
            "q {matrix} 0 0 {matrix} {} {} cm\n",
            format_pdf_number(tx),
            format_pdf_number(ty)
        );
        let prefix_id = doc.add_object(Stream::new(dictionary! {}, prefix.into_bytes()));
        let suffix_id = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
        wrapped.insert(0, Object::Reference(prefix_id));
        wrapped.push(Object::Reference(suffix_id));
    }

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("MediaBox", new_media_box.to_object());
    for (key, rect) in boxes {
        page.set(key, rect.transform(scale, tx, ty).to_object());
    }
    if !wrapped.is_empty() {
        page.set("Contents", Object::Array(wrapped));
    }

    for annotation_id in annotations {
        let rect = doc
            .get_dictionary(annotation_id)
            .ok()
            .and_then(|annotation| pages::read_rect(doc, annotation, b"Rect"));
        if let Some(rect) = rect {
            doc.get_object_mut(annotation_id)?
                .as_dict_mut()?
                .set("Rect", rect.transform(scale, tx, ty).to_object());
        }
    }

    Ok(())
}

/// References to the page's content streams, in drawing order.
fn content_streams(doc: &Document, contents: Option<&Object>) -> Vec<Object> {
    match contents {
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            Ok(_) => vec![Object::Reference(*id)],
            Err(_) => Vec::new(),
        },
        Some(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Indirect annotation dictionaries of a page.
fn annotation_ids(doc: &Document, annots: Option<&Object>) -> Vec<ObjectId> {
    let Some(annots) = annots else {
        return Vec::new();
    };
    match doc.dereference(annots) {
        Ok((_, Object::Array(items))) => items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect(),
        _ => Vec::new(),
    }
}
