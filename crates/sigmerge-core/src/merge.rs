//! Merge orchestration: load, analyze, flatten if needed, place, save
//!
//! One signature failing never fails the whole operation: the result
//! always carries applied-vs-requested counts and the reasons for any
//! skips, so the caller can tell the user exactly which signatures did
//! not make it onto the final document.

use crate::error::SigMergeError;
use crate::flatten::flatten_document;
use crate::placement::{compute_final_placement, SignaturePlacement};
use crate::placer::{decode_signature_image, place_signature};
use crate::scan;
use lopdf::Document;
use pagegeom::{extract_from_document, top_left_rect_to_pdf};
use serde::Serialize;
use tracing::{info, warn};

/// A signature that was requested but not drawn, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSignature {
    pub id: Option<String>,
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeStats {
    pub signatures_requested: usize,
    pub signatures_applied: usize,
    pub skipped: Vec<SkippedSignature>,
    pub was_flattened: bool,
    /// Pages degraded to blanks during flattening.
    pub blank_pages: Vec<u32>,
    pub input_bytes: usize,
    pub output_bytes: usize,
}

pub struct MergeOutcome {
    pub bytes: Vec<u8>,
    pub stats: MergeStats,
}

/// Apply signature placements to a document and serialize the result.
///
/// Signature rects are display points with a top-left origin, matching
/// what the caller measured on screen at scale 1.0. Unknown page
/// numbers are fatal and detected before any drawing; undecodable
/// images and out-of-bounds placements skip that one signature.
pub fn merge_signatures(
    pdf_bytes: &[u8],
    signatures: &[SignaturePlacement],
) -> Result<MergeOutcome, SigMergeError> {
    // Loaded
    let doc =
        Document::load_mem(pdf_bytes).map_err(|e| SigMergeError::ParseError(e.to_string()))?;
    let geometry = extract_from_document(&doc)?;

    for sig in signatures {
        if geometry.page(sig.page).is_none() {
            return Err(SigMergeError::ParseError(format!(
                "signature {} targets page {} but document has {} pages",
                sig.id.as_deref().unwrap_or("<unnamed>"),
                sig.page,
                geometry.total_pages
            )));
        }
    }

    // Analyzed
    let anomalous = scan::needs_flattening(&doc, &geometry);

    // Flattened | Direct. Flattening costs a full document rewrite, so
    // it is skipped whenever the plain coordinate math is already
    // correct (no rotation, no scan anomaly).
    let (mut doc, geometry, was_flattened, blank_pages) = if anomalous {
        let outcome = flatten_document(&doc, true)?;
        let geometry = extract_from_document(&outcome.document)?;
        (
            outcome.document,
            geometry,
            outcome.was_flattened,
            outcome.blank_pages,
        )
    } else {
        (doc, geometry, false, Vec::new())
    };

    // SignaturesApplied
    let page_ids = doc.get_pages();
    let mut applied = 0usize;
    let mut skipped = Vec::new();

    for (index, sig) in signatures.iter().enumerate() {
        match apply_one(&mut doc, &page_ids, &geometry, sig, index) {
            Ok(()) => applied += 1,
            Err(err) => {
                warn!(
                    page = sig.page,
                    id = sig.id.as_deref(),
                    "signature skipped: {}",
                    err
                );
                skipped.push(SkippedSignature {
                    id: sig.id.clone(),
                    page: sig.page,
                    reason: err.to_string(),
                });
            }
        }
    }

    // Serialized
    doc.compress();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| SigMergeError::SerializationError(e.to_string()))?;

    let stats = MergeStats {
        signatures_requested: signatures.len(),
        signatures_applied: applied,
        skipped,
        was_flattened,
        blank_pages,
        input_bytes: pdf_bytes.len(),
        output_bytes: bytes.len(),
    };
    info!(
        requested = stats.signatures_requested,
        applied = stats.signatures_applied,
        flattened = stats.was_flattened,
        input_bytes = stats.input_bytes,
        output_bytes = stats.output_bytes,
        "merge complete"
    );

    Ok(MergeOutcome { bytes, stats })
}

fn apply_one(
    doc: &mut Document,
    page_ids: &std::collections::BTreeMap<u32, lopdf::ObjectId>,
    geometry: &pagegeom::DocumentGeometry,
    sig: &SignaturePlacement,
    index: usize,
) -> Result<(), SigMergeError> {
    let page_geometry = geometry
        .page(sig.page)
        .ok_or_else(|| SigMergeError::ParseError(format!("page {} not found", sig.page)))?;
    let page_id = *page_ids
        .get(&sig.page)
        .ok_or_else(|| SigMergeError::ParseError(format!("page {} not found", sig.page)))?;

    let img = decode_signature_image(&sig.image_data)?;

    // The caller's box is top-left-origin display points; the placer
    // wants PDF content space. Pages are unrotated by this point, so
    // display space and content space share dimensions.
    let target = top_left_rect_to_pdf(sig.rect, page_geometry)?;
    let final_box = compute_final_placement(
        sig.source,
        img.width as f64,
        img.height as f64,
        target,
        page_geometry.display_width,
        page_geometry.display_height,
    )?;

    place_signature(doc, page_id, final_box, &img, index)
}
