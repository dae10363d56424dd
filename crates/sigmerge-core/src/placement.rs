//! Signature placement geometry
//!
//! Computes where a signature raster actually lands inside the box the
//! user drew. Fitting is aspect-preserving with letterboxing; stretching
//! to fill produced visibly distorted signatures for capture pads whose
//! aspect ratio differs from the drawn box. Tablet (Wacom) strokes get a
//! dedicated strategy because their extreme aspect ratios fit into
//! illegibly thin slivers under the standard rule.

use crate::error::SigMergeError;
use pagegeom::Rect;
use serde::{Deserialize, Serialize};

/// Where the signature raster came from; selects the fit strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureSource {
    Canvas,
    Wacom,
    #[serde(other)]
    Other,
}

/// One signature request. `rect` is in display points with a top-left
/// origin (what the caller measured on screen at scale 1.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignaturePlacement {
    #[serde(default)]
    pub id: Option<String>,
    pub page: u32,
    pub rect: Rect,
    pub image_data: Vec<u8>,
    pub source: SignatureSource,
}

/// Absolute floor on the rendered size; smaller boxes produce
/// effectively invisible signatures.
pub const MIN_RENDERED_WIDTH: f64 = 20.0;
pub const MIN_RENDERED_HEIGHT: f64 = 10.0;

/// Minimum height a tablet stroke is expanded toward.
const WACOM_MIN_STROKE_HEIGHT: f64 = 30.0;

/// Common contract for placement strategies: given the image's intrinsic
/// pixel size, the (already clamped) target box, and the page size, all
/// in PDF space, produce the final drawn box.
pub trait FitStrategy {
    fn name(&self) -> &'static str;

    fn compute_placement(
        &self,
        image_width: f64,
        image_height: f64,
        target: Rect,
        page_width: f64,
        page_height: f64,
    ) -> Result<Rect, SigMergeError>;
}

/// Aspect-preserving fit, centered within the target box.
pub struct StandardFit;

/// Standard fit plus short-axis expansion for thin tablet strokes.
pub struct WacomFit;

pub fn fit_for_source(source: SignatureSource) -> &'static dyn FitStrategy {
    match source {
        SignatureSource::Wacom => &WacomFit,
        SignatureSource::Canvas | SignatureSource::Other => &StandardFit,
    }
}

fn aspect_fit(image_width: f64, image_height: f64, target: Rect) -> Result<Rect, SigMergeError> {
    if image_width <= 0.0 || image_height <= 0.0 {
        return Err(SigMergeError::ImageDecodeError(format!(
            "image has degenerate dimensions {}x{}",
            image_width, image_height
        )));
    }
    if target.width <= 0.0 || target.height <= 0.0 {
        return Err(SigMergeError::OutOfBounds(format!(
            "target box has no area ({}x{})",
            target.width, target.height
        )));
    }

    let scale = (target.width / image_width).min(target.height / image_height);
    let width = image_width * scale;
    let height = image_height * scale;

    Ok(Rect {
        x: target.x + (target.width - width) / 2.0,
        y: target.y + (target.height - height) / 2.0,
        width,
        height,
    })
}

impl FitStrategy for StandardFit {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn compute_placement(
        &self,
        image_width: f64,
        image_height: f64,
        target: Rect,
        _page_width: f64,
        _page_height: f64,
    ) -> Result<Rect, SigMergeError> {
        aspect_fit(image_width, image_height, target)
    }
}

impl FitStrategy for WacomFit {
    fn name(&self) -> &'static str {
        "wacom"
    }

    fn compute_placement(
        &self,
        image_width: f64,
        image_height: f64,
        target: Rect,
        page_width: f64,
        page_height: f64,
    ) -> Result<Rect, SigMergeError> {
        let fitted = aspect_fit(image_width, image_height, target)?;

        // Expand the short axis toward a legible stroke thickness,
        // keeping the box centered where the fit put it.
        let mut result = fitted;
        if fitted.width >= fitted.height {
            let desired = fitted.height.max(WACOM_MIN_STROKE_HEIGHT.min(page_height));
            result.y -= (desired - fitted.height) / 2.0;
            result.height = desired;
        } else {
            let desired = fitted.width.max(WACOM_MIN_STROKE_HEIGHT.min(page_width));
            result.x -= (desired - fitted.width) / 2.0;
            result.width = desired;
        }

        Ok(shift_into_page(result, page_width, page_height))
    }
}

/// Clamp a PDF-space target box to the page, per the data-model rule
/// that out-of-range request boxes are clamped rather than rejected.
/// Returns None when nothing of the box overlaps the page.
pub fn clamp_to_page(rect: Rect, page_width: f64, page_height: f64) -> Option<Rect> {
    let x0 = rect.x.max(0.0);
    let y0 = rect.y.max(0.0);
    let x1 = (rect.x + rect.width).min(page_width);
    let y1 = (rect.y + rect.height).min(page_height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Translate a box so it lies within the page where possible; the box
/// keeps its size.
fn shift_into_page(mut rect: Rect, page_width: f64, page_height: f64) -> Rect {
    if rect.x + rect.width > page_width {
        rect.x = page_width - rect.width;
    }
    if rect.y + rect.height > page_height {
        rect.y = page_height - rect.height;
    }
    rect.x = rect.x.max(0.0);
    rect.y = rect.y.max(0.0);
    rect
}

/// Enforce the absolute minimum rendered size, keeping the box centered.
pub fn enforce_minimum_size(mut rect: Rect) -> Rect {
    if rect.width < MIN_RENDERED_WIDTH {
        rect.x -= (MIN_RENDERED_WIDTH - rect.width) / 2.0;
        rect.width = MIN_RENDERED_WIDTH;
    }
    if rect.height < MIN_RENDERED_HEIGHT {
        rect.y -= (MIN_RENDERED_HEIGHT - rect.height) / 2.0;
        rect.height = MIN_RENDERED_HEIGHT;
    }
    rect
}

/// Final gate before drawing: the placement must lie entirely on the
/// page. Out-of-bounds placements are rejected, not clamped and drawn,
/// to avoid silently corrupting content.
pub fn validate_bounds(rect: Rect, page_width: f64, page_height: f64) -> Result<(), SigMergeError> {
    // Half a point of slack absorbs float accumulation from the fit math.
    const EPSILON: f64 = 0.5;
    if rect.x < -EPSILON
        || rect.y < -EPSILON
        || rect.x + rect.width > page_width + EPSILON
        || rect.y + rect.height > page_height + EPSILON
    {
        return Err(SigMergeError::OutOfBounds(format!(
            "box ({:.1}, {:.1}) {}x{} exceeds page {}x{}",
            rect.x, rect.y, rect.width, rect.height, page_width, page_height
        )));
    }
    Ok(())
}

/// Full placement pipeline for one signature: clamp, fit per source,
/// enforce minimums, validate.
pub fn compute_final_placement(
    source: SignatureSource,
    image_width: f64,
    image_height: f64,
    target: Rect,
    page_width: f64,
    page_height: f64,
) -> Result<Rect, SigMergeError> {
    let clamped = clamp_to_page(target, page_width, page_height).ok_or_else(|| {
        SigMergeError::OutOfBounds(format!(
            "target box ({:.1}, {:.1}) {}x{} lies entirely off the page",
            target.x, target.y, target.width, target.height
        ))
    })?;

    let strategy = fit_for_source(source);
    let fitted =
        strategy.compute_placement(image_width, image_height, clamped, page_width, page_height)?;
    let final_box = enforce_minimum_size(fitted);
    validate_bounds(final_box, page_width, page_height)?;
    Ok(final_box)
}
