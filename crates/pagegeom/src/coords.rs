//! Coordinate transformation between screen, relative, and PDF spaces
//!
//! Screen space is top-left origin in pixels at a given zoom scale;
//! relative space is resolution-independent [0,1] of the displayed page;
//! PDF content space is bottom-left origin in points. The Y-axis flip
//! between top-left and bottom-left conventions lives here and nowhere
//! else in the workspace.

use crate::error::GeometryError;
use crate::geometry::PageGeometry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// An axis-aligned box; which space it lives in is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A box in relative [0,1] document space — the canonical persisted
/// representation, independent of zoom and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    pub relative_x: f64,
    pub relative_y: f64,
    pub relative_width: f64,
    pub relative_height: f64,
}

fn check_finite(values: &[f64], what: &str) -> Result<(), GeometryError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::InvalidCoordinate(format!(
            "{} contains a non-finite value",
            what
        )));
    }
    Ok(())
}

fn check_geometry(geometry: &PageGeometry) -> Result<(), GeometryError> {
    check_finite(
        &[geometry.display_width, geometry.display_height],
        "page geometry",
    )?;
    if geometry.display_width <= 0.0 || geometry.display_height <= 0.0 {
        return Err(GeometryError::InvalidCoordinate(format!(
            "page geometry has non-positive dimensions {}x{}",
            geometry.display_width, geometry.display_height
        )));
    }
    Ok(())
}

fn check_scale(scale: f64) -> Result<(), GeometryError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(GeometryError::InvalidCoordinate(format!(
            "zoom scale must be finite and positive, got {}",
            scale
        )));
    }
    Ok(())
}

/// Convert a screen-space point (top-left origin, pixels at `scale`)
/// to PDF content space (bottom-left origin, points).
pub fn screen_to_pdf(
    screen: Point,
    geometry: &PageGeometry,
    scale: f64,
) -> Result<Point, GeometryError> {
    check_finite(&[screen.x, screen.y], "screen point")?;
    check_geometry(geometry)?;
    check_scale(scale)?;

    Ok(Point {
        x: screen.x / scale,
        y: geometry.display_height - screen.y / scale,
    })
}

/// Exact inverse of [`screen_to_pdf`].
pub fn pdf_to_screen(
    pdf: Point,
    geometry: &PageGeometry,
    scale: f64,
) -> Result<Point, GeometryError> {
    check_finite(&[pdf.x, pdf.y], "pdf point")?;
    check_geometry(geometry)?;
    check_scale(scale)?;

    Ok(Point {
        x: pdf.x * scale,
        y: (geometry.display_height - pdf.y) * scale,
    })
}

/// Scale a relative [0,1] box up to absolute display points.
/// No Y flip: relative and absolute boxes share the top-left convention.
pub fn relative_to_absolute(
    rel: RelativeRect,
    geometry: &PageGeometry,
) -> Result<Rect, GeometryError> {
    check_finite(
        &[
            rel.relative_x,
            rel.relative_y,
            rel.relative_width,
            rel.relative_height,
        ],
        "relative box",
    )?;
    check_geometry(geometry)?;

    Ok(Rect {
        x: rel.relative_x * geometry.display_width,
        y: rel.relative_y * geometry.display_height,
        width: rel.relative_width * geometry.display_width,
        height: rel.relative_height * geometry.display_height,
    })
}

/// Exact inverse of [`relative_to_absolute`], used when persisting a
/// placement made at a specific zoom level.
pub fn absolute_to_relative(
    abs: Rect,
    geometry: &PageGeometry,
) -> Result<RelativeRect, GeometryError> {
    check_finite(&[abs.x, abs.y, abs.width, abs.height], "absolute box")?;
    check_geometry(geometry)?;

    Ok(RelativeRect {
        relative_x: abs.x / geometry.display_width,
        relative_y: abs.y / geometry.display_height,
        relative_width: abs.width / geometry.display_width,
        relative_height: abs.height / geometry.display_height,
    })
}

/// Convert a box given in display points with a top-left origin (the
/// convention callers use when describing what they saw on screen) to
/// PDF content space with a bottom-left origin. The returned `y` is the
/// bottom edge of the box.
pub fn top_left_rect_to_pdf(rect: Rect, geometry: &PageGeometry) -> Result<Rect, GeometryError> {
    check_finite(&[rect.x, rect.y, rect.width, rect.height], "target box")?;
    check_geometry(geometry)?;

    Ok(Rect {
        x: rect.x,
        y: geometry.display_height - rect.y - rect.height,
        width: rect.width,
        height: rect.height,
    })
}

#[cfg(test)]
fn letter_geometry(rotation: u16) -> PageGeometry {
    let (dw, dh) = if rotation == 90 || rotation == 270 {
        (792.0, 612.0)
    } else {
        (612.0, 792.0)
    };
    PageGeometry {
        page_number: 1,
        original_width: 612.0,
        original_height: 792.0,
        rotation_degrees: rotation,
        display_width: dw,
        display_height: dh,
        origin_x: 0.0,
        origin_y: 0.0,
    }
}
