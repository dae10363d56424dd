//! Per-page display geometry extraction
//!
//! Reads declared page boxes and rotation from the page tree without
//! rendering anything, so results are deterministic and cacheable. All
//! judgment about whether a document is a mis-rotated scan lives in
//! `sigmerge-core`; this module only reports what the file declares.

use crate::error::GeometryError;
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Display orientation, derived from the post-rotation dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Immutable geometry snapshot for a single page.
///
/// `display_width`/`display_height` are what a viewer renders: the raw
/// MediaBox dimensions with the axes swapped when the declared rotation
/// is 90 or 270. Rotation only swaps axes, never scales, so
/// `display_width * display_height == original_width * original_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    /// 1-based page number.
    pub page_number: u32,
    /// Raw content-space width in points, before rotation.
    pub original_width: f64,
    /// Raw content-space height in points, before rotation.
    pub original_height: f64,
    /// Declared rotation, normalized to one of {0, 90, 180, 270}.
    pub rotation_degrees: u16,
    /// Width as rendered by a viewer.
    pub display_width: f64,
    /// Height as rendered by a viewer.
    pub display_height: f64,
    /// MediaBox lower-left corner; non-zero in some cropped scans.
    pub origin_x: f64,
    pub origin_y: f64,
}

impl PageGeometry {
    pub fn orientation(&self) -> Orientation {
        if self.display_width > self.display_height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.display_width / self.display_height
    }
}

/// Geometry for every page of a document, keyed by 1-based page number.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentGeometry {
    pub total_pages: u32,
    pub pages: BTreeMap<u32, PageGeometry>,
}

impl DocumentGeometry {
    pub fn page(&self, page_number: u32) -> Option<&PageGeometry> {
        self.pages.get(&page_number)
    }

    /// True when all pages share the same display size and rotation.
    /// Mixed-size documents are legal; this is a diagnostic, not a gate.
    pub fn is_uniform(&self) -> bool {
        let mut iter = self.pages.values();
        let Some(first) = iter.next() else {
            return true;
        };
        iter.all(|p| {
            (p.display_width - first.display_width).abs() < 0.5
                && (p.display_height - first.display_height).abs() < 0.5
                && p.rotation_degrees == first.rotation_degrees
        })
    }

    pub fn has_rotated_pages(&self) -> bool {
        self.pages.values().any(|p| p.rotation_degrees != 0)
    }

    pub fn has_mixed_orientations(&self) -> bool {
        let mut orientations = self.pages.values().map(|p| p.orientation());
        match orientations.next() {
            Some(first) => orientations.any(|o| o != first),
            None => false,
        }
    }
}

/// Parse a PDF byte stream and extract geometry for every page.
pub fn extract_geometry(pdf_bytes: &[u8]) -> Result<DocumentGeometry, GeometryError> {
    let doc =
        Document::load_mem(pdf_bytes).map_err(|e| GeometryError::ParseError(e.to_string()))?;
    extract_from_document(&doc)
}

/// Extract geometry from an already-loaded document.
pub fn extract_from_document(doc: &Document) -> Result<DocumentGeometry, GeometryError> {
    let page_ids = doc.get_pages();
    let mut pages = BTreeMap::new();

    for (page_number, page_id) in &page_ids {
        let geometry = extract_page(doc, *page_number, *page_id)?;
        pages.insert(*page_number, geometry);
    }

    Ok(DocumentGeometry {
        total_pages: page_ids.len() as u32,
        pages,
    })
}

fn extract_page(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
) -> Result<PageGeometry, GeometryError> {
    let media_box = inherited_page_attr(doc, page_id, b"MediaBox")
        .ok_or_else(|| {
            GeometryError::ParseError(format!("Page {} has no MediaBox", page_number))
        })
        .and_then(|obj| {
            rect_bounds(doc, obj).ok_or_else(|| {
                GeometryError::ParseError(format!("Page {} has a malformed MediaBox", page_number))
            })
        })?;

    let (x0, y0, x1, y1) = media_box;
    let original_width = x1 - x0;
    let original_height = y1 - y0;
    if original_width <= 0.0 || original_height <= 0.0 {
        return Err(GeometryError::ParseError(format!(
            "Page {} has degenerate MediaBox dimensions {}x{}",
            page_number, original_width, original_height
        )));
    }

    let declared = inherited_page_attr(doc, page_id, b"Rotate")
        .and_then(|obj| number(obj))
        .unwrap_or(0.0);
    let rotation_degrees = normalize_rotation(page_number, declared as i64);

    let (display_width, display_height) = if rotation_degrees == 90 || rotation_degrees == 270 {
        (original_height, original_width)
    } else {
        (original_width, original_height)
    };

    Ok(PageGeometry {
        page_number,
        original_width,
        original_height,
        rotation_degrees,
        display_width,
        display_height,
        origin_x: x0,
        origin_y: y0,
    })
}

/// Reduce a declared /Rotate value into {0, 90, 180, 270}.
/// Values that are not multiples of 90 are invalid per the PDF spec and
/// are treated as unrotated.
fn normalize_rotation(page_number: u32, declared: i64) -> u16 {
    let reduced = declared.rem_euclid(360);
    match reduced {
        0 | 90 | 180 | 270 => reduced as u16,
        other => {
            warn!(
                page = page_number,
                declared, "ignoring non-multiple-of-90 rotation {}", other
            );
            0
        }
    }
}

/// Look up a page attribute, walking the Parent chain for inheritable
/// keys like MediaBox and Rotate. Depth-limited against cyclic trees.
fn inherited_page_attr<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..64 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => return None,
        }
    }
    None
}

/// Interpret an object (or the reference it points at) as a rectangle,
/// returning normalized (x0, y0, x1, y1) bounds.
fn rect_bounds(doc: &Document, obj: &Object) -> Option<(f64, f64, f64, f64)> {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(arr.iter()) {
        let item = match item {
            Object::Reference(id) => doc.get_object(*id).ok()?,
            other => other,
        };
        *slot = number(item)?;
    }
    let x0 = values[0].min(values[2]);
    let x1 = values[0].max(values[2]);
    let y0 = values[1].min(values[3]);
    let y1 = values[1].max(values[3]);
    Some((x0, y0, x1, y1))
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};
    use pretty_assertions::assert_eq;

    /// Build a PDF whose pages carry the given (width, height, rotate)
    /// triples, each with its own MediaBox.
    fn build_pdf(pages: &[(f64, f64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for (w, h, rotate) in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), Object::Real(*w as f32), Object::Real(*h as f32)],
            };
            if *rotate != 0 {
                page.set("Rotate", Object::Integer(*rotate));
            }
            let page_id = doc.add_object(Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_unrotated_page_dimensions() {
        let pdf = build_pdf(&[(612.0, 792.0, 0)]);
        let geometry = extract_geometry(&pdf).unwrap();

        assert_eq!(geometry.total_pages, 1);
        let page = geometry.page(1).unwrap();
        assert_eq!(page.rotation_degrees, 0);
        assert_eq!(page.display_width, 612.0);
        assert_eq!(page.display_height, 792.0);
        assert_eq!(page.orientation(), Orientation::Portrait);
    }

    #[test]
    fn test_rotation_swaps_display_axes() {
        for rotate in [90, 270] {
            let pdf = build_pdf(&[(612.0, 792.0, rotate)]);
            let geometry = extract_geometry(&pdf).unwrap();
            let page = geometry.page(1).unwrap();

            assert_eq!(page.display_width, page.original_height);
            assert_eq!(page.display_height, page.original_width);
            assert_eq!(page.orientation(), Orientation::Landscape);
        }
    }

    #[test]
    fn test_aspect_ratio_follows_display_axes() {
        let pdf = build_pdf(&[(612.0, 792.0, 0)]);
        let geometry = extract_geometry(&pdf).unwrap();
        let page = geometry.page(1).unwrap();
        assert!((page.aspect_ratio() - 612.0 / 792.0).abs() < 1e-9);

        let pdf = build_pdf(&[(612.0, 792.0, 90)]);
        let geometry = extract_geometry(&pdf).unwrap();
        let page = geometry.page(1).unwrap();
        assert!((page.aspect_ratio() - 792.0 / 612.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_180_keeps_dimensions() {
        let pdf = build_pdf(&[(612.0, 792.0, 180)]);
        let geometry = extract_geometry(&pdf).unwrap();
        let page = geometry.page(1).unwrap();

        assert_eq!(page.rotation_degrees, 180);
        assert_eq!(page.display_width, 612.0);
        assert_eq!(page.display_height, 792.0);
    }

    #[test]
    fn test_rotation_preserves_area() {
        for rotate in [0, 90, 180, 270] {
            let pdf = build_pdf(&[(595.0, 842.0, rotate)]);
            let geometry = extract_geometry(&pdf).unwrap();
            let page = geometry.page(1).unwrap();

            let display_area = page.display_width * page.display_height;
            let original_area = page.original_width * page.original_height;
            assert!((display_area - original_area).abs() < 1e-9);
        }
    }

    #[test]
    fn test_negative_rotation_is_reduced() {
        let pdf = build_pdf(&[(612.0, 792.0, -90)]);
        let geometry = extract_geometry(&pdf).unwrap();
        // -90 is the same display rotation as 270
        assert_eq!(geometry.page(1).unwrap().rotation_degrees, 270);
    }

    #[test]
    fn test_bogus_rotation_treated_as_zero() {
        let pdf = build_pdf(&[(612.0, 792.0, 45)]);
        let geometry = extract_geometry(&pdf).unwrap();
        assert_eq!(geometry.page(1).unwrap().rotation_degrees, 0);
    }

    #[test]
    fn test_inherited_media_box_and_rotate() {
        // MediaBox and Rotate declared on the Pages node, not the page
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![Object::Reference(page_id)],
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Rotate" => 90,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();

        let geometry = extract_geometry(&buffer).unwrap();
        let page = geometry.page(1).unwrap();
        assert_eq!(page.rotation_degrees, 90);
        assert_eq!(page.display_width, 792.0);
        assert_eq!(page.display_height, 612.0);
    }

    #[test]
    fn test_offset_media_box_origin() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![20.into(), 30.into(), 632.into(), 822.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![Object::Reference(page_id)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();

        let geometry = extract_geometry(&buffer).unwrap();
        let page = geometry.page(1).unwrap();
        assert_eq!(page.origin_x, 20.0);
        assert_eq!(page.origin_y, 30.0);
        assert_eq!(page.original_width, 612.0);
        assert_eq!(page.original_height, 792.0);
    }

    #[test]
    fn test_mixed_orientations_detected() {
        let pdf = build_pdf(&[(612.0, 792.0, 0), (792.0, 612.0, 0)]);
        let geometry = extract_geometry(&pdf).unwrap();
        assert!(geometry.has_mixed_orientations());
        assert!(!geometry.is_uniform());
    }

    #[test]
    fn test_uniform_document() {
        let pdf = build_pdf(&[(612.0, 792.0, 0), (612.0, 792.0, 0)]);
        let geometry = extract_geometry(&pdf).unwrap();
        assert!(geometry.is_uniform());
        assert!(!geometry.has_rotated_pages());
        assert!(!geometry.has_mixed_orientations());
    }

    #[test]
    fn test_garbage_bytes_is_parse_error() {
        let result = extract_geometry(b"not a pdf at all");
        assert!(matches!(result, Err(GeometryError::ParseError(_))));
    }
}
