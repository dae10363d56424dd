//! Page flattening: rewrite a document so every page has rotation 0
//!
//! Viewers apply /Rotate at render time; nothing in the content stream
//! changes. Flattening bakes that rotation in: each output page gets the
//! post-rotation (effective) dimensions, rotation 0, and its content
//! counter-rotated so the visual result is unchanged. Downstream code —
//! including the signature placer — can then treat every page as an
//! ordinary unrotated page.
//!
//! Two content-copy strategies exist behind [`CopyStrategy`]. The embed
//! strategy imports the source object set once and draws each page as a
//! Form XObject onto a fresh page; it is preferred but fails on some
//! merged/concatenated documents. The direct strategy clones the source
//! and rewrites each page's content stream in place. The first page's
//! outcome under embed decides the strategy for the whole document.

use crate::error::SigMergeError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pagegeom::{extract_from_document, DocumentGeometry, PageGeometry};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Provenance record for one source page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlattenedPageInfo {
    pub page_number: u32,
    pub original_rotation: u16,
    pub effective_width: f64,
    pub effective_height: f64,
    /// True when the page had non-zero declared rotation, or the whole
    /// document was judged anomalous and force-flattened.
    pub was_flattened: bool,
}

/// Result of flattening a document.
pub struct FlattenOutcome {
    pub document: Document,
    pub pages: BTreeMap<u32, FlattenedPageInfo>,
    pub was_flattened: bool,
    /// Pages that failed both copy strategies and were replaced with a
    /// blank page of the correct effective size.
    pub blank_pages: Vec<u32>,
}

/// Common contract for the two content-copy strategies.
trait CopyStrategy {
    fn name(&self) -> &'static str;

    /// Copy one source page into the output, rotation consumed.
    fn copy_page(
        &mut self,
        source: &Document,
        page_id: ObjectId,
        geometry: &PageGeometry,
    ) -> Result<(), SigMergeError>;

    /// Degraded fallback: emit a blank page of the effective size.
    fn blank_page(&mut self, source: &Document, page_id: ObjectId, geometry: &PageGeometry);

    fn finish(self: Box<Self>) -> Result<Document, SigMergeError>;
}

/// Flatten a raw PDF byte stream. `force` marks every page as flattened
/// even when its declared rotation was already 0 (used when the scan
/// heuristic judged the whole document anomalous).
pub fn flatten_bytes(pdf_bytes: &[u8], force: bool) -> Result<FlattenOutcome, SigMergeError> {
    let doc =
        Document::load_mem(pdf_bytes).map_err(|e| SigMergeError::ParseError(e.to_string()))?;
    flatten_document(&doc, force)
}

/// Flatten an already-loaded document. Must not fail on anything the
/// geometry extractor could parse; per-page copy errors degrade to blank
/// pages instead of aborting.
pub fn flatten_document(source: &Document, force: bool) -> Result<FlattenOutcome, SigMergeError> {
    let geometry = extract_from_document(source)?;

    // Already-unrotated, non-anomalous documents are a no-op.
    if !force && !geometry.has_rotated_pages() {
        debug!("no rotated pages and no anomaly, skipping flatten");
        return Ok(FlattenOutcome {
            document: source.clone(),
            pages: page_infos(&geometry, false),
            was_flattened: false,
            blank_pages: Vec::new(),
        });
    }

    let page_ids: Vec<(u32, ObjectId)> = source.get_pages().into_iter().collect();
    let mut blank_pages = Vec::new();

    // Probe the embed strategy on the first page; its outcome decides
    // the strategy for the whole document.
    let mut strategy: Box<dyn CopyStrategy> = Box::new(EmbedStrategy::new(source));
    let mut start_index = 0;
    if let Some((page_number, page_id)) = page_ids.first() {
        let page_geometry = expect_page(&geometry, *page_number)?;
        match strategy.copy_page(source, *page_id, page_geometry) {
            Ok(()) => start_index = 1,
            Err(err) => {
                info!(
                    "embed strategy failed on first page ({}), falling back to direct copy",
                    err
                );
                strategy = Box::new(DirectStrategy::new(source));
            }
        }
    }

    for (page_number, page_id) in &page_ids[start_index..] {
        let page_geometry = expect_page(&geometry, *page_number)?;
        if let Err(err) = strategy.copy_page(source, *page_id, page_geometry) {
            warn!(
                page = page_number,
                strategy = strategy.name(),
                "page copy failed ({}), inserting blank page",
                err
            );
            strategy.blank_page(source, *page_id, page_geometry);
            blank_pages.push(*page_number);
        }
    }

    let document = strategy.finish()?;
    Ok(FlattenOutcome {
        document,
        pages: page_infos(&geometry, force),
        was_flattened: true,
        blank_pages,
    })
}

fn page_infos(geometry: &DocumentGeometry, force: bool) -> BTreeMap<u32, FlattenedPageInfo> {
    geometry
        .pages
        .iter()
        .map(|(n, p)| {
            (
                *n,
                FlattenedPageInfo {
                    page_number: *n,
                    original_rotation: p.rotation_degrees,
                    effective_width: p.display_width,
                    effective_height: p.display_height,
                    was_flattened: force || p.rotation_degrees != 0,
                },
            )
        })
        .collect()
}

fn expect_page(geometry: &DocumentGeometry, page_number: u32) -> Result<&PageGeometry, SigMergeError> {
    geometry
        .page(page_number)
        .ok_or_else(|| SigMergeError::ParseError(format!("page {} not found", page_number)))
}

/// Content ops mapping original content space onto the rotation-0 page:
/// a counter-rotation placing the origin for each rotation case, then a
/// translation normalizing a non-zero MediaBox origin.
fn reorient_ops(geometry: &PageGeometry) -> String {
    let mut ops = String::new();
    let w = geometry.display_width;
    let h = geometry.display_height;
    match geometry.rotation_degrees {
        90 => ops.push_str(&format!("0 -1 1 0 0 {} cm\n", fmt(h))),
        180 => ops.push_str(&format!("-1 0 0 -1 {} {} cm\n", fmt(w), fmt(h))),
        270 => ops.push_str(&format!("0 1 -1 0 {} 0 cm\n", fmt(w))),
        _ => {}
    }
    if geometry.origin_x != 0.0 || geometry.origin_y != 0.0 {
        ops.push_str(&format!(
            "1 0 0 1 {} {} cm\n",
            fmt(-geometry.origin_x),
            fmt(-geometry.origin_y)
        ));
    }
    ops
}

fn fmt(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}

fn media_box(width: f64, height: f64) -> Object {
    Object::Array(vec![
        0.into(),
        0.into(),
        Object::Real(width as f32),
        Object::Real(height as f32),
    ])
}

/// Look up a page attribute (unresolved), walking the Parent chain.
fn inherited_attr(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..64 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => return None,
        }
    }
    None
}

/// Recursively remap object references by an ID offset.
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------
// Embed strategy: one import of the whole source object set, each page
// wrapped as a Form XObject and drawn onto a fresh rotation-0 page.
// ---------------------------------------------------------------------

struct EmbedStrategy {
    dest: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    offset: u32,
}

impl EmbedStrategy {
    fn new(source: &Document) -> Self {
        let mut dest = Document::with_version("1.7");
        let pages_id = dest.new_object_id();
        let offset = dest.max_id;

        for (old_id, object) in &source.objects {
            let new_id = (old_id.0 + offset, old_id.1);
            dest.objects
                .insert(new_id, remap_object_refs(object.clone(), offset));
        }
        dest.max_id = source.max_id + offset;

        Self {
            dest,
            pages_id,
            kids: Vec::new(),
            offset,
        }
    }

    fn remapped_resources(&self, source: &Document, page_id: ObjectId) -> Object {
        match inherited_attr(source, page_id, b"Resources") {
            Some(resources) => remap_object_refs(resources, self.offset),
            None => Object::Dictionary(Dictionary::new()),
        }
    }

    fn push_page(&mut self, width: f64, height: f64, contents: Vec<u8>, resources: Dictionary) {
        let content_id = self
            .dest
            .add_object(Object::Stream(Stream::new(Dictionary::new(), contents)));
        let page_id = self.dest.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(self.pages_id),
            "MediaBox" => media_box(width, height),
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Dictionary(resources),
        });
        self.kids.push(page_id);
    }
}

impl CopyStrategy for EmbedStrategy {
    fn name(&self) -> &'static str {
        "embed"
    }

    fn copy_page(
        &mut self,
        source: &Document,
        page_id: ObjectId,
        geometry: &PageGeometry,
    ) -> Result<(), SigMergeError> {
        let content = source
            .get_page_content(page_id)
            .map_err(|e| SigMergeError::PageCopyError {
                page: geometry.page_number,
                reason: e.to_string(),
            })?;

        // The form keeps the original content space; BBox clips to the
        // source MediaBox.
        let bbox = Object::Array(vec![
            Object::Real(geometry.origin_x as f32),
            Object::Real(geometry.origin_y as f32),
            Object::Real((geometry.origin_x + geometry.original_width) as f32),
            Object::Real((geometry.origin_y + geometry.original_height) as f32),
        ]);
        let mut form_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => bbox,
        };
        form_dict.set("Resources", self.remapped_resources(source, page_id));
        let form_id = self
            .dest
            .add_object(Object::Stream(Stream::new(form_dict, content)));

        let form_name = format!("Fx{}", geometry.page_number);
        let ops = format!("q\n{}/{} Do\nQ", reorient_ops(geometry), form_name);

        let mut xobjects = Dictionary::new();
        xobjects.set(form_name.as_bytes(), Object::Reference(form_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        self.push_page(
            geometry.display_width,
            geometry.display_height,
            ops.into_bytes(),
            resources,
        );
        Ok(())
    }

    fn blank_page(&mut self, _source: &Document, _page_id: ObjectId, geometry: &PageGeometry) {
        self.push_page(
            geometry.display_width,
            geometry.display_height,
            Vec::new(),
            Dictionary::new(),
        );
    }

    fn finish(mut self: Box<Self>) -> Result<Document, SigMergeError> {
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        self.dest.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = self.dest.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        self.dest.trailer.set("Root", Object::Reference(catalog_id));

        // The import copied the entire source object set; everything not
        // reachable from the new catalog (old page tree, old catalog,
        // superseded content streams) is orphaned now.
        self.dest.prune_objects();
        Ok(self.dest)
    }
}

// ---------------------------------------------------------------------
// Direct strategy: clone the source and normalize each page in place by
// wrapping its content stream in the counter-rotation.
// ---------------------------------------------------------------------

struct DirectStrategy {
    doc: Document,
}

impl DirectStrategy {
    fn new(source: &Document) -> Self {
        Self {
            doc: source.clone(),
        }
    }

    fn set_page_shape(
        &mut self,
        page_id: ObjectId,
        geometry: &PageGeometry,
        contents: Option<ObjectId>,
    ) -> Result<(), SigMergeError> {
        let page = self
            .doc
            .get_object_mut(page_id)
            .map_err(|e| SigMergeError::PageCopyError {
                page: geometry.page_number,
                reason: e.to_string(),
            })?
            .as_dict_mut()
            .map_err(|e| SigMergeError::PageCopyError {
                page: geometry.page_number,
                reason: e.to_string(),
            })?;

        page.set(
            "MediaBox",
            media_box(geometry.display_width, geometry.display_height),
        );
        page.remove(b"Rotate");
        // CropBox would re-crop the reoriented content with stale
        // coordinates, so it is dropped along with the rotation.
        page.remove(b"CropBox");
        if let Some(content_id) = contents {
            page.set("Contents", Object::Reference(content_id));
        }
        Ok(())
    }
}

impl CopyStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn copy_page(
        &mut self,
        _source: &Document,
        page_id: ObjectId,
        geometry: &PageGeometry,
    ) -> Result<(), SigMergeError> {
        let needs_rewrite = geometry.rotation_degrees != 0
            || geometry.origin_x != 0.0
            || geometry.origin_y != 0.0;
        if !needs_rewrite {
            return Ok(());
        }

        let content = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| SigMergeError::PageCopyError {
                page: geometry.page_number,
                reason: e.to_string(),
            })?;

        let mut wrapped = format!("q\n{}", reorient_ops(geometry)).into_bytes();
        wrapped.extend_from_slice(&content);
        wrapped.extend_from_slice(b"\nQ");
        let content_id = self
            .doc
            .add_object(Object::Stream(Stream::new(Dictionary::new(), wrapped)));

        self.set_page_shape(page_id, geometry, Some(content_id))
    }

    fn blank_page(&mut self, _source: &Document, page_id: ObjectId, geometry: &PageGeometry) {
        let empty_id = self
            .doc
            .add_object(Object::Stream(Stream::new(Dictionary::new(), Vec::new())));
        // The page dict itself parsed, or geometry extraction would have
        // failed; only its content was unreadable.
        let _ = self.set_page_shape(page_id, geometry, Some(empty_id));
    }

    fn finish(self: Box<Self>) -> Result<Document, SigMergeError> {
        Ok(self.doc)
    }
}
