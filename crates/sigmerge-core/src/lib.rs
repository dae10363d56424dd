//! Signature merging for PDF documents
//!
//! This crate takes a PDF plus a set of signature images with
//! screen-measured placement boxes and produces a new PDF with the
//! signatures drawn into the page content. Rotated and scanned
//! documents are flattened to rotation 0 first so the placement math
//! stays a single, well-tested path.
//!
//! Entry points:
//! - `merge_signatures`: the full pipeline (load, analyze, flatten if
//!   needed, place, serialize)
//! - `flatten::flatten_bytes`: flattening on its own
//! - `scan::scan_confidence`: the scanned-document heuristic on its own

pub mod cache;
pub mod error;
pub mod flatten;
pub mod merge;
pub mod placement;
pub mod placer;
pub mod scan;

pub use cache::GeometryCache;
pub use error::SigMergeError;
pub use flatten::{flatten_bytes, flatten_document, FlattenOutcome, FlattenedPageInfo};
pub use merge::{merge_signatures, MergeOutcome, MergeStats, SkippedSignature};
pub use placement::{SignaturePlacement, SignatureSource};
pub use scan::{needs_flattening, scan_confidence, DocumentMetadata, ScanConfidence};
