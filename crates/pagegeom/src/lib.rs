//! Pure page-geometry layer for PDF signature placement
//!
//! Determines the true displayed dimensions and rotation of each page
//! (without rendering) and converts between the three coordinate spaces
//! involved in interactive placement: on-screen pixels at a zoom level,
//! relative [0,1] document space, and PDF content space.
//!
//! Nothing in this crate mutates a document; the placement engine lives
//! in `sigmerge-core`.

pub mod coords;
pub mod error;
pub mod geometry;

pub use coords::{
    absolute_to_relative, pdf_to_screen, relative_to_absolute, screen_to_pdf,
    top_left_rect_to_pdf, Point, Rect, RelativeRect,
};
pub use error::GeometryError;
pub use geometry::{
    extract_from_document, extract_geometry, DocumentGeometry, Orientation, PageGeometry,
};
