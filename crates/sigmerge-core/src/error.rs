use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigMergeError {
    /// Input bytes are not a valid PDF, or a requested page does not
    /// exist. Fatal for the whole operation.
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    /// A signature image is not decodable PNG/JPEG. Non-fatal at the
    /// document level; the signature is skipped and reported.
    #[error("Failed to decode signature image: {0}")]
    ImageDecodeError(String),

    /// A page failed to copy during flattening. Recovered with a blank
    /// page of the correct size; surfaced in the merge stats.
    #[error("Failed to copy page {page}: {reason}")]
    PageCopyError { page: u32, reason: String },

    /// The computed placement falls outside the page after all
    /// adjustments. The signature is skipped, never clamped and drawn.
    #[error("Placement out of page bounds: {0}")]
    OutOfBounds(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<pagegeom::GeometryError> for SigMergeError {
    fn from(err: pagegeom::GeometryError) -> Self {
        match err {
            pagegeom::GeometryError::PageNotFound(page) => {
                SigMergeError::ParseError(format!("page {} not found", page))
            }
            other => SigMergeError::ParseError(other.to_string()),
        }
    }
}
