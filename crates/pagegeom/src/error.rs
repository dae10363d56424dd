use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Page {0} not found in document")]
    PageNotFound(u32),

    #[error("Invalid coordinate input: {0}")]
    InvalidCoordinate(String),
}
