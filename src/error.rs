use thiserror::Error;

/// Failure of a whole conversion request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Invalid SVG document: {0}")]
    InvalidDocument(String),

    #[error("Invalid option `{key}`: {reason}")]
    InvalidOption { key: &'static str, reason: String },

    /// The document had no drawable geometry. Hosts should report this to the
    /// user rather than treat it as an internal failure.
    #[error("The SVG contains no valid paths to embroider")]
    EmptyDesign,

    /// Sampling would exceed the point limit for one conversion.
    #[error("The design needs more than {limit} needle points; use a coarser stitch density or a smaller size")]
    TooManyStitches { limit: usize },

    #[error("Failed to encode output: {0}")]
    Encode(String),
}

/// Failure to turn a single element into geometry. The builder skips the
/// element and keeps going.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("malformed path data: {0}")]
    PathData(String),

    #[error("missing attribute `{0}`")]
    MissingAttribute(&'static str),

    #[error("attribute `{attribute}` has invalid value `{value}`")]
    InvalidNumber {
        attribute: &'static str,
        value: String,
    },
}
