//! Error types for regridding.

use thiserror::Error;

/// Errors that can occur while building grids, computing areas or regridding.
///
/// Every variant except [`RegridError::SourceRead`] and
/// [`RegridError::StorageError`] is a contract violation by the caller.
/// Sparse or missing source coverage is never an error; it surfaces as
/// no-data in the output.
#[derive(Error, Debug)]
pub enum RegridError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    /// Angular span or resolution that is not a positive finite number.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// Grid definition that does not describe a valid lat/lon tiling.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Target resolution is not an integer multiple of the source resolution.
    #[error("resolution ratio {axis} = {ratio} is not a positive integer")]
    ResolutionMismatch { axis: &'static str, ratio: f64 },

    /// Source and target footprints do not line up.
    #[error("extent mismatch: {0}")]
    ExtentMismatch(String),

    /// Block shape or block bounds not aligned to target cells.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Array length does not match the grid it claims to cover.
    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Area or weight values that are negative or not finite.
    #[error("invalid area weights: {0}")]
    InvalidWeights(String),

    /// Aggregation mode requested on a value domain it cannot handle.
    #[error("aggregation mode {mode} is incompatible with {domain} data")]
    IncompatibleDomain { mode: String, domain: String },

    /// A categorical source value that is not an integer code.
    #[error("categorical value {0} is not an integer code")]
    InvalidCategory(f32),

    /// Tile size that does not evenly divide the globe.
    #[error("tile size {0} does not evenly divide 180 and 360 degrees")]
    InvalidTileSize(f64),

    /// A block could not be read from the source.
    #[error("failed to read source block: {0}")]
    SourceRead(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl RegridError {
    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create an ExtentMismatch error.
    pub fn extent_mismatch(msg: impl Into<String>) -> Self {
        Self::ExtentMismatch(msg.into())
    }

    /// Create an InvalidBlock error.
    pub fn invalid_block(msg: impl Into<String>) -> Self {
        Self::InvalidBlock(msg.into())
    }

    /// Create a SourceRead error.
    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceRead(msg.into())
    }

    /// Create an IncompatibleDomain error.
    pub fn incompatible_domain(mode: impl std::fmt::Display, domain: impl std::fmt::Display) -> Self {
        Self::IncompatibleDomain {
            mode: mode.to_string(),
            domain: domain.to_string(),
        }
    }
}

impl From<std::io::Error> for RegridError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for RegridError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Result type for regridding operations.
pub type Result<T> = std::result::Result<T, RegridError>;
