use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within tessera.
///
/// Indexing failures (out-of-bounds element, bad axis), dtype failures
/// (mismatched operands, unsupported index dtype) and shape failures
/// (sub-view vs. addend mismatch) all surface through this single type so
/// `?` works across the whole crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two arrays (e.g. an addend that does not match
    /// the sub-view it is scattered into).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// DType mismatch between arrays in a binary operation.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Index arrays for gather/scatter must be i64.
    #[error("Only {expected} is supported as indices, but given {got}")]
    UnsupportedIndexDType { expected: DType, got: DType },

    /// A single-element index outside `[-size, size)`.
    #[error("Index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds { index: i64, axis: usize, size: usize },

    /// More axis-consuming indices than the array has dimensions.
    #[error("too many indices: {got} indices for array with {rank} dimensions")]
    TooManyIndices { got: usize, rank: usize },

    /// Signed axis outside `[-rank, rank)`.
    #[error("axis {axis} is out of range for array with {rank} dimensions")]
    AxisOutOfRange { axis: i64, rank: usize },

    /// Tried to access a scalar from a non-scalar array.
    #[error("not a scalar: array has shape {shape}")]
    NotAScalar { shape: Shape },

    /// Element count mismatch when creating from a slice.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout tessera.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
