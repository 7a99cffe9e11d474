use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::slice::Slice;

/// One axis selector in an indexing expression.
///
/// A sequence of these is applied left to right by [`Layout::at`]:
/// `SingleElement` and `Slice` each consume one input axis, `NewAxis`
/// consumes none. Axes left over at the end are kept as they are.
///
/// [`Layout::at`]: crate::layout::Layout::at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayIndex {
    /// Pick one position; the axis disappears from the result.
    SingleElement(i64),
    /// Pick a strided range; the axis is kept.
    Slice(Slice),
    /// Insert a length-1 axis with stride 0.
    NewAxis,
}

impl ArrayIndex {
    /// Whether this selector consumes an axis of the input.
    pub fn consumes_axis(&self) -> bool {
        !matches!(self, ArrayIndex::NewAxis)
    }
}

impl fmt::Display for ArrayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayIndex::SingleElement(i) => write!(f, "{}", i),
            ArrayIndex::Slice(s) => write!(f, "{}", s),
            ArrayIndex::NewAxis => write!(f, "newaxis"),
        }
    }
}

impl From<i64> for ArrayIndex {
    fn from(i: i64) -> Self {
        ArrayIndex::SingleElement(i)
    }
}

impl From<Slice> for ArrayIndex {
    fn from(s: Slice) -> Self {
        ArrayIndex::Slice(s)
    }
}

impl From<Range<i64>> for ArrayIndex {
    fn from(r: Range<i64>) -> Self {
        ArrayIndex::Slice(r.into())
    }
}

impl From<RangeFrom<i64>> for ArrayIndex {
    fn from(r: RangeFrom<i64>) -> Self {
        ArrayIndex::Slice(r.into())
    }
}

impl From<RangeTo<i64>> for ArrayIndex {
    fn from(r: RangeTo<i64>) -> Self {
        ArrayIndex::Slice(r.into())
    }
}

impl From<RangeFull> for ArrayIndex {
    fn from(r: RangeFull) -> Self {
        ArrayIndex::Slice(r.into())
    }
}

/// Build a `Vec<ArrayIndex>` from mixed selectors.
///
/// ```ignore
/// let idx = indices![1, 0..2, ArrayIndex::NewAxis, ..];
/// ```
#[macro_export]
macro_rules! indices {
    ($($idx:expr),* $(,)?) => {
        vec![$($crate::index::ArrayIndex::from($idx)),*]
    };
}
