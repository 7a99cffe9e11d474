use crate::error::{Error, Result};
use crate::index::ArrayIndex;
use crate::shape::Shape;

// Layout — how a logical shape maps onto a flat storage buffer
//
//   flat(i_0, .., i_{n-1}) = offset + Σ i_k * strides[k]
//
// Every indexing view is a pure layout rewrite over the same buffer:
//
//   SingleElement(i)  offset += stride * i, axis dropped
//   Slice(s)          offset += stride * start, dim = len, stride *= step
//   NewAxis           dim 1, stride 0, no input axis consumed
//
// Strides and offset are signed so that negative-step slices work. A
// non-empty layout never addresses a negative flat index; an empty one may
// carry an offset of -stride (e.g. `-10::-1` on a short axis), which is
// harmless because nothing is ever read through it.

/// Layout describes how an array's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<isize>,
    /// Element offset into the storage buffer where this view starts.
    offset: isize,
}

impl Layout {
    /// Contiguous row-major layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Layout with explicit strides and offset (for views).
    pub fn new(shape: Shape, strides: Vec<isize>, offset: isize) -> Self {
        debug_assert_eq!(shape.rank(), strides.len());
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Row-major with no gaps and zero offset.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == self.shape.stride_contiguous()
    }

    /// Apply an indexing expression, producing the layout of the view.
    ///
    /// No data is touched; the result addresses a subset of the same
    /// buffer. Fails if a single-element index is out of range or if more
    /// axes are consumed than this layout has.
    ///
    /// Example: shape [3, 4] strides [4, 1]
    ///   at([1])           → shape [4],       strides [1],       offset 4
    ///   at([0:2, newaxis])→ shape [2, 1, 4], strides [4, 0, 1], offset 0
    ///   at([.., ::-1])    → shape [3, 4],    strides [4, -1],   offset 3
    pub fn at(&self, indices: &[ArrayIndex]) -> Result<Layout> {
        let consumed = indices.iter().filter(|i| i.consumes_axis()).count();
        if consumed > self.rank() {
            return Err(Error::TooManyIndices {
                got: consumed,
                rank: self.rank(),
            });
        }

        let dims = self.dims();
        let mut out_dims = Vec::with_capacity(self.rank() + indices.len());
        let mut out_strides = Vec::with_capacity(self.rank() + indices.len());
        let mut out_offset = self.offset;
        let mut i_in = 0usize;

        for index in indices {
            match index {
                ArrayIndex::SingleElement(idx) => {
                    let dim = dims[i_in];
                    let d = dim as i64;
                    if *idx < -d || *idx >= d {
                        return Err(Error::IndexOutOfBounds {
                            index: *idx,
                            axis: i_in,
                            size: dim,
                        });
                    }
                    let idx_norm = (idx + d) % d;
                    out_offset += self.strides[i_in] * idx_norm as isize;
                    i_in += 1;
                }
                ArrayIndex::Slice(slice) => {
                    let dim = dims[i_in];
                    let stride = self.strides[i_in];
                    let len = slice.length(dim);
                    // A huge step selects at most one element, whose stride is never used.
                    let step_stride = isize::try_from(slice.step())
                        .ok()
                        .and_then(|step| stride.checked_mul(step));
                    let out_stride = match step_stride {
                        Some(s) => s,
                        None if len <= 1 => stride,
                        None => crate::bail!(
                            "slice step {} overflows stride {} on axis {}",
                            slice.step(),
                            stride,
                            i_in
                        ),
                    };
                    out_offset += stride * slice.start(dim) as isize;
                    out_dims.push(len);
                    out_strides.push(out_stride);
                    i_in += 1;
                }
                ArrayIndex::NewAxis => {
                    out_dims.push(1);
                    out_strides.push(0);
                }
            }
        }

        out_dims.extend_from_slice(&dims[i_in..]);
        out_strides.extend_from_slice(&self.strides[i_in..]);

        Ok(Layout::new(Shape::new(out_dims), out_strides, out_offset))
    }

    /// Iterator over the flat storage index of every element, in logical
    /// row-major order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

// StridedIter — walks a layout in logical order, yielding storage indices.
//
// Contiguous layouts yield 0, 1, 2, ...; views jump around according to
// their strides (backwards for negative ones, repeating for stride 0).

/// Iterator that yields flat storage indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<isize>,
    /// Flat index of `current`, maintained incrementally.
    position: isize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            position: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    /// Advance the multi-dimensional index by one (rightmost axis first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            self.position += self.strides[i];
            if self.current[i] < self.dims[i] {
                return;
            }
            self.position -= self.strides[i] * self.dims[i] as isize;
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        debug_assert!(self.position >= 0, "strided index below buffer start");
        Some(self.position as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
