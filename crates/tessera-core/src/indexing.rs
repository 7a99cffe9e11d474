// Indexing — views, gather, and their scatter-accumulate adjoints
//
//   at(indices)                 strided view, zero copy
//   add_at(indices, b)          copy of a with b added into the view
//   take(indices, axis)         gather along an axis (backend kernel)
//   add_at_axis(indices, axis, b)  scatter-add along an axis (backend kernel)
//
// The two pairs are mutual adjoints, which is exactly how their backward
// closures are wired:
//
//   at      : grad_a = add_at(zeros(a), indices, gout)
//   add_at  : grad_a = gout,  grad_b = gout.at(indices)
//   take    : grad_a = add_at_axis(zeros(a), indices, axis, gout)
//   add_at_axis : grad_a = gout,  grad_b = gout.take(indices, axis)
//
// Repeated indices in take read the same source element more than once, so
// its adjoint must accumulate rather than overwrite.

use crate::array::Array;
use crate::backend::Backend;
use crate::backward::BackwardBuilder;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::index::ArrayIndex;
use crate::layout::Layout;
use crate::shape::{normalize_axis, Shape};

/// `a.shape[..axis] ++ indices.shape ++ a.shape[axis+1..]`
fn gathered_shape(a: &Shape, indices: &Shape, axis: usize) -> Shape {
    let a_dims = a.dims();
    let mut dims = Vec::with_capacity(a.rank() + indices.rank());
    dims.extend_from_slice(&a_dims[..axis]);
    dims.extend_from_slice(indices.dims());
    dims.extend_from_slice(&a_dims[axis + 1..]);
    Shape::new(dims)
}

fn check_index_dtype(dtype: DType) -> Result<()> {
    if dtype != DType::I64 {
        return Err(Error::UnsupportedIndexDType {
            expected: DType::I64,
            got: dtype,
        });
    }
    Ok(())
}

impl<B: Backend> Array<B> {
    /// Strided view selected by `indices`. Shares this array's storage.
    ///
    /// Each entry consumes one axis (`SingleElement` drops it, `Slice`
    /// keeps it) except `NewAxis`, which inserts a length-1 axis. Axes not
    /// covered by `indices` pass through.
    ///
    /// ```ignore
    /// // a: shape [3, 4], values 0..12
    /// a.at(&indices![1])?;                     // [4, 5, 6, 7]
    /// a.at(&indices![0..2, ArrayIndex::NewAxis])?;  // shape [2, 1, 4]
    /// a.at(&indices![-1])?;                    // [8, 9, 10, 11]
    /// ```
    pub fn at(&self, indices: &[ArrayIndex]) -> Result<Self> {
        let layout = self.layout().at(indices)?;
        let out = self.view_with_layout(layout);
        if !self.is_backprop_required() {
            return Ok(out);
        }

        let indices = indices.to_vec();
        let a_shape = self.shape().clone();
        let a_dtype = self.dtype();
        let mut bb = BackwardBuilder::new("get_item", out);
        bb.define(self, move |ctx| {
            let gout = ctx.output_grad();
            let zeros = Self::zeros(a_shape.clone(), a_dtype, gout.device())?;
            ctx.set_input_grad(zeros.add_at(&indices, gout)?)
        });
        Ok(bb.build())
    }

    /// A copy of this array with `b` added into the view selected by
    /// `indices`. Neither input is modified.
    ///
    /// `b` must have exactly the view's shape; nothing is broadcast.
    pub fn add_at(&self, indices: &[ArrayIndex], b: &Self) -> Result<Self> {
        if self.dtype() != b.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: b.dtype(),
            });
        }
        let view = self.layout().at(indices)?;
        if view.shape() != b.shape() {
            return Err(Error::ShapeMismatch {
                expected: view.shape().clone(),
                got: b.shape().clone(),
            });
        }

        let out = self.copy()?;
        // Same selection, addressed in the copy's contiguous buffer.
        let out_view = out.layout().at(indices)?;
        out.add_assign_view(&out_view, b)?;

        let a_req = self.is_backprop_required();
        let b_req = b.is_backprop_required();
        if !a_req && !b_req {
            return Ok(out);
        }

        let mut bb = BackwardBuilder::new("add_at", out);
        if a_req {
            bb.define(self, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
        }
        if b_req {
            let indices = indices.to_vec();
            bb.define(b, move |ctx| {
                let gout = ctx.output_grad();
                ctx.set_input_grad(gout.at(&indices)?)
            });
        }
        Ok(bb.build())
    }

    /// Gather along `axis` (negative counts from the end).
    ///
    /// `indices` must be [`DType::I64`]. The result has shape
    /// `a.shape[..axis] ++ indices.shape ++ a.shape[axis+1..]`. Index
    /// values are not validated here; the backend decides how to treat
    /// values outside the axis.
    ///
    /// ```ignore
    /// // a: shape [3, 4]
    /// let idx = CpuArray::from_f64_slice(&[2., 0.], 2, DType::I64, &dev)?;
    /// a.take(&idx, 1)?;   // shape [3, 2]: columns 2 and 0
    /// ```
    pub fn take(&self, indices: &Self, axis: i64) -> Result<Self> {
        check_index_dtype(indices.dtype())?;
        let axis = normalize_axis(axis, self.rank())?;
        let out_shape = gathered_shape(self.shape(), indices.shape(), axis);

        let storage = {
            let a_s = self.read_storage()?;
            let idx_s = indices.read_storage()?;
            B::take(&a_s, self.layout(), &idx_s, indices.layout(), axis)?
        };
        let out = Self::from_storage(
            storage,
            Layout::contiguous(out_shape),
            self.dtype(),
            self.device().clone(),
        );
        if !self.is_backprop_required() {
            return Ok(out);
        }

        let indices = indices.detach();
        let a_shape = self.shape().clone();
        let mut bb = BackwardBuilder::new("take", out);
        bb.define(self, move |ctx| {
            let gout = ctx.output_grad();
            let zeros = Self::zeros(a_shape.clone(), gout.dtype(), gout.device())?;
            ctx.set_input_grad(zeros.add_at_axis(&indices, axis, gout)?)
        });
        Ok(bb.build())
    }

    /// A copy of this array with every element of `b` added at the position
    /// `indices` selects along `axis`. Repeated indices accumulate.
    ///
    /// Unlike `take`, `axis` is already normalized: it must lie in
    /// `[0, rank)` and negative axes are not accepted. Anything else is
    /// `AxisOutOfRange`.
    ///
    /// `b` must have shape `a.shape[..axis] ++ indices.shape ++
    /// a.shape[axis+1..]`, i.e. the shape `take` would produce.
    pub fn add_at_axis(&self, indices: &Self, axis: usize, b: &Self) -> Result<Self> {
        if axis >= self.rank() {
            return Err(Error::AxisOutOfRange {
                axis: axis as i64,
                rank: self.rank(),
            });
        }
        check_index_dtype(indices.dtype())?;
        if self.dtype() != b.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: b.dtype(),
            });
        }
        let expected_rank = indices.rank() + self.rank() - 1;
        if b.rank() != expected_rank {
            return Err(Error::RankMismatch {
                expected: expected_rank,
                got: b.rank(),
            });
        }
        let expected_shape = gathered_shape(self.shape(), indices.shape(), axis);
        if b.shape() != &expected_shape {
            return Err(Error::ShapeMismatch {
                expected: expected_shape,
                got: b.shape().clone(),
            });
        }

        let storage = {
            let a_s = self.read_storage()?;
            let idx_s = indices.read_storage()?;
            let b_s = b.read_storage()?;
            B::add_at(
                &a_s,
                self.layout(),
                &idx_s,
                indices.layout(),
                axis,
                &b_s,
                b.layout(),
            )?
        };
        let out = Self::from_storage(
            storage,
            Layout::contiguous(self.shape().clone()),
            self.dtype(),
            self.device().clone(),
        );

        let a_req = self.is_backprop_required();
        let b_req = b.is_backprop_required();
        if !a_req && !b_req {
            return Ok(out);
        }

        let mut bb = BackwardBuilder::new("add_at", out);
        if a_req {
            bb.define(self, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
        }
        if b_req {
            let indices = indices.detach();
            bb.define(b, move |ctx| {
                let gout = ctx.output_grad();
                ctx.set_input_grad(gout.take(&indices, axis as i64)?)
            });
        }
        Ok(bb.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gathered_shape() {
        let a = Shape::from((3, 4, 5));
        let idx = Shape::from((2, 6));
        assert_eq!(gathered_shape(&a, &idx, 0).dims(), &[2, 6, 4, 5]);
        assert_eq!(gathered_shape(&a, &idx, 1).dims(), &[3, 2, 6, 5]);
        assert_eq!(gathered_shape(&a, &idx, 2).dims(), &[3, 4, 2, 6]);
    }

    #[test]
    fn test_gathered_shape_scalar_indices() {
        let a = Shape::from((3, 4));
        assert_eq!(gathered_shape(&a, &Shape::from(()), 0).dims(), &[4]);
    }

    #[test]
    fn test_index_dtype_message() {
        let err = check_index_dtype(DType::F32).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only i64 is supported as indices, but given f32"
        );
        assert!(check_index_dtype(DType::I64).is_ok());
    }
}
