use std::fmt;

use crate::dtype::DType;
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;

// Backend — the device collaborator behind every Array
//
// The core never touches element data directly. Everything that reads or
// writes a buffer goes through this trait: allocation, strided copies,
// elementwise arithmetic, and the two indexing kernels (`take` gather and
// `add_at` scatter-accumulate). Layout geometry, dtype/shape validation
// and gradient wiring stay in the core.
//
// Kernels receive storage + layout pairs, so they can read arbitrary
// strided views (including negative and zero strides) without the caller
// making them contiguous first. Every kernel except `add_assign` returns
// freshly allocated contiguous storage.

/// Identifies a compute device (e.g., "cpu").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A storage buffer holding array data on a specific device.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements that fit in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
        }
    }
}

/// The main Backend trait. Implementing it for a struct (e.g. `CpuBackend`)
/// makes that struct a complete compute backend for tessera.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    type Device: BackendDevice;
    type Storage: BackendStorage;

    //  Creation

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage whose contents will be fully overwritten.
    ///
    /// Backends without a cheaper uninitialized allocation fall back to zeros.
    fn empty(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage> {
        Self::zeros(shape, dtype, device)
    }

    /// Allocate storage filled with a constant value.
    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Random uniform values in [0, 1).
    fn rand_uniform(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Random normal values (mean 0, std 1).
    fn rand_normal(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Data movement

    /// Copy the elements addressed by `layout` into new contiguous storage.
    fn to_contiguous(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// Copy the elements addressed by `layout` to the host, in logical order.
    fn to_f64_vec(input: &Self::Storage, layout: &Layout) -> Result<Vec<f64>>;

    //  Arithmetic

    /// `result[i] = op(lhs[i], rhs[i])` for two layouts of identical shape.
    fn binary_op(
        op: BinaryOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    /// In place: `dst[view] += src` where `dst_layout` is a (possibly
    /// strided) view into `dst`. Shapes are identical; dtypes must match.
    fn add_assign(
        dst: &mut Self::Storage,
        dst_layout: &Layout,
        src: &Self::Storage,
        src_layout: &Layout,
    ) -> Result<()>;

    /// Sum of all addressed elements as a one-element storage.
    fn sum_all(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    //  Indexing

    /// Gather along `axis`:
    ///
    /// `out[p.., q.., r..] = input[p.., indices[q..], r..]`
    ///
    /// Output shape is `input[..axis] ++ indices.shape ++ input[axis+1..]`.
    /// `indices` holds i64. The backend decides what happens to index values
    /// outside the axis.
    fn take(
        input: &Self::Storage,
        input_layout: &Layout,
        indices: &Self::Storage,
        indices_layout: &Layout,
        axis: usize,
    ) -> Result<Self::Storage>;

    /// Scatter-accumulate along `axis`, the adjoint of [`Backend::take`]:
    ///
    /// `out = a; out[p.., indices[q..], r..] += b[p.., q.., r..]`
    ///
    /// Repeated index values accumulate. The result has `a`'s shape.
    fn add_at(
        a: &Self::Storage,
        a_layout: &Layout,
        indices: &Self::Storage,
        indices_layout: &Layout,
        axis: usize,
        b: &Self::Storage,
        b_layout: &Layout,
    ) -> Result<Self::Storage>;
}
