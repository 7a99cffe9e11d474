use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{Backend, BinaryOp};
use crate::backward::{BackwardBuilder, BackwardNode};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::grad_mode::is_grad_enabled;
use crate::layout::Layout;
use crate::shape::Shape;

// Array — differentiable N-dimensional array handle
//
// MEMORY MODEL:
//
//   Array is a thin handle around Arc<ArrayInner>, so cloning is O(1).
//   The element buffer lives behind its own Arc<RwLock<Storage>>: a view
//   (see `at`) gets a fresh ArrayInner with a new Layout but the same
//   storage Arc. The buffer is freed when the last view referencing it is
//   dropped, regardless of which array created it.
//
// AUTOGRAD:
//
//   An array participates in gradient tracking if it is a variable (a leaf
//   marked with `set_variable`) or if it was produced by an op that
//   attached a BackwardNode. Ops consult `is_backprop_required()` before
//   registering closures; that also honours the thread-local grad mode.

/// Unique identifier for an array. Used as key in [`GradStore`](crate::GradStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayId(u64);

impl ArrayId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ArrayId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct ArrayInner<B: Backend> {
    id: ArrayId,
    storage: Arc<RwLock<B::Storage>>,
    layout: Layout,
    dtype: DType,
    device: B::Device,
    /// Set by BackwardBuilder::build on op outputs that need gradients.
    node: Option<Arc<BackwardNode<B>>>,
    is_variable: bool,
}

/// An N-dimensional array on a specific backend.
///
/// ```ignore
/// use tessera::prelude::*;
///
/// let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
/// let a = CpuArray::from_f64_slice(&data, (3, 4), DType::F32, &CpuDevice)?;
/// let row = a.at(&indices![1])?;          // view, shape [4]
/// let picked = a.take(&idx, 1)?;          // gather along axis 1
/// ```
pub struct Array<B: Backend> {
    inner: Arc<ArrayInner<B>>,
}

impl<B: Backend> Clone for Array<B> {
    fn clone(&self) -> Self {
        Array {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Array<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Array(id={:?}, shape={}, dtype={}, device={:?})",
            self.inner.id,
            self.inner.layout.shape(),
            self.inner.dtype,
            self.inner.device,
        )
    }
}

impl<B: Backend> Array<B> {
    // Internal constructors

    /// Wrap freshly produced storage.
    pub(crate) fn from_storage(
        storage: B::Storage,
        layout: Layout,
        dtype: DType,
        device: B::Device,
    ) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                id: ArrayId::new(),
                storage: Arc::new(RwLock::new(storage)),
                layout,
                dtype,
                device,
                node: None,
                is_variable: false,
            }),
        }
    }

    /// A new array sharing this array's storage under a different layout.
    pub(crate) fn view_with_layout(&self, layout: Layout) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                id: ArrayId::new(),
                storage: Arc::clone(&self.inner.storage),
                layout,
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                node: None,
                is_variable: false,
            }),
        }
    }

    /// Same array (id, storage, layout) with a backward node attached.
    pub(crate) fn with_backward_node(self, node: Arc<BackwardNode<B>>) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                id: self.inner.id,
                storage: Arc::clone(&self.inner.storage),
                layout: self.inner.layout.clone(),
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                node: Some(node),
                is_variable: self.inner.is_variable,
            }),
        }
    }

    // Accessors

    pub fn id(&self) -> ArrayId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn strides(&self) -> &[isize] {
        self.inner.layout.strides()
    }

    pub fn offset(&self) -> isize {
        self.inner.layout.offset()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    /// Shape + strides + offset.
    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether this array is a leaf marked for gradient tracking.
    pub fn is_variable(&self) -> bool {
        self.inner.is_variable
    }

    /// The backward node recorded by the op that produced this array.
    pub fn backward_node(&self) -> Option<&Arc<BackwardNode<B>>> {
        self.inner.node.as_ref()
    }

    /// Whether gradients can flow into this array.
    pub fn requires_grad(&self) -> bool {
        self.inner.is_variable || self.inner.node.is_some()
    }

    /// Whether an op consuming this array should register backward closures
    /// right now (tracked array and grad mode enabled).
    pub fn is_backprop_required(&self) -> bool {
        self.requires_grad() && is_grad_enabled()
    }

    /// Whether both arrays are views of the same buffer.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    pub(crate) fn read_storage(&self) -> Result<RwLockReadGuard<'_, B::Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, B::Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    // Creation

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// Array whose contents are unspecified until written.
    pub fn empty(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::empty(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        Self::full(shape, 1.0, dtype, device)
    }

    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// Create an array from row-major f64 values, converted to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                shape,
                got: data.len(),
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// `[0, 1, .., n-1]` as a 1-D array.
    pub fn arange(n: usize, dtype: DType, device: &B::Device) -> Result<Self> {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Self::from_f64_slice(&data, n, dtype, device)
    }

    /// Uniform random values in [0, 1).
    pub fn rand(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::rand_uniform(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// Standard normal random values.
    pub fn randn(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::rand_normal(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    /// Mark this array as a leaf that receives gradients.
    pub fn set_variable(self) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                id: self.inner.id,
                storage: Arc::clone(&self.inner.storage),
                layout: self.inner.layout.clone(),
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                node: self.inner.node.clone(),
                is_variable: true,
            }),
        }
    }

    /// Same data, no gradient tracking, fresh id.
    pub fn detach(&self) -> Self {
        self.view_with_layout(self.layout().clone())
    }

    // Copies

    /// Contiguous copy of the data, detached from the graph.
    pub fn copy(&self) -> Result<Self> {
        let storage = {
            let guard = self.read_storage()?;
            B::to_contiguous(&guard, self.layout())?
        };
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(self.shape().clone()),
            self.dtype(),
            self.device().clone(),
        ))
    }

    /// Contiguous version of this array. Gradients pass through unchanged.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let out = self.copy()?;
        if !self.is_backprop_required() {
            return Ok(out);
        }
        let mut bb = BackwardBuilder::new("contiguous", out);
        bb.define(self, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
        Ok(bb.build())
    }

    /// `self[view] += src` directly in this array's buffer.
    ///
    /// Only for buffers the caller has just allocated and not yet handed out.
    pub(crate) fn add_assign_view(&self, view: &Layout, src: &Self) -> Result<()> {
        if self.shares_storage(src) {
            let src = src.copy()?;
            return self.add_assign_view(view, &src);
        }
        let src_guard = src.read_storage()?;
        let mut dst_guard = self.write_storage()?;
        B::add_assign(&mut dst_guard, view, &src_guard, src.layout())
    }

    // Arithmetic

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Add)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Sub)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Mul)
    }

    /// Elementwise op over two arrays of identical shape and dtype.
    fn binary_op(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        if self.shape() != rhs.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: rhs.shape().clone(),
            });
        }
        let storage = {
            let lhs_s = self.read_storage()?;
            let rhs_s = rhs.read_storage()?;
            B::binary_op(op, &lhs_s, self.layout(), &rhs_s, rhs.layout())?
        };
        let out = Self::from_storage(
            storage,
            Layout::contiguous(self.shape().clone()),
            self.dtype(),
            self.device().clone(),
        );

        let lhs_req = self.is_backprop_required();
        let rhs_req = rhs.is_backprop_required();
        if !lhs_req && !rhs_req {
            return Ok(out);
        }

        let mut bb = BackwardBuilder::new(op.name(), out);
        match op {
            BinaryOp::Add => {
                if lhs_req {
                    bb.define(self, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
                }
                if rhs_req {
                    bb.define(rhs, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
                }
            }
            BinaryOp::Sub => {
                if lhs_req {
                    bb.define(self, |ctx| ctx.set_input_grad(ctx.output_grad().clone()));
                }
                if rhs_req {
                    bb.define(rhs, |ctx| {
                        let gout = ctx.output_grad();
                        ctx.set_input_grad(Self::zeros_like(gout)?.sub(gout)?)
                    });
                }
            }
            BinaryOp::Mul => {
                if lhs_req {
                    let rhs_val = rhs.detach();
                    bb.define(self, move |ctx| {
                        ctx.set_input_grad(ctx.output_grad().mul(&rhs_val)?)
                    });
                }
                if rhs_req {
                    let lhs_val = self.detach();
                    bb.define(rhs, move |ctx| {
                        ctx.set_input_grad(ctx.output_grad().mul(&lhs_val)?)
                    });
                }
            }
        }
        Ok(bb.build())
    }

    /// Sum of all elements as a 0-d array.
    pub fn sum_all(&self) -> Result<Self> {
        let storage = {
            let guard = self.read_storage()?;
            B::sum_all(&guard, self.layout())?
        };
        let out = Self::from_storage(
            storage,
            Layout::contiguous(Shape::from(())),
            self.dtype(),
            self.device().clone(),
        );
        if !self.is_backprop_required() {
            return Ok(out);
        }
        let a_shape = self.shape().clone();
        let mut bb = BackwardBuilder::new("sum", out);
        bb.define(self, move |ctx| {
            let gout = ctx.output_grad();
            let g = gout.to_scalar_f64()?;
            ctx.set_input_grad(Self::full(a_shape.clone(), g, gout.dtype(), gout.device())?)
        });
        Ok(bb.build())
    }

    // Data extraction

    /// All elements in logical row-major order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let guard = self.read_storage()?;
        B::to_f64_vec(&guard, self.layout())
    }

    /// The single value of a one-element array.
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }

    // Autograd

    /// Reverse-mode gradients of this single-element array.
    ///
    /// ```ignore
    /// let x = CpuArray::from_f64_slice(&[1., 2., 3.], 3, DType::F64, &dev)?.set_variable();
    /// let y = x.at(&indices![1..])?.sum_all()?;
    /// let grads = y.backward()?;
    /// // grads.get(&x) == [0, 1, 1]
    /// ```
    pub fn backward(&self) -> Result<crate::backprop::GradStore<B>> {
        crate::backprop::backward(self)
    }

    /// Reverse-mode gradients seeded with `grad` (same shape and dtype).
    pub fn backward_with_grad(&self, grad: &Self) -> Result<crate::backprop::GradStore<B>> {
        crate::backprop::backward_with_grad(self, grad)
    }
}
