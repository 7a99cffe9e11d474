//! # tessera-core
//!
//! Core array primitives, indexing, backend traits, and autograd for Tessera.
//!
//! This crate provides:
//! - [`Array`] — n-dimensional array handle with automatic differentiation
//! - [`ArrayIndex`] / [`Slice`] — per-axis index expressions (`indices![..]`)
//! - [`Layout`] — shape, signed strides and offset; computes zero-copy views
//! - [`Array::at`], [`Array::take`], [`Array::add_at`], [`Array::add_at_axis`]
//!   — strided views, gather, and their scatter-accumulate adjoints
//! - [`Backend`] trait — abstraction over compute backends
//! - [`BackwardBuilder`] — registers per-input gradient closures
//! - [`GradStore`] — gradient storage returned by `backward()`
// - DType: supported numeric types (f32, f64, i64, ...)
// - Shape / Layout: logical shape and its mapping onto a flat buffer
// - Backend trait: allocation + kernels (strided copy, gather, scatter-add)
// - Array: the differentiable array handle; indexing ops live in indexing.rs
// - BackwardBuilder / backprop: closure-based reverse-mode autodiff

pub mod array;
pub mod backend;
pub mod backprop;
pub mod backward;
pub mod dtype;
pub mod error;
pub mod grad_mode;
pub mod index;
mod indexing;
pub mod layout;
pub mod shape;
pub mod slice;

pub use array::{Array, ArrayId};
pub use backend::{Backend, BackendDevice, BackendStorage, BinaryOp};
pub use backprop::GradStore;
pub use backward::{BackwardBuilder, BackwardContext, BackwardFn, BackwardNode};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use grad_mode::{is_grad_enabled, no_grad, NoGradGuard};
pub use index::ArrayIndex;
pub use layout::{Layout, StridedIter};
pub use shape::{normalize_axis, Shape};
pub use slice::Slice;
