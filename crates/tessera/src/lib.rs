//! # Tessera
//!
//! Differentiable N-dimensional arrays with zero-copy indexing, axis gather
//! and scatter-accumulate.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! # fn main() -> tessera::Result<()> {
//! let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
//! let a = CpuArray::from_f64_slice(&data, (3, 4), DType::F64, &CpuDevice)?.set_variable();
//!
//! let row = a.at(&indices![1])?;
//! assert_eq!(row.to_f64_vec()?, vec![4.0, 5.0, 6.0, 7.0]);
//!
//! let grads = row.sum_all()?.backward()?;
//! let ga = grads.get(&a).unwrap().to_f64_vec()?;
//! assert_eq!(&ga[4..8], &[1.0, 1.0, 1.0, 1.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `tessera-core` | Array, Shape, Layout, DType, index expressions, Backend trait, Autograd |
//! | `tessera-cpu` | CPU backend (strided copy, gather, scatter-add) |

/// Re-export core types.
pub use tessera_core::{
    backend::{Backend, BackendDevice, BackendStorage, BinaryOp},
    indices, is_grad_enabled, no_grad, normalize_axis, Array, ArrayId, ArrayIndex,
    BackwardBuilder, BackwardContext, BackwardFn, BackwardNode, DType, Error, GradStore, Layout,
    NoGradGuard, Result, Shape, Slice, WithDType,
};

/// Re-export CPU backend.
pub use tessera_cpu::{CpuArray, CpuBackend, CpuDevice, CpuStorage};

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::{
        indices, no_grad, Array, ArrayIndex, CpuArray, CpuBackend, CpuDevice, DType, GradStore,
        NoGradGuard, Shape, Slice,
    };
}
