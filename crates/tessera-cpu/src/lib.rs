// CPU Backend — reference host implementation of the tessera Backend trait
//
// ARCHITECTURE:
// - CpuDevice is a unit struct; there is only one host
// - CpuStorage is an enum over Vec<T> for each supported dtype
// - Kernels (kernels.rs) are generic over T: WithDType and read every input
//   through its Layout, so views never need to be materialized first
// - Random numbers come from rand's thread-local generator
//
// INDEX POLICY: `take` and `add_at` wrap index values modulo the axis
// length (-1 is the last element, len is the first again). Indexing an
// empty axis is an IndexOutOfBounds error.
//
// USAGE:
//   let dev = CpuDevice;
//   let a = CpuArray::zeros((3, 4), DType::F32, &dev)?;

mod kernels;

use half::{bf16, f16};
use rand::Rng;
use rand_distr::StandardNormal;

use tessera_core::array::Array;
use tessera_core::backend::{Backend, BackendDevice, BackendStorage, BinaryOp};
use tessera_core::dtype::{DType, WithDType};
use tessera_core::error::{Error, Result};
use tessera_core::layout::Layout;
use tessera_core::shape::Shape;

// CpuDevice

/// The host CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

// CpuStorage

/// Host buffer, one variant per dtype.
#[derive(Debug, Clone)]
pub enum CpuStorage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I64(Vec<i64>),
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::U32(_) => DType::U32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F16(v) => v.len(),
            CpuStorage::BF16(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::U32(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
        }
    }
}

/// Apply `$body` to the typed Vec inside a storage, rewrapping the result in
/// the same variant.
macro_rules! map_storage {
    ($s:expr, $v:ident => $body:expr) => {
        match $s {
            CpuStorage::F16($v) => CpuStorage::F16($body),
            CpuStorage::BF16($v) => CpuStorage::BF16($body),
            CpuStorage::F32($v) => CpuStorage::F32($body),
            CpuStorage::F64($v) => CpuStorage::F64($body),
            CpuStorage::U8($v) => CpuStorage::U8($body),
            CpuStorage::U32($v) => CpuStorage::U32($body),
            CpuStorage::I64($v) => CpuStorage::I64($body),
        }
    };
}

/// Apply `$body` to the typed Vec inside a storage.
macro_rules! with_storage {
    ($s:expr, $v:ident => $body:expr) => {
        match $s {
            CpuStorage::F16($v) => $body,
            CpuStorage::BF16($v) => $body,
            CpuStorage::F32($v) => $body,
            CpuStorage::F64($v) => $body,
            CpuStorage::U8($v) => $body,
            CpuStorage::U32($v) => $body,
            CpuStorage::I64($v) => $body,
        }
    };
}

/// Match two storages of the same dtype and rewrap `$body` in that variant.
/// Mismatched dtypes return `DTypeMismatch` from the enclosing function.
macro_rules! zip_storage {
    ($lhs:expr, $rhs:expr, ($l:ident, $r:ident) => $body:expr) => {
        match ($lhs, $rhs) {
            (CpuStorage::F16($l), CpuStorage::F16($r)) => CpuStorage::F16($body),
            (CpuStorage::BF16($l), CpuStorage::BF16($r)) => CpuStorage::BF16($body),
            (CpuStorage::F32($l), CpuStorage::F32($r)) => CpuStorage::F32($body),
            (CpuStorage::F64($l), CpuStorage::F64($r)) => CpuStorage::F64($body),
            (CpuStorage::U8($l), CpuStorage::U8($r)) => CpuStorage::U8($body),
            (CpuStorage::U32($l), CpuStorage::U32($r)) => CpuStorage::U32($body),
            (CpuStorage::I64($l), CpuStorage::I64($r)) => CpuStorage::I64($body),
            (lhs, rhs) => {
                return Err(Error::DTypeMismatch {
                    expected: lhs.dtype(),
                    got: rhs.dtype(),
                })
            }
        }
    };
}

fn convert<T: WithDType>(data: &[f64]) -> Vec<T> {
    data.iter().map(|&v| T::from_f64(v)).collect()
}

fn storage_from_f64(data: &[f64], dtype: DType) -> CpuStorage {
    match dtype {
        DType::F16 => CpuStorage::F16(convert(data)),
        DType::BF16 => CpuStorage::BF16(convert(data)),
        DType::F32 => CpuStorage::F32(convert(data)),
        DType::F64 => CpuStorage::F64(convert(data)),
        DType::U8 => CpuStorage::U8(convert(data)),
        DType::U32 => CpuStorage::U32(convert(data)),
        DType::I64 => CpuStorage::I64(convert(data)),
    }
}

/// Index values of an i64 storage, in logical order.
fn index_values(indices: &CpuStorage, layout: &Layout) -> Result<Vec<i64>> {
    match indices {
        CpuStorage::I64(v) => Ok(kernels::strided_copy(v, layout)),
        other => Err(Error::UnsupportedIndexDType {
            expected: DType::I64,
            got: other.dtype(),
        }),
    }
}

// CpuBackend

/// The CPU compute backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// An array on the CPU.
pub type CpuArray = Array<CpuBackend>;

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn zeros(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        Self::full(shape, 0.0, dtype, device)
    }

    fn full(shape: &Shape, val: f64, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F16 => CpuStorage::F16(vec![f16::from_f64(val); n]),
            DType::BF16 => CpuStorage::BF16(vec![bf16::from_f64(val); n]),
            DType::F32 => CpuStorage::F32(vec![val as f32; n]),
            DType::F64 => CpuStorage::F64(vec![val; n]),
            DType::U8 => CpuStorage::U8(vec![val as u8; n]),
            DType::U32 => CpuStorage::U32(vec![val as u32; n]),
            DType::I64 => CpuStorage::I64(vec![val as i64; n]),
        })
    }

    fn from_f64_slice(data: &[f64], dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        Ok(storage_from_f64(data, dtype))
    }

    fn rand_uniform(shape: &Shape, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let mut rng = rand::thread_rng();
        let data: Vec<f64> = (0..shape.elem_count()).map(|_| rng.gen::<f64>()).collect();
        Ok(storage_from_f64(&data, dtype))
    }

    fn rand_normal(shape: &Shape, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let mut rng = rand::thread_rng();
        let data: Vec<f64> = (0..shape.elem_count())
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        Ok(storage_from_f64(&data, dtype))
    }

    fn to_contiguous(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        Ok(map_storage!(input, v => kernels::strided_copy(v, layout)))
    }

    fn to_f64_vec(input: &CpuStorage, layout: &Layout) -> Result<Vec<f64>> {
        Ok(with_storage!(input, v => layout
            .strided_indices()
            .map(|i| v[i].to_f64())
            .collect()))
    }

    fn binary_op(
        op: BinaryOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        if lhs_layout.shape() != rhs_layout.shape() {
            return Err(Error::ShapeMismatch {
                expected: lhs_layout.shape().clone(),
                got: rhs_layout.shape().clone(),
            });
        }
        Ok(zip_storage!(lhs, rhs, (l, r) => {
            kernels::binary_map(op, l, lhs_layout, r, rhs_layout)
        }))
    }

    fn add_assign(
        dst: &mut CpuStorage,
        dst_layout: &Layout,
        src: &CpuStorage,
        src_layout: &Layout,
    ) -> Result<()> {
        if dst_layout.shape() != src_layout.shape() {
            return Err(Error::ShapeMismatch {
                expected: dst_layout.shape().clone(),
                got: src_layout.shape().clone(),
            });
        }
        match (dst, src) {
            (CpuStorage::F16(d), CpuStorage::F16(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::BF16(d), CpuStorage::BF16(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::F32(d), CpuStorage::F32(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::F64(d), CpuStorage::F64(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::U8(d), CpuStorage::U8(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::U32(d), CpuStorage::U32(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (CpuStorage::I64(d), CpuStorage::I64(s)) => {
                kernels::add_assign_strided(d, dst_layout, s, src_layout)
            }
            (d, s) => {
                return Err(Error::DTypeMismatch {
                    expected: d.dtype(),
                    got: s.dtype(),
                })
            }
        }
        Ok(())
    }

    fn sum_all(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        Ok(map_storage!(input, v => kernels::sum_strided(v, layout)))
    }

    fn take(
        input: &CpuStorage,
        input_layout: &Layout,
        indices: &CpuStorage,
        indices_layout: &Layout,
        axis: usize,
    ) -> Result<CpuStorage> {
        let idx = index_values(indices, indices_layout)?;
        log::trace!(
            "cpu take: input {} axis {} with {} indices",
            input_layout.shape(),
            axis,
            idx.len()
        );
        Ok(map_storage!(input, v => kernels::take(v, input_layout, &idx, axis)?))
    }

    fn add_at(
        a: &CpuStorage,
        a_layout: &Layout,
        indices: &CpuStorage,
        indices_layout: &Layout,
        axis: usize,
        b: &CpuStorage,
        b_layout: &Layout,
    ) -> Result<CpuStorage> {
        let idx = index_values(indices, indices_layout)?;
        log::trace!(
            "cpu add_at: base {} axis {} with {} indices",
            a_layout.shape(),
            axis,
            idx.len()
        );
        Ok(zip_storage!(a, b, (av, bv) => {
            kernels::add_at(av, a_layout, &idx, axis, bv, b_layout)?
        }))
    }
}
