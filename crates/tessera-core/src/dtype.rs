use std::fmt;

// DType — element types an Array can hold
//
// The dtype travels with every array and is checked at each operation
// boundary. Two rules matter for indexing:
//
//   - scatter-accumulate requires base and addend to share a dtype
//     (no implicit promotion)
//   - gather/scatter index arrays must be I64
//
// Floating types carry gradients; integer types are used for indices,
// labels and masks.

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    /// Short lowercase name, as used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// WithDType — bridge between Rust element types and DType
//
// Backends store typed buffers (Vec<f32>, Vec<i64>, ...) and run generic
// kernels over them. Arithmetic inside those kernels goes through f64 so
// one kernel body serves every dtype, including f16/bf16.

/// Trait implemented by Rust types that can be stored in an array.
pub trait WithDType: Copy + Send + Sync + 'static + fmt::Debug {
    /// Convert this value to f64.
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;
}

macro_rules! with_dtype_primitive {
    ($ty:ty) => {
        impl WithDType for $ty {
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
        }
    };
}

with_dtype_primitive!(f32);
with_dtype_primitive!(f64);
with_dtype_primitive!(u8);
with_dtype_primitive!(u32);
with_dtype_primitive!(i64);

impl WithDType for half::f16 {
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DType::I64.to_string(), "i64");
        assert_eq!(format!("{}", DType::BF16), "bf16");
    }

    #[test]
    fn test_with_dtype_conversions() {
        assert_eq!(i64::from_f64(-3.0), -3);
        assert_eq!(<u8 as WithDType>::from_f64(300.0), 255);
        assert_eq!(<half::bf16 as WithDType>::to_f64(half::bf16::from_f64(0.5)), 0.5);
    }
}
