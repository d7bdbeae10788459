//! Binding between Rust scalar types and [`DType`]s.

use crate::dtype::DType;
use num_complex::{Complex, Complex64};

/// A value in the widest representation of its kind.
///
/// Every cast goes through a `Scalar`, which keeps 64-bit integers exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
    Object(u64),
}

/// Opaque handle to a host object, stored as an 8-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ObjectRef(pub u64);

/// A Rust type that is the in-memory representation of a [`DType`].
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DType;

    fn to_scalar(self) -> Scalar;

    fn from_scalar(value: Scalar) -> Self;

    /// Read one native-order element from a possibly unaligned pointer.
    ///
    /// # Safety
    /// `ptr` must be valid for reading `DTYPE.itemsize()` bytes holding a
    /// valid bit pattern for `Self`.
    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        ptr.cast::<Self>().read_unaligned()
    }

    /// Write one native-order element to a possibly unaligned pointer.
    ///
    /// # Safety
    /// `ptr` must be valid for writing `DTYPE.itemsize()` bytes.
    #[inline]
    unsafe fn store(self, ptr: *mut u8) {
        ptr.cast::<Self>().write_unaligned(self)
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        match value {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::UInt(u) => u != 0,
            Scalar::Float(f) => f != 0.0,
            Scalar::Complex(c) => c.re != 0.0 || c.im != 0.0,
            Scalar::Object(o) => o != 0,
        }
    }

    // Any non-zero byte reads as true.
    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        ptr.read() != 0
    }

    #[inline]
    unsafe fn store(self, ptr: *mut u8) {
        ptr.write(self as u8)
    }
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:ident, $variant:ident, $wide:ty) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self as $wide)
            }

            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Bool(b) => b as $t,
                    Scalar::Int(i) => i as $t,
                    Scalar::UInt(u) => u as $t,
                    Scalar::Float(f) => f as $t,
                    Scalar::Complex(c) => c.re as $t,
                    Scalar::Object(o) => o as $t,
                }
            }
        }
    };
}

impl_int_element!(i8, Int8, Int, i64);
impl_int_element!(i16, Int16, Int, i64);
impl_int_element!(i32, Int32, Int, i64);
impl_int_element!(i64, Int64, Int, i64);
impl_int_element!(u8, UInt8, UInt, u64);
impl_int_element!(u16, UInt16, UInt, u64);
impl_int_element!(u32, UInt32, UInt, u64);
impl_int_element!(u64, UInt64, UInt, u64);

macro_rules! impl_float_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::Float(self as f64)
            }

            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Bool(b) => b as u8 as $t,
                    Scalar::Int(i) => i as $t,
                    Scalar::UInt(u) => u as $t,
                    Scalar::Float(f) => f as $t,
                    Scalar::Complex(c) => c.re as $t,
                    Scalar::Object(o) => o as $t,
                }
            }
        }
    };
}

impl_float_element!(f32, Float32);
impl_float_element!(f64, Float64);

macro_rules! impl_complex_element {
    ($t:ty, $dtype:ident) => {
        impl Element for Complex<$t> {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::Complex(Complex64::new(self.re as f64, self.im as f64))
            }

            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Complex(c) => Complex::new(c.re as $t, c.im as $t),
                    other => Complex::new(<$t>::from_scalar(other), 0.0),
                }
            }
        }
    };
}

impl_complex_element!(f32, Complex64);
impl_complex_element!(f64, Complex128);

impl Element for ObjectRef {
    const DTYPE: DType = DType::Object;

    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::Object(self.0)
    }

    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        match value {
            Scalar::Object(o) => ObjectRef(o),
            other => ObjectRef(u64::from_scalar(other)),
        }
    }
}

/// Run `$body` with `$T` bound to the Rust type of `$dtype`.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::dtype::DType::Bool => {
                type $T = bool;
                $body
            }
            $crate::dtype::DType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::dtype::DType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::dtype::DType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::dtype::DType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::dtype::DType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::dtype::DType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = ::num_complex::Complex32;
                $body
            }
            $crate::dtype::DType::Complex128 => {
                type $T = ::num_complex::Complex64;
                $body
            }
            $crate::dtype::DType::Object => {
                type $T = $crate::element::ObjectRef;
                $body
            }
        }
    };
}
pub(crate) use dispatch_dtype;

/// Native-order bytes of `value` converted to `dtype`.
pub(crate) fn scalar_bytes(value: Scalar, dtype: DType) -> Vec<u8> {
    let mut out = vec![0u8; dtype.itemsize()];
    dispatch_dtype!(dtype, T => unsafe { T::from_scalar(value).store(out.as_mut_ptr()) });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip_keeps_i64_exact() {
        let big = i64::MAX - 3;
        assert_eq!(i64::from_scalar(big.to_scalar()), big);
        assert_eq!(u64::from_scalar(u64::MAX.to_scalar()), u64::MAX);
    }

    #[test]
    fn test_bool_conversions() {
        assert!(bool::from_scalar(Scalar::Float(0.5)));
        assert!(!bool::from_scalar(Scalar::Int(0)));
        assert_eq!(f64::from_scalar(true.to_scalar()), 1.0);
    }

    #[test]
    fn test_complex_from_real() {
        let c = Complex64::from_scalar(Scalar::Int(3));
        assert_eq!(c, Complex64::new(3.0, 0.0));
        assert_eq!(f32::from_scalar(Complex64::new(2.5, 1.0).to_scalar()), 2.5);
    }

    #[test]
    fn test_scalar_bytes() {
        let bytes = scalar_bytes(Scalar::Int(1), DType::Float64);
        assert_eq!(bytes, 1.0f64.to_ne_bytes().to_vec());
    }
}
