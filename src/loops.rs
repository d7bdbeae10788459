//! Typed inner loops used by the built-in ufuncs.
//!
//! Every loop has the [`InnerLoop`](crate::InnerLoop) signature and can be
//! registered directly, e.g. `loops::add_float::<f64> as InnerLoop`.
//! Element-wise loops read `dims[0]` elements per argument at `steps[k]`
//! bytes apart; elements are loaded and stored one at a time, so an output
//! may alias an input shifted by one element (the accumulate pattern).
//!
//! Floating-point loops record division by zero, overflow, underflow and
//! invalid results in the calling thread's status register; integer
//! division by zero records [`FpeFlags::DIVIDE_BY_ZERO`].
//!
//! # Safety
//!
//! Callers must pass `nargs` pointers, each valid for `dimensions[0]`
//! elements of the loop's type at its step, plus core sizes and core steps
//! for the generalized loops.
#![allow(clippy::missing_safety_doc)]

use std::num::FpCategory;

use num_complex::Complex;
use num_traits::{Float, WrappingAdd, WrappingMul, WrappingNeg, WrappingSub, Zero};

use crate::element::Element;
use crate::fpe::{raise_fp_status, FpeFlags};
use crate::ufunc::LoopData;

// ============================================================================
// Drivers
// ============================================================================

#[inline(always)]
unsafe fn unary<A: Element, O: Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], mut f: impl FnMut(A) -> O) {
    let (mut a, mut o) = (args[0] as *const u8, args[1]);
    for _ in 0..dims[0] {
        f(A::load(a)).store(o);
        a = a.wrapping_offset(steps[0]);
        o = o.wrapping_offset(steps[1]);
    }
}

#[inline(always)]
unsafe fn binary<A: Element, B: Element, O: Element>(
    args: &[*mut u8],
    dims: &[usize],
    steps: &[isize],
    mut f: impl FnMut(A, B) -> O,
) {
    let (mut a, mut b, mut o) = (args[0] as *const u8, args[1] as *const u8, args[2]);
    for _ in 0..dims[0] {
        f(A::load(a), B::load(b)).store(o);
        a = a.wrapping_offset(steps[0]);
        b = b.wrapping_offset(steps[1]);
        o = o.wrapping_offset(steps[2]);
    }
}

#[inline]
fn raise(flags: FpeFlags) {
    if !flags.is_empty() {
        raise_fp_status(flags);
    }
}

/// Conditions produced by computing `r` from `a` and `b`.
#[inline]
fn arith_flags<T: Float>(a: T, b: T, r: T) -> FpeFlags {
    if r.is_nan() {
        if a.is_nan() || b.is_nan() {
            FpeFlags::NONE
        } else {
            FpeFlags::INVALID
        }
    } else if r.is_infinite() {
        if a.is_finite() && b.is_finite() {
            FpeFlags::OVERFLOW
        } else {
            FpeFlags::NONE
        }
    } else if r.classify() == FpCategory::Subnormal {
        FpeFlags::UNDERFLOW
    } else {
        FpeFlags::NONE
    }
}

#[inline]
fn finite_nonzero<T: Float>(x: T) -> bool {
    x.is_finite() && !x.is_zero()
}

/// Products of finite nonzero factors that round to zero underflow.
#[inline]
fn mul_flags<T: Float>(a: T, b: T, r: T) -> FpeFlags {
    if r.is_zero() && finite_nonzero(a) && finite_nonzero(b) {
        FpeFlags::UNDERFLOW
    } else {
        arith_flags(a, b, r)
    }
}

#[inline]
fn div_flags<T: Float>(a: T, b: T, r: T) -> FpeFlags {
    if b.is_zero() && a.is_finite() && !a.is_zero() {
        FpeFlags::DIVIDE_BY_ZERO
    } else if r.is_zero() && finite_nonzero(a) && b.is_finite() {
        FpeFlags::UNDERFLOW
    } else {
        arith_flags(a, b, r)
    }
}

/// Conditions of a complex result, judged per component.
#[inline]
fn complex_flags<T: Float>(a: Complex<T>, b: Complex<T>, r: Complex<T>) -> FpeFlags {
    let nan_in = a.re.is_nan() || a.im.is_nan() || b.re.is_nan() || b.im.is_nan();
    let finite_in = a.re.is_finite() && a.im.is_finite() && b.re.is_finite() && b.im.is_finite();
    let mut flags = FpeFlags::NONE;
    for part in [r.re, r.im] {
        if part.is_nan() {
            if !nan_in {
                flags |= FpeFlags::INVALID;
            }
        } else if part.is_infinite() {
            if finite_in {
                flags |= FpeFlags::OVERFLOW;
            }
        } else if part.classify() == FpCategory::Subnormal {
            flags |= FpeFlags::UNDERFLOW;
        }
    }
    flags
}

// ============================================================================
// Element capabilities
// ============================================================================

/// Truth value used by the logical loops.
pub trait Truthy: Element {
    fn truthy(self) -> bool;
}

impl Truthy for bool {
    #[inline]
    fn truthy(self) -> bool {
        self
    }
}

macro_rules! impl_truthy {
    ($($t:ty),*) => {$(
        impl Truthy for $t {
            #[inline]
            fn truthy(self) -> bool {
                !self.is_zero()
            }
        }
    )*};
}
impl_truthy!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, Complex<f32>, Complex<f64>);

/// Integer floor division. Returns the quotient and the conditions raised.
pub trait FloorDiv: Element {
    fn floor_div(self, rhs: Self) -> (Self, FpeFlags);
}

macro_rules! impl_floor_div_signed {
    ($($t:ty),*) => {$(
        impl FloorDiv for $t {
            #[inline]
            fn floor_div(self, rhs: Self) -> (Self, FpeFlags) {
                if rhs == 0 {
                    return (0, FpeFlags::DIVIDE_BY_ZERO);
                }
                match self.checked_div(rhs) {
                    None => (self.wrapping_div(rhs), FpeFlags::OVERFLOW),
                    Some(q) if self % rhs != 0 && ((self < 0) != (rhs < 0)) => (q - 1, FpeFlags::NONE),
                    Some(q) => (q, FpeFlags::NONE),
                }
            }
        }
    )*};
}
impl_floor_div_signed!(i8, i16, i32, i64);

macro_rules! impl_floor_div_unsigned {
    ($($t:ty),*) => {$(
        impl FloorDiv for $t {
            #[inline]
            fn floor_div(self, rhs: Self) -> (Self, FpeFlags) {
                match self.checked_div(rhs) {
                    Some(q) => (q, FpeFlags::NONE),
                    None => (0, FpeFlags::DIVIDE_BY_ZERO),
                }
            }
        }
    )*};
}
impl_floor_div_unsigned!(u8, u16, u32, u64);

/// Magnitude; complex values map to their component type.
pub trait Absolute: Element {
    type Output: Element;
    fn absolute(self) -> Self::Output;
}

macro_rules! impl_absolute {
    ($($t:ty => |$v:ident| $body:expr),* $(,)?) => {$(
        impl Absolute for $t {
            type Output = $t;
            #[inline]
            fn absolute(self) -> $t {
                let $v = self;
                $body
            }
        }
    )*};
}
impl_absolute!(
    i8 => |v| v.wrapping_abs(),
    i16 => |v| v.wrapping_abs(),
    i32 => |v| v.wrapping_abs(),
    i64 => |v| v.wrapping_abs(),
    u8 => |v| v,
    u16 => |v| v,
    u32 => |v| v,
    u64 => |v| v,
    f32 => |v| v.abs(),
    f64 => |v| v.abs(),
);

impl<T> Absolute for Complex<T>
where
    T: Float + Element,
    Complex<T>: Element,
{
    type Output = T;
    #[inline]
    fn absolute(self) -> T {
        self.norm()
    }
}

/// Multiply-accumulate used by the generalized loops.
pub trait DotElement: Element {
    fn dot_zero() -> Self;
    fn dot_acc(self, a: Self, b: Self) -> Self;
}

impl DotElement for i64 {
    #[inline]
    fn dot_zero() -> Self {
        0
    }
    #[inline]
    fn dot_acc(self, a: Self, b: Self) -> Self {
        self.wrapping_add(a.wrapping_mul(b))
    }
}

macro_rules! impl_dot_float {
    ($($t:ty),*) => {$(
        impl DotElement for $t {
            #[inline]
            fn dot_zero() -> Self {
                0.0
            }
            #[inline]
            fn dot_acc(self, a: Self, b: Self) -> Self {
                self + a * b
            }
        }
    )*};
}
impl_dot_float!(f32, f64);

// ============================================================================
// Arithmetic
// ============================================================================

macro_rules! int_binary {
    ($(#[$m:meta])* $name:ident, $bound:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$m])*
        pub unsafe fn $name<T: $bound + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
            binary(args, dims, steps, |$a: T, $b: T| $body)
        }
    };
}

int_binary!(
    /// Wrapping integer addition.
    add_int, WrappingAdd, |a, b| a.wrapping_add(&b)
);
int_binary!(
    /// Wrapping integer subtraction.
    subtract_int, WrappingSub, |a, b| a.wrapping_sub(&b)
);
int_binary!(
    /// Wrapping integer multiplication.
    multiply_int, WrappingMul, |a, b| a.wrapping_mul(&b)
);

macro_rules! float_binary {
    ($(#[$m:meta])* $name:ident, $check:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$m])*
        pub unsafe fn $name<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
            let mut flags = FpeFlags::NONE;
            binary(args, dims, steps, |$a: T, $b: T| {
                let r = $body;
                flags |= $check($a, $b, r);
                r
            });
            raise(flags);
        }
    };
}

float_binary!(add_float, arith_flags, |a, b| a + b);
float_binary!(subtract_float, arith_flags, |a, b| a - b);
float_binary!(multiply_float, mul_flags, |a, b| a * b);
float_binary!(
    /// True division.
    divide_float, div_flags, |a, b| a / b
);
/// `floor(a / b)`; conditions are those of the quotient.
pub unsafe fn floor_divide_float<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    let mut flags = FpeFlags::NONE;
    binary(args, dims, steps, |a: T, b: T| {
        let q = a / b;
        flags |= div_flags(a, b, q);
        q.floor()
    });
    raise(flags);
}

macro_rules! complex_binary {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        pub unsafe fn $name<T>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData)
        where
            T: Float,
            Complex<T>: Element,
        {
            let mut flags = FpeFlags::NONE;
            binary(args, dims, steps, |$a: Complex<T>, $b: Complex<T>| {
                let r = $body;
                flags |= complex_flags($a, $b, r);
                r
            });
            raise(flags);
        }
    };
}

complex_binary!(add_complex, |a, b| a + b);
complex_binary!(subtract_complex, |a, b| a - b);
complex_binary!(multiply_complex, |a, b| a * b);

/// Complex true division; a zero divisor records division by zero.
pub unsafe fn divide_complex<T>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData)
where
    T: Float,
    Complex<T>: Element,
{
    let mut flags = FpeFlags::NONE;
    binary(args, dims, steps, |a: Complex<T>, b: Complex<T>| {
        let r = a / b;
        if b.is_zero() {
            flags |= if a.is_zero() {
                FpeFlags::INVALID
            } else {
                FpeFlags::DIVIDE_BY_ZERO
            };
        } else {
            flags |= complex_flags(a, b, r);
        }
        r
    });
    raise(flags);
}

/// Floor division for integers; a zero divisor yields 0.
pub unsafe fn floor_divide_int<T: FloorDiv>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    let mut flags = FpeFlags::NONE;
    binary(args, dims, steps, |a: T, b: T| {
        let (q, f) = a.floor_div(b);
        flags |= f;
        q
    });
    raise(flags);
}

pub unsafe fn maximum_int<T: Ord + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| a.max(b))
}

pub unsafe fn minimum_int<T: Ord + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| a.min(b))
}

/// Maximum that propagates NaN from either side.
pub unsafe fn maximum_float<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| if a.is_nan() || a >= b { a } else { b })
}

/// Minimum that propagates NaN from either side.
pub unsafe fn minimum_float<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| if a.is_nan() || a <= b { a } else { b })
}

// ============================================================================
// Comparison and logic
// ============================================================================

macro_rules! compare {
    ($name:ident, $bound:ident, $op:tt) => {
        pub unsafe fn $name<T: $bound + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
            binary(args, dims, steps, |a: T, b: T| a $op b)
        }
    };
}

compare!(equal, PartialEq, ==);
compare!(not_equal, PartialEq, !=);
compare!(less, PartialOrd, <);
compare!(less_equal, PartialOrd, <=);
compare!(greater, PartialOrd, >);
compare!(greater_equal, PartialOrd, >=);

pub unsafe fn logical_and<T: Truthy>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| a.truthy() && b.truthy())
}

pub unsafe fn logical_or<T: Truthy>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    binary(args, dims, steps, |a: T, b: T| a.truthy() || b.truthy())
}

// ============================================================================
// Unary
// ============================================================================

pub unsafe fn negative_int<T: WrappingNeg + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    unary(args, dims, steps, |a: T| a.wrapping_neg())
}

pub unsafe fn negative_float<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    unary(args, dims, steps, |a: T| -a)
}

pub unsafe fn negative_complex<T>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData)
where
    T: Float,
    Complex<T>: Element,
{
    unary(args, dims, steps, |a: Complex<T>| -a)
}

pub unsafe fn absolute<T: Absolute>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    unary(args, dims, steps, |a: T| a.absolute())
}

/// Square root; negative inputs record an invalid result.
pub unsafe fn sqrt_float<T: Float + Element>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    let mut flags = FpeFlags::NONE;
    unary(args, dims, steps, |a: T| {
        let r = a.sqrt();
        if r.is_nan() && !a.is_nan() {
            flags |= FpeFlags::INVALID;
        }
        r
    });
    raise(flags);
}

pub unsafe fn sqrt_complex<T>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData)
where
    T: Float,
    Complex<T>: Element,
{
    let mut flags = FpeFlags::NONE;
    unary(args, dims, steps, |a: Complex<T>| {
        let r = a.sqrt();
        flags |= complex_flags(a, a, r);
        r
    });
    raise(flags);
}

// ============================================================================
// Generalized
// ============================================================================

/// `(i),(i)->()`: dimensions `[n, i]`, steps `[s0, s1, s2, a_i, b_i]`.
pub unsafe fn inner1d<T: DotElement>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    let (n, len) = (dims[0], dims[1]);
    let (ai, bi) = (steps[3], steps[4]);
    for k in 0..n as isize {
        let a = args[0].wrapping_offset(k * steps[0]) as *const u8;
        let b = args[1].wrapping_offset(k * steps[1]) as *const u8;
        let mut acc = T::dot_zero();
        for i in 0..len as isize {
            acc = acc.dot_acc(T::load(a.wrapping_offset(i * ai)), T::load(b.wrapping_offset(i * bi)));
        }
        acc.store(args[2].wrapping_offset(k * steps[2]));
    }
}

/// `(m,n),(n,p)->(m,p)`: dimensions `[count, m, n, p]`, steps
/// `[s0, s1, s2, a_m, a_n, b_n, b_p, o_m, o_p]`.
pub unsafe fn matmul<T: DotElement>(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
    let (count, m, n, p) = (dims[0], dims[1] as isize, dims[2] as isize, dims[3] as isize);
    let (am, an, bn, bp, om, op) = (steps[3], steps[4], steps[5], steps[6], steps[7], steps[8]);
    for k in 0..count as isize {
        let a = args[0].wrapping_offset(k * steps[0]) as *const u8;
        let b = args[1].wrapping_offset(k * steps[1]) as *const u8;
        let o = args[2].wrapping_offset(k * steps[2]);
        for i in 0..m {
            for j in 0..p {
                let mut acc = T::dot_zero();
                for l in 0..n {
                    let x = T::load(a.wrapping_offset(i * am + l * an));
                    let y = T::load(b.wrapping_offset(l * bn + j * bp));
                    acc = acc.dot_acc(x, y);
                }
                acc.store(o.wrapping_offset(i * om + j * op));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fpe::get_fp_error_status;
    use crate::ufunc::InnerLoop;
    use approx::assert_relative_eq;

    fn run_binary<A: Element, B: Element, O: Element + Default>(f: InnerLoop, a: &[A], b: &[B]) -> Vec<O> {
        let mut out = vec![O::default(); a.len()];
        let args = [
            a.as_ptr() as *mut u8,
            b.as_ptr() as *mut u8,
            out.as_mut_ptr() as *mut u8,
        ];
        let steps = [
            std::mem::size_of::<A>() as isize,
            std::mem::size_of::<B>() as isize,
            std::mem::size_of::<O>() as isize,
        ];
        unsafe { f(&args, &[a.len()], &steps, &LoopData::none()) };
        out
    }

    #[test]
    fn test_int_add_wraps() {
        let out: Vec<i8> = run_binary(add_int::<i8>, &[127i8, 1], &[1i8, 2]);
        assert_eq!(out, vec![-128, 3]);
    }

    #[test]
    fn test_float_divide_flags() {
        get_fp_error_status();
        let out: Vec<f64> = run_binary(divide_float::<f64>, &[1.0f64, 0.0, 6.0], &[0.0f64, 0.0, 3.0]);
        assert!(out[0].is_infinite());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        let status = get_fp_error_status();
        assert!(status.contains(FpeFlags::DIVIDE_BY_ZERO));
        assert!(status.contains(FpeFlags::INVALID));
        assert!(get_fp_error_status().is_empty());
    }

    #[test]
    fn test_float_overflow_and_underflow() {
        get_fp_error_status();
        let _: Vec<f64> = run_binary(multiply_float::<f64>, &[1e300f64], &[1e300f64]);
        assert_eq!(get_fp_error_status(), FpeFlags::OVERFLOW);
        let _: Vec<f64> = run_binary(multiply_float::<f64>, &[1e-300f64], &[1e-10f64]);
        assert_eq!(get_fp_error_status(), FpeFlags::UNDERFLOW);
    }

    #[test]
    fn test_results_rounding_to_zero_underflow() {
        get_fp_error_status();
        let out: Vec<f64> = run_binary(multiply_float::<f64>, &[1e-300f64, 0.0], &[1e-300f64, 5.0]);
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(get_fp_error_status(), FpeFlags::UNDERFLOW);
        let _: Vec<f64> = run_binary(divide_float::<f64>, &[1e-300f64], &[1e300f64]);
        assert_eq!(get_fp_error_status(), FpeFlags::UNDERFLOW);
        let _: Vec<f64> = run_binary(divide_float::<f64>, &[1.0f64, 0.0], &[f64::INFINITY, 2.0]);
        assert!(get_fp_error_status().is_empty());
    }

    #[test]
    fn test_complex_loops_record_conditions() {
        get_fp_error_status();
        let a = [Complex::new(1e308f64, 0.0)];
        let b = [Complex::new(10.0f64, 0.0)];
        let out: Vec<Complex<f64>> = run_binary(multiply_complex::<f64>, &a, &b);
        assert!(out[0].re.is_infinite());
        assert!(get_fp_error_status().contains(FpeFlags::OVERFLOW));

        let a = [Complex::new(f64::MAX, 1.0)];
        let _: Vec<Complex<f64>> = run_binary(add_complex::<f64>, &a, &a);
        assert_eq!(get_fp_error_status(), FpeFlags::OVERFLOW);

        let a = [Complex::new(1.0f64, 2.0)];
        let b = [Complex::new(3.0f64, -1.0)];
        let _: Vec<Complex<f64>> = run_binary(subtract_complex::<f64>, &a, &b);
        assert!(get_fp_error_status().is_empty());
    }

    #[test]
    fn test_integer_floor_divide() {
        get_fp_error_status();
        let out: Vec<i32> = run_binary(floor_divide_int::<i32>, &[7i32, -7, 7, 5], &[2i32, 2, -2, 0]);
        assert_eq!(out, vec![3, -4, -4, 0]);
        assert_eq!(get_fp_error_status(), FpeFlags::DIVIDE_BY_ZERO);
    }

    #[test]
    fn test_maximum_propagates_nan() {
        let out: Vec<f64> = run_binary(maximum_float::<f64>, &[1.0f64, f64::NAN, 3.0], &[2.0f64, 0.0, f64::NAN]);
        assert_eq!(out[0], 2.0);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
    }

    #[test]
    fn test_comparison_and_logic() {
        let out: Vec<bool> = run_binary(less::<i64>, &[1i64, 5], &[2i64, 5]);
        assert_eq!(out, vec![true, false]);
        let out: Vec<bool> = run_binary(logical_and::<f32>, &[1.0f32, 0.0], &[2.0f32, 3.0]);
        assert_eq!(out, vec![true, false]);
    }

    #[test]
    fn test_absolute_complex() {
        let a = [Complex::new(3.0f64, 4.0)];
        let mut out = [0.0f64];
        let args = [a.as_ptr() as *mut u8, out.as_mut_ptr() as *mut u8];
        unsafe { absolute::<Complex<f64>>(&args, &[1], &[16, 8], &LoopData::none()) };
        assert_relative_eq!(out[0], 5.0);
    }

    #[test]
    fn test_sqrt_negative_is_invalid() {
        get_fp_error_status();
        let a = [4.0f32, -1.0];
        let mut out = [0.0f32; 2];
        let args = [a.as_ptr() as *mut u8, out.as_mut_ptr() as *mut u8];
        unsafe { sqrt_float::<f32>(&args, &[2], &[4, 4], &LoopData::none()) };
        assert_relative_eq!(out[0], 2.0);
        assert!(out[1].is_nan());
        assert_eq!(get_fp_error_status(), FpeFlags::INVALID);
    }

    #[test]
    fn test_matmul_single_block() {
        // [[1,2],[3,4]] x [[5,6],[7,8]]
        let a = [1.0f64, 2.0, 3.0, 4.0];
        let b = [5.0f64, 6.0, 7.0, 8.0];
        let mut out = [0.0f64; 4];
        let args = [a.as_ptr() as *mut u8, b.as_ptr() as *mut u8, out.as_mut_ptr() as *mut u8];
        let steps = [0, 0, 0, 16, 8, 16, 8, 16, 8];
        unsafe { matmul::<f64>(&args, &[1, 2, 2, 2], &steps, &LoopData::none()) };
        assert_eq!(out, [19.0, 22.0, 43.0, 50.0]);
    }
}
