//! Built-in ufuncs.
//!
//! Every constructor returns a fresh [`UFunc`] whose signature table lists the
//! loops in the order bool, int8, uint8, int16, uint16, int32, uint32, int64,
//! uint64, float32, float64, complex64, complex128. First-match dispatch
//! therefore selects the smallest type every input casts to safely.

use num_complex::Complex;
use parking_lot::RwLock;

use crate::dtype::DType;
use crate::element::Element;
use crate::loops;
use crate::signature::CoreSignature;
use crate::ufunc::{Identity, InnerLoop, LoopData, UFunc};

/// Signature table under construction.
#[derive(Default)]
struct Table {
    types: Vec<DType>,
    functions: Vec<InnerLoop>,
}

impl Table {
    fn push(&mut self, types: &[DType], function: InnerLoop) {
        self.types.extend_from_slice(types);
        self.functions.push(function);
    }
}

/// `(T, T) -> T` loops for each listed type.
macro_rules! same {
    ($table:ident, $f:ident: $($t:ty),+) => {
        $( $table.push(&[<$t as Element>::DTYPE; 3], loops::$f::<$t>); )+
    };
}

/// `(T, T) -> T` complex loops, generic over the component type.
macro_rules! complex_same {
    ($table:ident, $f:ident) => {
        $table.push(&[DType::Complex64; 3], loops::$f::<f32>);
        $table.push(&[DType::Complex128; 3], loops::$f::<f64>);
    };
}

/// `(T, T) -> bool` loops for each listed type.
macro_rules! to_bool {
    ($table:ident, $f:ident: $($t:ty),+) => {
        $( $table.push(&[<$t as Element>::DTYPE, <$t as Element>::DTYPE, DType::Bool], loops::$f::<$t>); )+
    };
}

/// `T -> T` loops for each listed type.
macro_rules! unary_same {
    ($table:ident, $f:ident: $($t:ty),+) => {
        $( $table.push(&[<$t as Element>::DTYPE; 2], loops::$f::<$t>); )+
    };
}

fn make(name: &str, nin: usize, nout: usize, identity: Identity, doc: &str, core: Option<CoreSignature>, table: Table) -> UFunc {
    UFunc {
        name: name.to_string(),
        doc: Some(doc.to_string()),
        nin,
        nout,
        identity,
        data: vec![LoopData::none(); table.functions.len()],
        types: table.types,
        functions: table.functions,
        check_return: false,
        core,
        user_loops: RwLock::new(Vec::new()),
    }
}

/// Core signature from dimension names and per-argument dimension indices.
fn core(text: &str, names: &[&str], args: &[&[usize]]) -> CoreSignature {
    let mut offsets = Vec::with_capacity(args.len());
    let mut dim_ixs = Vec::new();
    for arg in args {
        offsets.push(dim_ixs.len());
        dim_ixs.extend_from_slice(arg);
    }
    CoreSignature {
        text: text.to_string(),
        dim_names: names.iter().map(|n| n.to_string()).collect(),
        num_dims: args.iter().map(|a| a.len()).collect(),
        dim_ixs,
        offsets,
    }
}

pub fn add() -> UFunc {
    let mut t = Table::default();
    t.push(&[DType::Bool; 3], loops::logical_or::<bool>);
    same!(t, add_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, add_float: f32, f64);
    complex_same!(t, add_complex);
    make("add", 2, 1, Identity::Zero, "Add arguments element-wise.", None, t)
}

pub fn subtract() -> UFunc {
    let mut t = Table::default();
    same!(t, subtract_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, subtract_float: f32, f64);
    complex_same!(t, subtract_complex);
    make("subtract", 2, 1, Identity::None, "Subtract arguments element-wise.", None, t)
}

pub fn multiply() -> UFunc {
    let mut t = Table::default();
    t.push(&[DType::Bool; 3], loops::logical_and::<bool>);
    same!(t, multiply_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, multiply_float: f32, f64);
    complex_same!(t, multiply_complex);
    make("multiply", 2, 1, Identity::One, "Multiply arguments element-wise.", None, t)
}

pub fn divide() -> UFunc {
    let mut t = Table::default();
    same!(t, divide_float: f32, f64);
    complex_same!(t, divide_complex);
    make("divide", 2, 1, Identity::None, "True division element-wise.", None, t)
}

pub fn floor_divide() -> UFunc {
    let mut t = Table::default();
    same!(t, floor_divide_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, floor_divide_float: f32, f64);
    make("floor_divide", 2, 1, Identity::None, "Largest integer not greater than the quotient.", None, t)
}

pub fn maximum() -> UFunc {
    let mut t = Table::default();
    same!(t, maximum_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, maximum_float: f32, f64);
    make("maximum", 2, 1, Identity::None, "Element-wise maximum, propagating NaN.", None, t)
}

pub fn minimum() -> UFunc {
    let mut t = Table::default();
    same!(t, minimum_int: i8, u8, i16, u16, i32, u32, i64, u64);
    same!(t, minimum_float: f32, f64);
    make("minimum", 2, 1, Identity::None, "Element-wise minimum, propagating NaN.", None, t)
}

pub fn equal() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, equal: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, Complex<f32>, Complex<f64>);
    make("equal", 2, 1, Identity::None, "Return (x1 == x2) element-wise.", None, t)
}

pub fn not_equal() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, not_equal: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, Complex<f32>, Complex<f64>);
    make("not_equal", 2, 1, Identity::None, "Return (x1 != x2) element-wise.", None, t)
}

pub fn less() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, less: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
    make("less", 2, 1, Identity::None, "Return (x1 < x2) element-wise.", None, t)
}

pub fn less_equal() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, less_equal: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
    make("less_equal", 2, 1, Identity::None, "Return (x1 <= x2) element-wise.", None, t)
}

pub fn greater() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, greater: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
    make("greater", 2, 1, Identity::None, "Return (x1 > x2) element-wise.", None, t)
}

pub fn greater_equal() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, greater_equal: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
    make("greater_equal", 2, 1, Identity::None, "Return (x1 >= x2) element-wise.", None, t)
}

pub fn logical_and() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, logical_and: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, Complex<f32>, Complex<f64>);
    make("logical_and", 2, 1, Identity::One, "Truth value of x1 AND x2 element-wise.", None, t)
}

pub fn logical_or() -> UFunc {
    let mut t = Table::default();
    to_bool!(t, logical_or: bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, Complex<f32>, Complex<f64>);
    make("logical_or", 2, 1, Identity::Zero, "Truth value of x1 OR x2 element-wise.", None, t)
}

pub fn negative() -> UFunc {
    let mut t = Table::default();
    unary_same!(t, negative_int: i8, u8, i16, u16, i32, u32, i64, u64);
    unary_same!(t, negative_float: f32, f64);
    t.push(&[DType::Complex64; 2], loops::negative_complex::<f32>);
    t.push(&[DType::Complex128; 2], loops::negative_complex::<f64>);
    make("negative", 1, 1, Identity::None, "Numerical negative, element-wise.", None, t)
}

pub fn absolute() -> UFunc {
    let mut t = Table::default();
    unary_same!(t, absolute: i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
    t.push(&[DType::Complex64, DType::Float32], loops::absolute::<Complex<f32>>);
    t.push(&[DType::Complex128, DType::Float64], loops::absolute::<Complex<f64>>);
    make("absolute", 1, 1, Identity::None, "Absolute value element-wise.", None, t)
}

pub fn sqrt() -> UFunc {
    let mut t = Table::default();
    unary_same!(t, sqrt_float: f32, f64);
    t.push(&[DType::Complex64; 2], loops::sqrt_complex::<f32>);
    t.push(&[DType::Complex128; 2], loops::sqrt_complex::<f64>);
    make("sqrt", 1, 1, Identity::None, "Non-negative square root element-wise.", None, t)
}

/// Inner product over the last axis, `(i),(i)->()`.
pub fn inner1d() -> UFunc {
    let mut t = Table::default();
    same!(t, inner1d: i64, f64);
    let sig = core("(i),(i)->()", &["i"], &[&[0], &[0], &[]]);
    make("inner1d", 2, 1, Identity::None, "Inner product over the last axis.", Some(sig), t)
}

/// Matrix product over the last two axes, `(m,n),(n,p)->(m,p)`.
pub fn matmul() -> UFunc {
    let mut t = Table::default();
    same!(t, matmul: i64, f32, f64);
    let sig = core("(m,n),(n,p)->(m,p)", &["m", "n", "p"], &[&[0, 1], &[1, 2], &[0, 2]]);
    make("matmul", 2, 1, Identity::None, "Matrix product of two arrays.", Some(sig), t)
}

/// Every built-in ufunc, in a stable order.
pub fn all() -> Vec<UFunc> {
    vec![
        add(),
        subtract(),
        multiply(),
        divide(),
        floor_divide(),
        maximum(),
        minimum(),
        equal(),
        not_equal(),
        less(),
        less_equal(),
        greater(),
        greater_equal(),
        logical_and(),
        logical_or(),
        negative(),
        absolute(),
        sqrt(),
        inner1d(),
        matmul(),
    ]
}
