use approx::assert_relative_eq;
use num_complex::Complex64;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strided_ufunc::{
    broadcast_shapes, builtins, get_fp_error_status, loops, raise_fp_status, set_fp_error_handler, ArrayView, ByteOrder,
    DType, ErrorMask, ErrorSink, ExecConfig, FpAction, FpErrorHandler, FpeFlags, Identity, InnerLoop, InvokeOptions,
    LoopData, LoopMethod, LoopSource, NdArray, ObjectRef, ReduceOptions, UFunc, UFuncError, UFuncRegistry,
};

fn make_matrix(rows: usize, cols: usize) -> NdArray {
    NdArray::from_fn(&[rows, cols], |idx| (idx[0] * cols + idx[1]) as f64 * 0.25 - 3.0).unwrap()
}

/// Sink that records notifications instead of printing them.
#[derive(Default)]
struct Collect {
    events: RefCell<Vec<(&'static str, FpeFlags)>>,
    host: bool,
}

impl ErrorSink for Collect {
    fn warn(&self, _ufunc: &str, condition: FpeFlags) -> strided_ufunc::Result<()> {
        self.events.borrow_mut().push(("warn", condition));
        Ok(())
    }

    fn print(&self, _ufunc: &str, condition: FpeFlags) {
        self.events.borrow_mut().push(("print", condition));
    }

    fn log(&self, _ufunc: &str, condition: FpeFlags) {
        self.events.borrow_mut().push(("log", condition));
    }

    fn host_api_available(&self) -> bool {
        self.host
    }
}

// ============================================================================
// Broadcasting
// ============================================================================

#[test]
fn test_broadcast_rule() {
    assert_eq!(broadcast_shapes(&[&[3, 1], &[1, 4]]).unwrap(), vec![3, 4]);
    assert_eq!(broadcast_shapes(&[&[8, 1, 6, 1], &[7, 1, 5]]).unwrap(), vec![8, 7, 6, 5]);
    assert!(matches!(
        broadcast_shapes(&[&[2, 3], &[3, 2]]),
        Err(UFuncError::ShapeMismatch(_, _))
    ));
}

#[test]
fn test_add_column_plus_row() {
    let add = builtins::add();
    let a = NdArray::from_vec(&[3, 1], vec![1.0f64, 2.0, 3.0]).unwrap();
    let b = NdArray::from_vec(&[1, 4], vec![10.0f64, 20.0, 30.0, 40.0]).unwrap();
    let out = add.call(&[a.view(), b.view()]).unwrap();
    assert_eq!(out[0].dims(), &[3, 4]);
    for i in 0..3 {
        for j in 0..4 {
            let expected = (i + 1) as f64 + 10.0 * (j + 1) as f64;
            assert_relative_eq!(out[0].get::<f64>(&[i, j]).unwrap(), expected);
        }
    }
}

#[test]
fn test_incompatible_shapes_rejected_before_execution() {
    let add = builtins::add();
    let a = make_matrix(2, 3);
    let b = make_matrix(3, 2);
    assert!(matches!(
        add.call(&[a.view(), b.view()]),
        Err(UFuncError::ShapeMismatch(_, _))
    ));
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_dispatch_is_deterministic() {
    let mul = builtins::multiply();
    let first = mul.resolve_types(&[DType::UInt8, DType::Int16], &[]).unwrap();
    for _ in 0..10 {
        let again = mul.resolve_types(&[DType::UInt8, DType::Int16], &[]).unwrap();
        assert_eq!(again.types, first.types);
        assert_eq!(again.source, first.source);
    }
    assert_eq!(first.types, vec![DType::Int16; 3]);
}

#[test]
fn test_no_matching_loop() {
    let sub = builtins::subtract();
    assert!(matches!(
        sub.resolve_types(&[DType::Bool, DType::Bool], &[Some(DType::Bool)]),
        Err(UFuncError::NoMatchingLoop { .. })
    ));
}

#[test]
fn test_user_loop_dispatch() {
    unsafe fn halve_sum(args: &[*mut u8], dims: &[usize], steps: &[isize], data: &LoopData) {
        let scale = data.get::<f64>().copied().unwrap_or(1.0);
        let (mut a, mut b, mut o) = (args[0] as *const u8, args[1] as *const u8, args[2]);
        for _ in 0..dims[0] {
            let x = (a as *const Complex64).read_unaligned();
            let y = (b as *const Complex64).read_unaligned();
            (o as *mut Complex64).write_unaligned((x + y) * scale);
            a = a.wrapping_offset(steps[0]);
            b = b.wrapping_offset(steps[1]);
            o = o.wrapping_offset(steps[2]);
        }
    }

    let f = UFunc::builder("mean2", 2, 1)
        .add_loop(&[DType::Float64; 3], loops::add_float::<f64>)
        .build()
        .unwrap();
    let a = NdArray::from_vec(&[2], vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)]).unwrap();
    assert!(matches!(
        f.call(&[a.view(), a.view()]),
        Err(UFuncError::NoMatchingLoop { .. })
    ));

    f.register_loop(&[DType::Complex128; 3], halve_sum, LoopData::new(0.5f64))
        .unwrap();
    assert!(matches!(
        f.register_loop(&[DType::Complex128; 3], halve_sum, LoopData::none()),
        Err(UFuncError::DuplicateLoop { .. })
    ));
    let resolved = f.resolve_types(&[DType::Complex128, DType::Complex128], &[]).unwrap();
    assert_eq!(resolved.source, LoopSource::User(0));

    let out = f.call(&[a.view(), a.view()]).unwrap();
    assert_eq!(
        out[0].to_vec::<Complex64>().unwrap(),
        vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)]
    );
}

#[test]
fn test_from_func_and_data() {
    let f = UFunc::from_func_and_data(
        vec![loops::maximum_int::<i32> as InnerLoop, loops::maximum_float::<f64> as InnerLoop],
        vec![],
        vec![DType::Int32, DType::Int32, DType::Int32, DType::Float64, DType::Float64, DType::Float64],
        2,
        1,
        Identity::None,
        "max2",
        Some("maximum of two"),
    )
    .unwrap();
    assert_eq!(f.doc(), Some("maximum of two"));
    let a = NdArray::from_vec(&[3], vec![1i16, 9, -4]).unwrap();
    let b = NdArray::from_vec(&[3], vec![5i16, 2, -8]).unwrap();
    let out = f.call(&[a.view(), b.view()]).unwrap();
    assert_eq!(out[0].dtype(), DType::Int32);
    assert_eq!(out[0].to_vec::<i32>().unwrap(), vec![5, 9, -4]);
}

// ============================================================================
// Plain vs buffered
// ============================================================================

fn plain_reference(a: &ArrayView<'_>, b: &ArrayView<'_>) -> Vec<f64> {
    let add = builtins::add();
    let a = a.to_owned_as(DType::Float64).unwrap();
    let b = b.to_owned_as(DType::Float64).unwrap();
    let opts = InvokeOptions::default();
    assert_eq!(add.loop_method(&[a.view(), b.view()], &opts).unwrap(), LoopMethod::Plain);
    add.invoke(&[a.view(), b.view()], vec![], &opts).unwrap()[0]
        .to_vec::<f64>()
        .unwrap()
}

fn small_buffers() -> InvokeOptions<'static> {
    InvokeOptions::default().with_config(ExecConfig::default().with_buffer_size(16))
}

#[test]
fn test_strided_and_reversed_match_plain() {
    let add = builtins::add();
    let base = make_matrix(10, 40);
    let strided = base.view().slice_axis(1, 1, 40, 2).unwrap();
    let reversed = base.view().slice_axis(1, 0, 20, 1).unwrap().reverse_axis(0).unwrap();
    let expected = plain_reference(&strided, &reversed);
    let got = add.call(&[strided.clone(), reversed.clone()]).unwrap();
    assert_eq!(got[0].to_vec::<f64>().unwrap(), expected);
    let got = add.invoke(&[strided, reversed], vec![], &small_buffers()).unwrap();
    assert_eq!(got[0].to_vec::<f64>().unwrap(), expected);
}

#[test]
fn test_misaligned_matches_plain() {
    let add = builtins::add();
    let n = 50;
    let mut bytes = vec![0u8; 1 + 8 * n];
    for i in 0..n {
        bytes[1 + 8 * i..9 + 8 * i].copy_from_slice(&(i as f64 * 1.5).to_ne_bytes());
    }
    let misaligned = NdArray::from_bytes(&bytes, &[n], &[8], 1, DType::Float64).unwrap();
    assert!(!misaligned.is_aligned());
    let other = NdArray::from_fn(&[n], |i| i[0] as f64).unwrap();

    let opts = small_buffers();
    let inputs = [misaligned.view(), other.view()];
    assert_eq!(add.loop_method(&inputs, &opts).unwrap(), LoopMethod::Buffered);
    let got = add.invoke(&inputs, vec![], &opts).unwrap();
    let expected: Vec<f64> = (0..n).map(|i| i as f64 * 2.5).collect();
    assert_eq!(got[0].to_vec::<f64>().unwrap(), expected);
}

#[test]
fn test_byte_swapped_matches_plain() {
    let mul = builtins::multiply();
    let a = make_matrix(5, 7);
    let b = make_matrix(5, 7);
    let swapped = a.to_byte_order(ByteOrder::SWAPPED).unwrap();
    let plain = mul.call(&[a.view(), b.view()]).unwrap();
    let buffered = mul.invoke(&[swapped.view(), b.view()], vec![], &small_buffers()).unwrap();
    assert_eq!(
        buffered[0].to_vec::<f64>().unwrap(),
        plain[0].to_vec::<f64>().unwrap()
    );

    // swapped output
    let out = NdArray::zeros(&[5, 7], strided_ufunc::TypeDescr::with_byte_order(DType::Float64, ByteOrder::SWAPPED))
        .unwrap();
    let res = mul.invoke(&[a.view(), b.view()], vec![Some(out)], &small_buffers()).unwrap();
    assert!(res[0].descr().needs_swap());
    assert_eq!(res[0].to_vec::<f64>().unwrap(), plain[0].to_vec::<f64>().unwrap());
}

#[test]
fn test_cast_matches_plain() {
    let add = builtins::add();
    let a = NdArray::from_fn(&[6, 9], |i| (i[0] * 9 + i[1]) as i32 - 20).unwrap();
    let b = make_matrix(6, 9);
    let expected = plain_reference(&a.view(), &b.view());
    let got = add.invoke(&[a.view(), b.view()], vec![], &small_buffers()).unwrap();
    assert_eq!(got[0].dtype(), DType::Float64);
    assert_eq!(got[0].to_vec::<f64>().unwrap(), expected);
}

#[test]
fn test_requested_output_type() {
    let add = builtins::add();
    let a = NdArray::from_vec(&[3], vec![1i8, 2, 3]).unwrap();
    let opts = InvokeOptions::default().with_output_types(vec![Some(DType::Float32)]);
    let out = add.invoke(&[a.view(), a.view()], vec![], &opts).unwrap();
    assert_eq!(out[0].dtype(), DType::Float32);
    assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0]);
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_reduceat_example() {
    let add = builtins::add();
    let a = NdArray::from_vec(&[5], vec![1i64, 2, 3, 4, 5]).unwrap();
    let r = add.reduceat(&a.view(), 0, &[0, 2, 4], ReduceOptions::default()).unwrap();
    assert_eq!(r.to_vec::<i64>().unwrap(), vec![3, 7, 5]);
}

#[test]
fn test_empty_reduction() {
    let empty = NdArray::zeros(&[0], DType::Float64).unwrap();
    let sum = builtins::add().reduce(&empty.view(), 0, ReduceOptions::default()).unwrap();
    assert_relative_eq!(sum.get::<f64>(&[]).unwrap(), 0.0);
    let prod = builtins::multiply().reduce(&empty.view(), 0, ReduceOptions::default()).unwrap();
    assert_relative_eq!(prod.get::<f64>(&[]).unwrap(), 1.0);
    assert!(matches!(
        builtins::minimum().reduce(&empty.view(), 0, ReduceOptions::default()),
        Err(UFuncError::ZeroSizeReduction(_))
    ));
}

#[test]
fn test_reduce_strided_matches_sum() {
    let add = builtins::add();
    let base = make_matrix(12, 30);
    let view = base.view().slice_axis(0, 0, 12, 3).unwrap().reverse_axis(1).unwrap();
    let r = add.reduce(&view, 1, ReduceOptions::default()).unwrap();
    for (row, got) in r.to_vec::<f64>().unwrap().into_iter().enumerate() {
        let expected: f64 = (0..30).map(|j| base.get::<f64>(&[row * 3, j]).unwrap()).sum();
        assert_relative_eq!(got, expected, epsilon = 1e-10);
    }
}

// ============================================================================
// Floating-point errors
// ============================================================================

#[test]
fn test_divide_by_zero_raise() {
    let div = builtins::divide();
    let a = NdArray::from_vec(&[3], vec![1.0f64, 2.0, 3.0]).unwrap();
    let b = NdArray::from_vec(&[3], vec![1.0f64, 0.0, 3.0]).unwrap();
    let mask = ErrorMask::DEFAULT.with(FpeFlags::DIVIDE_BY_ZERO, FpAction::Raise);
    let opts = InvokeOptions::default().with_config(ExecConfig::default().with_error_mask(mask));
    match div.invoke(&[a.view(), b.view()], vec![], &opts) {
        Err(UFuncError::FloatingPoint { conditions, action, .. }) => {
            assert_eq!(conditions, FpeFlags::DIVIDE_BY_ZERO);
            assert_eq!(action, FpAction::Raise);
        }
        other => panic!("expected floating point error, got {other:?}"),
    }
    assert!(get_fp_error_status().is_empty());
}

fn raise_all() -> InvokeOptions<'static> {
    InvokeOptions::default().with_config(ExecConfig::default().with_error_mask(ErrorMask::all(FpAction::Raise)))
}

#[test]
fn test_underflow_to_zero_raises() {
    let mul = builtins::multiply();
    let a = NdArray::from_vec(&[1], vec![1e-300f64]).unwrap();
    assert!(matches!(
        mul.invoke(&[a.view(), a.view()], vec![], &raise_all()),
        Err(UFuncError::FloatingPoint { conditions: FpeFlags::UNDERFLOW, .. })
    ));

    let div = builtins::divide();
    let big = NdArray::from_vec(&[1], vec![1e300f64]).unwrap();
    assert!(matches!(
        div.invoke(&[a.view(), big.view()], vec![], &raise_all()),
        Err(UFuncError::FloatingPoint { conditions: FpeFlags::UNDERFLOW, .. })
    ));

    // an exact zero is not an underflow
    let zero = NdArray::from_vec(&[1], vec![0.0f64]).unwrap();
    let out = mul.invoke(&[zero.view(), a.view()], vec![], &raise_all()).unwrap();
    assert_eq!(out[0].to_vec::<f64>().unwrap(), vec![0.0]);
}

#[test]
fn test_complex_overflow_raises() {
    let mul = builtins::multiply();
    let a = NdArray::from_vec(&[1], vec![Complex64::new(1e308, 0.0)]).unwrap();
    let b = NdArray::from_vec(&[1], vec![Complex64::new(10.0, 0.0)]).unwrap();
    match mul.invoke(&[a.view(), b.view()], vec![], &raise_all()) {
        Err(UFuncError::FloatingPoint { conditions, .. }) => assert!(conditions.contains(FpeFlags::OVERFLOW)),
        other => panic!("expected overflow, got {other:?}"),
    }

    let sqrt = builtins::sqrt();
    let c = NdArray::from_vec(&[2], vec![Complex64::new(-4.0, 0.0), Complex64::new(0.0, 2.0)]).unwrap();
    let out = sqrt.invoke(&[c.view()], vec![], &raise_all()).unwrap();
    let got = out[0].to_vec::<Complex64>().unwrap();
    assert_relative_eq!(got[0].im, 2.0, epsilon = 1e-12);
    assert_relative_eq!(got[1].re, 1.0, epsilon = 1e-12);
}

#[test]
fn test_log_action_reaches_sink() {
    let sqrt = builtins::sqrt();
    let a = NdArray::from_vec(&[3], vec![-1.0f64, 4.0, -9.0]).unwrap();
    let sink = Collect::default();
    let mask = ErrorMask::IGNORE_ALL.with(FpeFlags::INVALID, FpAction::Log);
    let opts = InvokeOptions::default().with_config(ExecConfig::default().with_error_mask(mask).with_error_sink(&sink));
    let out = sqrt.invoke(&[a.view()], vec![], &opts).unwrap();
    assert_eq!(out[0].get::<f64>(&[1]).unwrap(), 2.0);
    assert_eq!(*sink.events.borrow(), vec![("log", FpeFlags::INVALID)]);
}

#[test]
fn test_output_without_cast_is_rejected() {
    let add = builtins::add();
    let a = NdArray::from_vec(&[2], vec![1.0f64, 2.0]).unwrap();
    let out = NdArray::zeros(&[2], DType::Object).unwrap();
    assert!(matches!(
        add.invoke(&[a.view(), a.view()], vec![Some(out)], &InvokeOptions::default()),
        Err(UFuncError::UnsupportedCast {
            from: DType::Float64,
            to: DType::Object
        })
    ));
}

#[test]
fn test_user_loop_reports_through_status_register() {
    unsafe fn checked_halve(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
        let (mut a, mut o) = (args[0] as *const u8, args[1]);
        for _ in 0..dims[0] {
            let x = (a as *const f32).read_unaligned();
            if x.is_nan() {
                raise_fp_status(FpeFlags::INVALID);
            }
            (o as *mut f32).write_unaligned(x * 0.5);
            a = a.wrapping_offset(steps[0]);
            o = o.wrapping_offset(steps[1]);
        }
    }

    let f = UFunc::builder("checked_halve", 1, 1).build().unwrap();
    f.register_loop(&[DType::Float32; 2], checked_halve, LoopData::none()).unwrap();
    let ok = NdArray::from_vec(&[2], vec![2.0f32, 4.0]).unwrap();
    let out = f.invoke(&[ok.view()], vec![], &raise_all()).unwrap();
    assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![1.0, 2.0]);

    let bad = NdArray::from_vec(&[2], vec![2.0f32, f32::NAN]).unwrap();
    assert!(matches!(
        f.invoke(&[bad.view()], vec![], &raise_all()),
        Err(UFuncError::FloatingPoint { conditions: FpeFlags::INVALID, .. })
    ));
}

#[test]
fn test_raise_keeps_completed_chunks() {
    let div = builtins::divide();
    let n = 40;
    let a = NdArray::from_fn(&[n], |_| 1i32).unwrap();
    let b = NdArray::from_fn(&[n], |i| if i[0] == 20 { 0i32 } else { 2 }).unwrap();
    let mut outs = vec![NdArray::zeros(&[n], DType::Float64).unwrap()];
    let mask = ErrorMask::IGNORE_ALL.with(FpeFlags::DIVIDE_BY_ZERO, FpAction::Raise);
    let opts = InvokeOptions::default().with_config(ExecConfig::default().with_buffer_size(16).with_error_mask(mask));
    let err = div.invoke_into(&[a.view(), b.view()], &mut outs, &opts).unwrap_err();
    assert!(matches!(err, UFuncError::FloatingPoint { .. }));
    let got = outs[0].to_vec::<f64>().unwrap();
    // chunks [0, 16) and [16, 32) were written, [32, 40) was not
    assert_eq!(got[0], 0.5);
    assert_eq!(got[25], 0.5);
    assert!(got[20].is_infinite());
    assert_eq!(got[35], 0.0);
}

#[test]
fn test_warn_and_print_once_per_condition() {
    let div = builtins::divide();
    let n = 64;
    let a = NdArray::from_fn(&[n], |i| if i[0] % 2 == 0 { 1.0f64 } else { 0.0 }).unwrap();
    let zeros = NdArray::zeros(&[n], DType::Float64).unwrap();
    let sink = Collect::default();
    let mask = ErrorMask::IGNORE_ALL
        .with(FpeFlags::DIVIDE_BY_ZERO, FpAction::Warn)
        .with(FpeFlags::INVALID, FpAction::Print);
    // buffered with 16-element chunks: every chunk fires both conditions
    let a32 = a.as_type(DType::Float32).unwrap();
    let opts = InvokeOptions::default().with_config(
        ExecConfig::default()
            .with_buffer_size(16)
            .with_error_mask(mask)
            .with_error_sink(&sink),
    );
    div.invoke(&[a32.view(), zeros.view()], vec![], &opts).unwrap();
    let events = sink.events.borrow();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&("warn", FpeFlags::DIVIDE_BY_ZERO)));
    assert!(events.contains(&("print", FpeFlags::INVALID)));
}

#[test]
fn test_call_action_uses_installed_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler: FpErrorHandler = Arc::new(move |_name: &str, flags: FpeFlags| -> strided_ufunc::Result<()> {
        assert!(flags.contains(FpeFlags::OVERFLOW));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let previous = set_fp_error_handler(Some(handler));

    let mul = builtins::multiply();
    let a = NdArray::from_vec(&[2], vec![1e200f64, 1.0]).unwrap();
    let mask = ErrorMask::IGNORE_ALL.with(FpeFlags::OVERFLOW, FpAction::Call);
    let opts = InvokeOptions::default().with_config(ExecConfig::default().with_error_mask(mask));
    mul.invoke(&[a.view(), a.view()], vec![], &opts).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    set_fp_error_handler(None);
    assert!(matches!(
        mul.invoke(&[a.view(), a.view()], vec![], &opts),
        Err(UFuncError::MissingFpHandler)
    ));
    set_fp_error_handler(previous);
}

// ============================================================================
// Generalized ufuncs
// ============================================================================

#[test]
fn test_matmul_gufunc() {
    let mm = builtins::matmul();
    let a = make_matrix(3, 4);
    let b = make_matrix(4, 2);
    let out = mm.call(&[a.view(), b.view()]).unwrap();
    assert_eq!(out[0].dims(), &[3, 2]);
    for i in 0..3 {
        for j in 0..2 {
            let expected: f64 = (0..4)
                .map(|k| a.get::<f64>(&[i, k]).unwrap() * b.get::<f64>(&[k, j]).unwrap())
                .sum();
            assert_relative_eq!(out[0].get::<f64>(&[i, j]).unwrap(), expected, epsilon = 1e-10);
        }
    }

    // transposed core operand
    let bt = make_matrix(2, 4);
    let bt_view = bt.view().permute(&[1, 0]).unwrap();
    let out_t = mm.call(&[a.view(), bt_view.clone()]).unwrap();
    let copy = bt_view.to_owned_as(DType::Float64).unwrap();
    let out_c = mm.call(&[a.view(), copy.view()]).unwrap();
    assert_eq!(out_t[0].to_vec::<f64>().unwrap(), out_c[0].to_vec::<f64>().unwrap());

    assert!(matches!(
        mm.call(&[a.view(), a.view()]),
        Err(UFuncError::CoreDimensionMismatch { .. })
    ));
}

#[test]
fn test_inner1d_broadcast_loop_dims() {
    let inner = builtins::inner1d();
    let a = NdArray::from_fn(&[4, 1, 3], |i| (i[0] + i[2]) as f64).unwrap();
    let b = NdArray::from_fn(&[2, 3], |i| (i[0] * 3 + i[1]) as f64).unwrap();
    let out = inner.call(&[a.view(), b.view()]).unwrap();
    assert_eq!(out[0].dims(), &[4, 2]);
    for i in 0..4 {
        for j in 0..2 {
            let expected: f64 = (0..3).map(|k| ((i + k) * (j * 3 + k)) as f64).sum();
            assert_relative_eq!(out[0].get::<f64>(&[i, j]).unwrap(), expected);
        }
    }
}

// ============================================================================
// Object loops and registry
// ============================================================================

#[test]
fn test_object_loop_needs_host_api() {
    unsafe fn copy_first(args: &[*mut u8], dims: &[usize], steps: &[isize], _data: &LoopData) {
        for k in 0..dims[0] as isize {
            let v = (args[0].wrapping_offset(k * steps[0]) as *const u64).read_unaligned();
            (args[2].wrapping_offset(k * steps[2]) as *mut u64).write_unaligned(v);
        }
    }
    let f = UFunc::builder("first", 2, 1)
        .add_loop(&[DType::Object; 3], copy_first)
        .build()
        .unwrap();
    let a = NdArray::from_vec(&[2], vec![ObjectRef(11), ObjectRef(12)]).unwrap();
    assert!(matches!(
        f.call(&[a.view(), a.view()]),
        Err(UFuncError::HostApiRequired(_))
    ));

    let sink = Collect {
        host: true,
        ..Collect::default()
    };
    let opts = InvokeOptions::default().with_config(ExecConfig::default().with_error_sink(&sink));
    let out = f.invoke(&[a.view(), a.view()], vec![], &opts).unwrap();
    assert_eq!(out[0].to_vec::<ObjectRef>().unwrap(), vec![ObjectRef(11), ObjectRef(12)]);
}

#[test]
fn test_global_registry() {
    let reg = UFuncRegistry::global();
    let add = reg.numeric_op(strided_ufunc::NumericOp::Add).unwrap();
    assert_eq!(add.name(), "add");
    let a = NdArray::from_vec(&[2], vec![1u16, 2]).unwrap();
    let out = add.call(&[a.view(), a.view()]).unwrap();
    assert_eq!(out[0].to_vec::<u16>().unwrap(), vec![2, 4]);
}
