//! Contiguous cast functions, byte swapping and the staging helpers used by
//! the buffered strategies.

use crate::array::{alloc_words, ArrayView, NdArray};
use crate::dtype::{DType, TypeDescr};
use crate::element::{dispatch_dtype, Element};
use crate::iter::LoopPlan;
use crate::{Result, UFuncError, DEFAULT_BUFFER_SIZE};

/// Convert `count` contiguous native-order elements from `src` to `dst`.
///
/// Source and destination types are fixed by the function; see [`cast_fn`].
pub type CastFn = unsafe fn(src: *const u8, dst: *mut u8, count: usize);

unsafe fn copy_same<T: Element>(src: *const u8, dst: *mut u8, count: usize) {
    std::ptr::copy_nonoverlapping(src, dst, count * T::DTYPE.itemsize());
}

unsafe fn cast_contiguous<S: Element, D: Element>(src: *const u8, dst: *mut u8, count: usize) {
    let ss = S::DTYPE.itemsize();
    let ds = D::DTYPE.itemsize();
    for i in 0..count {
        let value = S::load(src.add(i * ss));
        D::from_scalar(value.to_scalar()).store(dst.add(i * ds));
    }
}

/// Look up the cast function from `from` to `to`.
///
/// Returns `None` when exactly one side is [`DType::Object`]: object handles
/// have no numeric value.
pub fn cast_fn(from: DType, to: DType) -> Option<CastFn> {
    if from == to {
        return Some(dispatch_dtype!(from, T => copy_same::<T> as CastFn));
    }
    if from.is_object() || to.is_object() {
        return None;
    }
    Some(dispatch_dtype!(from, S => dispatch_dtype!(to, D => cast_contiguous::<S, D> as CastFn)))
}

/// Cast `count` contiguous elements described by `from` into `dst` described by `to`.
///
/// Byte order of either side is honoured.
pub fn cast(src: &[u8], from: TypeDescr, dst: &mut [u8], to: TypeDescr, count: usize) -> Result<()> {
    let src_bytes = count * from.itemsize();
    let dst_bytes = count * to.itemsize();
    if src.len() < src_bytes || dst.len() < dst_bytes {
        return Err(UFuncError::InvalidLayout("cast buffer too small"));
    }
    let f = cast_fn(from.dtype, to.dtype).ok_or(UFuncError::UnsupportedCast {
        from: from.dtype,
        to: to.dtype,
    })?;
    if from.needs_swap() {
        let mut tmp = ScratchBuffer::new(src_bytes)?;
        let buf = tmp.as_mut_slice();
        buf.copy_from_slice(&src[..src_bytes]);
        byte_swap(buf, from.dtype, count);
        unsafe { f(buf.as_ptr(), dst.as_mut_ptr(), count) };
    } else {
        unsafe { f(src.as_ptr(), dst.as_mut_ptr(), count) };
    }
    if to.needs_swap() {
        byte_swap(&mut dst[..dst_bytes], to.dtype, count);
    }
    Ok(())
}

/// Reverse the bytes of every swap unit of the first `count` elements.
pub fn byte_swap(buf: &mut [u8], dtype: DType, count: usize) {
    let unit = dtype.swap_unit();
    if unit <= 1 {
        return;
    }
    for chunk in buf[..count * dtype.itemsize()].chunks_exact_mut(unit) {
        chunk.reverse();
    }
}

/// Copy `count` strided elements into a contiguous buffer.
///
/// # Safety
/// `src` must be valid for `count` reads of `itemsize` bytes at `stride`,
/// `dst` for `count * itemsize` bytes.
#[inline]
pub(crate) unsafe fn gather(src: *const u8, stride: isize, count: usize, itemsize: usize, dst: *mut u8) {
    if stride == itemsize as isize {
        std::ptr::copy_nonoverlapping(src, dst, count * itemsize);
        return;
    }
    for i in 0..count {
        std::ptr::copy_nonoverlapping(src.wrapping_offset(i as isize * stride), dst.add(i * itemsize), itemsize);
    }
}

/// Copy `count` contiguous elements out to strided memory.
///
/// # Safety
/// Mirror of [`gather`].
#[inline]
pub(crate) unsafe fn scatter(src: *const u8, count: usize, itemsize: usize, dst: *mut u8, stride: isize) {
    if stride == itemsize as isize {
        std::ptr::copy_nonoverlapping(src, dst, count * itemsize);
        return;
    }
    for i in 0..count {
        std::ptr::copy_nonoverlapping(src.add(i * itemsize), dst.wrapping_offset(i as isize * stride), itemsize);
    }
}

/// Zeroed, 8-byte-aligned scratch memory owned by one call.
pub(crate) struct ScratchBuffer {
    words: Vec<u64>,
    nbytes: usize,
}

impl ScratchBuffer {
    pub(crate) fn new(nbytes: usize) -> Result<Self> {
        Ok(Self {
            words: alloc_words(nbytes)?,
            nbytes,
        })
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast::<u8>()
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        let nbytes = self.nbytes;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..nbytes]
    }
}

/// Copy `src` into `dst`, broadcasting, casting and byte-swapping as needed.
///
/// `src` must broadcast to `dst.dims()`.
pub fn copy_into(dst: &mut NdArray, src: &ArrayView<'_>) -> Result<()> {
    let src = src.broadcast_to(dst.dims())?;
    let from = src.descr();
    let to = dst.descr();
    let f = cast_fn(from.dtype, to.dtype).ok_or(UFuncError::UnsupportedCast {
        from: from.dtype,
        to: to.dtype,
    })?;
    let plan = LoopPlan::new(dst.dims(), &[src.strides(), dst.strides()], &[1, 2]);
    if plan.empty {
        return Ok(());
    }

    let chunk = plan.inner_len.min(DEFAULT_BUFFER_SIZE);
    let mut inbuf = ScratchBuffer::new(chunk * from.itemsize())?;
    let mut outbuf = ScratchBuffer::new(chunk * to.itemsize())?;
    let src_base = src.ptr();
    let dst_base = dst.base_ptr_mut();
    let (s_in, s_out) = (plan.inner_strides[0], plan.inner_strides[1]);

    plan.for_each_outer(|offsets| {
        let mut done = 0usize;
        while done < plan.inner_len {
            let n = (plan.inner_len - done).min(chunk);
            let sp = src_base.wrapping_offset(offsets[0] + done as isize * s_in);
            let dp = dst_base.wrapping_offset(offsets[1] + done as isize * s_out);
            unsafe {
                gather(sp, s_in, n, from.itemsize(), inbuf.as_mut_ptr());
                if from.needs_swap() {
                    byte_swap(inbuf.as_mut_slice(), from.dtype, n);
                }
                f(inbuf.as_mut_ptr(), outbuf.as_mut_ptr(), n);
                if to.needs_swap() {
                    byte_swap(outbuf.as_mut_slice(), to.dtype, n);
                }
                scatter(outbuf.as_mut_ptr(), n, to.itemsize(), dp, s_out);
            }
            done += n;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ByteOrder;
    use num_complex::Complex64;

    #[test]
    fn test_cast_fn_object_mix_unsupported() {
        assert!(cast_fn(DType::Object, DType::Object).is_some());
        assert!(cast_fn(DType::Object, DType::Float64).is_none());
        assert!(cast_fn(DType::Int32, DType::Object).is_none());
    }

    #[test]
    fn test_cast_int_to_float() {
        let src: Vec<u8> = [1i32, -2, 3].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut dst = vec![0u8; 24];
        cast(&src, DType::Int32.into(), &mut dst, DType::Float64.into(), 3).unwrap();
        let out: Vec<f64> = dst
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(out, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_cast_from_swapped() {
        let src: Vec<u8> = [258u16, 1].iter().flat_map(|v| v.swap_bytes().to_ne_bytes()).collect();
        let mut dst = vec![0u8; 8];
        let from = TypeDescr::with_byte_order(DType::UInt16, ByteOrder::SWAPPED);
        cast(&src, from, &mut dst, DType::UInt32.into(), 2).unwrap();
        assert_eq!(u32::from_ne_bytes(dst[0..4].try_into().unwrap()), 258);
        assert_eq!(u32::from_ne_bytes(dst[4..8].try_into().unwrap()), 1);
    }

    #[test]
    fn test_byte_swap_complex_components() {
        let c = num_complex::Complex32::new(1.0, 2.0);
        let mut buf = vec![0u8; 8];
        unsafe { c.store(buf.as_mut_ptr()) };
        byte_swap(&mut buf, DType::Complex64, 1);
        assert_eq!(&buf[0..4], &1.0f32.to_bits().swap_bytes().to_ne_bytes());
        assert_eq!(&buf[4..8], &2.0f32.to_bits().swap_bytes().to_ne_bytes());
    }

    #[test]
    fn test_copy_into_broadcast_and_cast() {
        let src = NdArray::from_vec(&[1, 3], vec![1i16, 2, 3]).unwrap();
        let mut dst = NdArray::zeros(&[2, 3], DType::Complex128).unwrap();
        copy_into(&mut dst, &src.view()).unwrap();
        let out = dst.to_vec::<Complex64>().unwrap();
        assert_eq!(out[4], Complex64::new(2.0, 0.0));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_copy_into_unsupported() {
        let src = NdArray::from_vec(&[2], vec![1.0f64, 2.0]).unwrap();
        let mut dst = NdArray::zeros(&[2], DType::Object).unwrap();
        assert!(matches!(
            copy_into(&mut dst, &src.view()),
            Err(UFuncError::UnsupportedCast { .. })
        ));
    }
}
