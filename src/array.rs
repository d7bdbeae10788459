//! Byte-addressed strided arrays.
//!
//! This module provides the array layer the loop machinery runs on:
//!
//! - [`NdArray`]: owned array over 8-byte-aligned storage, with arbitrary
//!   byte strides, a byte offset and a [`TypeDescr`]
//! - [`ArrayView`]: borrowed strided view over any byte slice
//!
//! Strides and offsets are in bytes, so views may be misaligned or use a
//! stride that is not a multiple of the element size. The executor detects
//! those cases and stages the data through aligned buffers.

use crate::dtype::{ByteOrder, DType, TypeDescr};
use crate::element::Element;
use crate::{Result, UFuncError};

// ============================================================================
// Layout helpers
// ============================================================================

/// Row-major (C order) byte strides for `dims`.
pub fn c_strides(dims: &[usize], itemsize: usize) -> Vec<isize> {
    let rank = dims.len();
    let mut strides = vec![0isize; rank];
    let mut acc = itemsize as isize;
    for i in (0..rank).rev() {
        strides[i] = acc;
        acc *= dims[i].max(1) as isize;
    }
    strides
}

/// Validate that every element of the layout lies inside `[0, len)`.
fn validate_bounds(
    len: usize,
    dims: &[usize],
    strides: &[isize],
    offset: usize,
    itemsize: usize,
) -> Result<()> {
    if dims.len() != strides.len() {
        return Err(UFuncError::InvalidLayout("stride and dims length mismatch"));
    }
    if dims.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let mut min_offset = offset as isize;
    let mut max_offset = offset as isize;
    for (&dim, &stride) in dims.iter().zip(strides.iter()) {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or(UFuncError::InvalidLayout("offset overflow"))?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(UFuncError::InvalidLayout("offset overflow"))?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(UFuncError::InvalidLayout("offset overflow"))?;
            }
        }
    }
    if min_offset < 0 {
        return Err(UFuncError::InvalidLayout("view starts before the buffer"));
    }
    if max_offset as usize + itemsize > len {
        return Err(UFuncError::InvalidLayout("view extends past the buffer"));
    }
    Ok(())
}

/// Allocate zeroed 8-byte words covering `nbytes`.
pub(crate) fn alloc_words(nbytes: usize) -> Result<Vec<u64>> {
    let nwords = (nbytes + 7) / 8;
    let mut words = Vec::new();
    words
        .try_reserve_exact(nwords)
        .map_err(|_| UFuncError::AllocationFailure(nbytes))?;
    words.resize(nwords, 0);
    Ok(words)
}

/// Read one element stored with `descr`'s byte order.
///
/// # Safety
/// `ptr` must be valid for reading `descr.itemsize()` bytes and
/// `T::DTYPE == descr.dtype`.
unsafe fn read_element<T: Element>(ptr: *const u8, descr: TypeDescr) -> T {
    if !descr.needs_swap() {
        return T::load(ptr);
    }
    let mut tmp = [0u8; 16];
    let size = descr.itemsize();
    std::ptr::copy_nonoverlapping(ptr, tmp.as_mut_ptr(), size);
    for unit in tmp[..size].chunks_exact_mut(descr.dtype.swap_unit()) {
        unit.reverse();
    }
    T::load(tmp.as_ptr())
}

/// Write one element with `descr`'s byte order.
///
/// # Safety
/// `ptr` must be valid for writing `descr.itemsize()` bytes and
/// `T::DTYPE == descr.dtype`.
unsafe fn write_element<T: Element>(ptr: *mut u8, descr: TypeDescr, value: T) {
    if !descr.needs_swap() {
        value.store(ptr);
        return;
    }
    let mut tmp = [0u8; 16];
    let size = descr.itemsize();
    value.store(tmp.as_mut_ptr());
    for unit in tmp[..size].chunks_exact_mut(descr.dtype.swap_unit()) {
        unit.reverse();
    }
    std::ptr::copy_nonoverlapping(tmp.as_ptr(), ptr, size);
}

fn check_element<T: Element>(descr: TypeDescr) -> Result<()> {
    if T::DTYPE != descr.dtype {
        return Err(UFuncError::ElementTypeMismatch {
            array: descr.dtype,
            requested: T::DTYPE,
        });
    }
    Ok(())
}

fn element_offset(dims: &[usize], strides: &[isize], offset: usize, index: &[usize]) -> Result<isize> {
    if index.len() != dims.len() {
        return Err(UFuncError::InvalidAxis {
            axis: index.len(),
            rank: dims.len(),
        });
    }
    let mut pos = offset as isize;
    for ((&i, &dim), &stride) in index.iter().zip(dims).zip(strides) {
        if i >= dim {
            return Err(UFuncError::IndexOutOfBounds { index: i, len: dim });
        }
        pos += i as isize * stride;
    }
    Ok(pos)
}

/// Visit every multi-index of `dims` in row-major order.
fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    if dims.iter().any(|&d| d == 0) {
        return;
    }
    let rank = dims.len();
    let mut idx = vec![0usize; rank];
    loop {
        f(&idx);
        let mut d = rank;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < dims[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

// ============================================================================
// ArrayView
// ============================================================================

/// Borrowed strided view over a byte slice.
#[derive(Debug, Clone)]
pub struct ArrayView<'a> {
    data: &'a [u8],
    dims: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
    descr: TypeDescr,
}

impl<'a> ArrayView<'a> {
    /// Create a view with explicit byte strides and byte offset.
    ///
    /// # Errors
    /// Returns [`UFuncError::InvalidLayout`] if any element falls outside `data`.
    pub fn new(
        data: &'a [u8],
        dims: &[usize],
        strides: &[isize],
        offset: usize,
        descr: impl Into<TypeDescr>,
    ) -> Result<Self> {
        let descr = descr.into();
        validate_bounds(data.len(), dims, strides, offset, descr.itemsize())?;
        Ok(Self {
            data,
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            offset,
            descr,
        })
    }

    /// Row-major view over the start of `data`.
    pub fn contiguous(data: &'a [u8], dims: &[usize], descr: impl Into<TypeDescr>) -> Result<Self> {
        let descr = descr.into();
        let strides = c_strides(dims, descr.itemsize());
        Self::new(data, dims, &strides, 0, descr)
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn descr(&self) -> TypeDescr {
        self.descr
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.descr.dtype
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Pointer to the element at the all-zero index.
    #[inline]
    pub(crate) fn ptr(&self) -> *const u8 {
        self.data.as_ptr().wrapping_add(self.offset)
    }

    /// True if the first element and every used stride respect the dtype alignment.
    pub fn is_aligned(&self) -> bool {
        let align = self.descr.alignment();
        if (self.ptr() as usize) % align != 0 {
            return false;
        }
        self.dims
            .iter()
            .zip(self.strides.iter())
            .all(|(&d, &s)| d <= 1 || s % align as isize == 0)
    }

    /// True if elements are laid out densely in row-major order.
    pub fn is_c_contiguous(&self) -> bool {
        let mut expected = self.descr.itemsize() as isize;
        for (&dim, &stride) in self.dims.iter().zip(self.strides.iter()).rev() {
            if dim <= 1 {
                continue;
            }
            if stride != expected {
                return false;
            }
            expected = expected.saturating_mul(dim as isize);
        }
        true
    }

    /// Reorder axes without touching data.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        let rank = self.dims.len();
        if perm.len() != rank {
            return Err(UFuncError::InvalidLayout("permutation length mismatch"));
        }
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank || seen[p] {
                return Err(UFuncError::InvalidLayout("invalid permutation"));
            }
            seen[p] = true;
        }
        Ok(Self {
            data: self.data,
            dims: perm.iter().map(|&p| self.dims[p]).collect(),
            strides: perm.iter().map(|&p| self.strides[p]).collect(),
            offset: self.offset,
            descr: self.descr,
        })
    }

    /// Select `start..stop` with a positive `step` along `axis`.
    pub fn slice_axis(&self, axis: usize, start: usize, stop: usize, step: usize) -> Result<Self> {
        if axis >= self.ndim() {
            return Err(UFuncError::InvalidAxis {
                axis,
                rank: self.ndim(),
            });
        }
        if step == 0 {
            return Err(UFuncError::InvalidLayout("slice step must be positive"));
        }
        let dim = self.dims[axis];
        let stop = stop.min(dim);
        let start = start.min(stop);
        let len = (stop - start + step - 1) / step;
        let mut out = self.clone();
        if len > 0 {
            out.offset = (self.offset as isize + start as isize * self.strides[axis]) as usize;
        }
        out.dims[axis] = len;
        out.strides[axis] = self.strides[axis] * step as isize;
        Ok(out)
    }

    /// Reverse the element order along `axis` (negative stride).
    pub fn reverse_axis(&self, axis: usize) -> Result<Self> {
        if axis >= self.ndim() {
            return Err(UFuncError::InvalidAxis {
                axis,
                rank: self.ndim(),
            });
        }
        let mut out = self.clone();
        let dim = self.dims[axis];
        if dim > 0 {
            out.offset = (self.offset as isize + (dim as isize - 1) * self.strides[axis]) as usize;
        }
        out.strides[axis] = -self.strides[axis];
        Ok(out)
    }

    /// Expand size-1 axes (and missing leading axes) to `dims` with stride 0.
    pub fn broadcast_to(&self, dims: &[usize]) -> Result<Self> {
        let strides = crate::broadcast::broadcast_strides(dims, &self.dims, &self.strides)?;
        Ok(Self {
            data: self.data,
            dims: dims.to_vec(),
            strides,
            offset: self.offset,
            descr: self.descr,
        })
    }

    /// Reinterpret the same bytes with a different byte order.
    pub fn with_byte_order(&self, byte_order: ByteOrder) -> Self {
        let mut out = self.clone();
        out.descr.byte_order = byte_order;
        out
    }

    /// Read one element.
    pub fn get<T: Element>(&self, index: &[usize]) -> Result<T> {
        check_element::<T>(self.descr)?;
        let pos = element_offset(&self.dims, &self.strides, self.offset, index)?;
        Ok(unsafe { read_element::<T>(self.data.as_ptr().offset(pos), self.descr) })
    }

    /// Copy all elements out in row-major logical order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        check_element::<T>(self.descr)?;
        let mut out = Vec::with_capacity(self.len());
        let base = self.data.as_ptr();
        for_each_index(&self.dims, |idx| {
            let mut pos = self.offset as isize;
            for (&i, &s) in idx.iter().zip(self.strides.iter()) {
                pos += i as isize * s;
            }
            out.push(unsafe { read_element::<T>(base.offset(pos), self.descr) });
        });
        Ok(out)
    }

    /// Copy into a fresh row-major native array of `dtype`.
    pub fn to_owned_as(&self, dtype: DType) -> Result<NdArray> {
        let mut out = NdArray::zeros(&self.dims, dtype)?;
        crate::cast::copy_into(&mut out, self)?;
        Ok(out)
    }
}

// ============================================================================
// NdArray
// ============================================================================

/// Owned strided array over 8-byte-aligned storage.
pub struct NdArray {
    words: Vec<u64>,
    nbytes: usize,
    dims: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
    descr: TypeDescr,
}

impl std::fmt::Debug for NdArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdArray")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("descr", &self.descr)
            .finish()
    }
}

impl Clone for NdArray {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            nbytes: self.nbytes,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            descr: self.descr,
        }
    }
}

impl NdArray {
    /// Row-major array filled with zero bytes.
    pub fn zeros(dims: &[usize], descr: impl Into<TypeDescr>) -> Result<Self> {
        let descr = descr.into();
        let count: usize = dims.iter().product();
        let nbytes = count
            .checked_mul(descr.itemsize())
            .ok_or(UFuncError::AllocationFailure(usize::MAX))?;
        Ok(Self {
            words: alloc_words(nbytes)?,
            nbytes,
            dims: dims.to_vec(),
            strides: c_strides(dims, descr.itemsize()),
            offset: 0,
            descr,
        })
    }

    /// Row-major native array from values in row-major order.
    pub fn from_vec<T: Element>(dims: &[usize], data: Vec<T>) -> Result<Self> {
        let count: usize = dims.iter().product();
        if data.len() != count {
            return Err(UFuncError::ShapeMismatch(dims.to_vec(), vec![data.len()]));
        }
        let mut out = Self::zeros(dims, T::DTYPE)?;
        let size = T::DTYPE.itemsize();
        let ptr = out.base_ptr_mut();
        for (i, value) in data.into_iter().enumerate() {
            unsafe { value.store(ptr.add(i * size)) };
        }
        Ok(out)
    }

    /// Row-major native array with values produced by a function of the index.
    pub fn from_fn<T: Element>(dims: &[usize], mut f: impl FnMut(&[usize]) -> T) -> Result<Self> {
        let mut data = Vec::with_capacity(dims.iter().product());
        for_each_index(dims, |idx| data.push(f(idx)));
        Self::from_vec(dims, data)
    }

    /// Zero-dimensional array holding one value.
    pub fn scalar<T: Element>(value: T) -> Result<Self> {
        Self::from_vec(&[], vec![value])
    }

    /// Copy raw bytes into aligned storage and describe them with the given layout.
    ///
    /// The offset is preserved relative to the new storage, so a misaligned
    /// offset stays misaligned.
    pub fn from_bytes(
        bytes: &[u8],
        dims: &[usize],
        strides: &[isize],
        offset: usize,
        descr: impl Into<TypeDescr>,
    ) -> Result<Self> {
        let descr = descr.into();
        validate_bounds(bytes.len(), dims, strides, offset, descr.itemsize())?;
        let mut words = alloc_words(bytes.len())?;
        bytemuck::cast_slice_mut::<u64, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            words,
            nbytes: bytes.len(),
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            offset,
            descr,
        })
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn descr(&self) -> TypeDescr {
        self.descr
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.descr.dtype
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// The whole backing storage.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.nbytes]
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        let nbytes = self.nbytes;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..nbytes]
    }

    /// Mutable pointer to the element at the all-zero index.
    #[inline]
    pub(crate) fn base_ptr_mut(&mut self) -> *mut u8 {
        let offset = self.offset;
        self.bytes_mut().as_mut_ptr().wrapping_add(offset)
    }

    pub fn view(&self) -> ArrayView<'_> {
        ArrayView {
            data: self.bytes(),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            descr: self.descr,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.view().is_aligned()
    }

    pub fn get<T: Element>(&self, index: &[usize]) -> Result<T> {
        self.view().get(index)
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.view().to_vec()
    }

    /// Write one element.
    pub fn set<T: Element>(&mut self, index: &[usize], value: T) -> Result<()> {
        check_element::<T>(self.descr)?;
        let pos = element_offset(&self.dims, &self.strides, self.offset, index)?;
        let descr = self.descr;
        let ptr = self.bytes_mut().as_mut_ptr();
        unsafe { write_element(ptr.offset(pos), descr, value) };
        Ok(())
    }

    /// Row-major copy converted to `dtype` in native byte order.
    pub fn as_type(&self, dtype: DType) -> Result<NdArray> {
        self.view().to_owned_as(dtype)
    }

    /// Row-major copy with the same values stored in `byte_order`.
    pub fn to_byte_order(&self, byte_order: ByteOrder) -> Result<NdArray> {
        let mut out = NdArray::zeros(
            &self.dims,
            TypeDescr::with_byte_order(self.descr.dtype, byte_order),
        )?;
        crate::cast::copy_into(&mut out, &self.view())?;
        Ok(out)
    }

    /// Reorder axes without touching data.
    pub fn permute(mut self, perm: &[usize]) -> Result<Self> {
        let (dims, strides) = {
            let view = self.view().permute(perm)?;
            (view.dims, view.strides)
        };
        self.dims = dims;
        self.strides = strides;
        Ok(self)
    }

    /// Reinterpret a row-major array with new dims of the same total size.
    pub fn reshape(mut self, dims: &[usize]) -> Result<Self> {
        let count: usize = dims.iter().product();
        if count != self.len() {
            return Err(UFuncError::ShapeMismatch(self.dims.clone(), dims.to_vec()));
        }
        if !self.view().is_c_contiguous() {
            return Err(UFuncError::InvalidLayout("reshape requires a row-major array"));
        }
        self.strides = c_strides(dims, self.descr.itemsize());
        self.dims = dims.to_vec();
        Ok(self)
    }
}
