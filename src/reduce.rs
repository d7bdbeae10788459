//! Reduce, accumulate and reduceat along one axis.
//!
//! All three run the ufunc's `(T, T) -> T` loop with one operand aliased to
//! the accumulator. Internally the reduced axis is moved last for both the
//! input and the work array; the work array is native and of the loop type.
//! Work along the axis is split into calls of at most `buffer_size`
//! elements, each followed by the usual floating-point and host-error
//! checks. An input that is misaligned, byte-swapped or of another type is
//! gathered and cast one call at a time through the same scratch buffers as
//! the buffered executor.

use std::ptr;

use crate::array::{ArrayView, NdArray};
use crate::cast::copy_into;
use crate::config::ReduceOptions;
use crate::dispatch::{format_signature, ResolvedLoop};
use crate::dtype::{DType, TypeDescr};
use crate::element::scalar_bytes;
use crate::execute::{ChunkGuard, Stage};
use crate::fpe::FpChecker;
use crate::iter::LoopPlan;
use crate::ufunc::UFunc;
use crate::{Result, UFuncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode<'i> {
    Reduce,
    Accumulate,
    ReduceAt(&'i [usize]),
}

/// Resolved state shared by the reduce family.
struct Reduction {
    resolved: ResolvedLoop,
    otype: DType,
    /// Layout of the input elements as stored.
    src_descr: TypeDescr,
    itemsize: usize,
    chunk: usize,
    identity: Option<Vec<u8>>,
}

impl Reduction {
    /// Pointer and step of `n` input elements at `base` as loop elements.
    ///
    /// # Safety
    /// `base` must be valid for `n` reads at `step`.
    unsafe fn load(&self, stage: &mut Stage, base: *const u8, step: isize, n: usize) -> (*mut u8, isize) {
        stage.fill(base, step, n, self.src_descr);
        stage.working(base as *mut u8, step, self.otype)
    }

    /// Fold `count` input elements starting at `src` into the element at `acc`.
    ///
    /// # Safety
    /// `src` must be valid for `count` reads at `step`, `acc` for one element.
    unsafe fn fold(
        &self,
        stage: &mut Stage,
        acc: *mut u8,
        src: *const u8,
        step: isize,
        count: usize,
        guard: &mut ChunkGuard<'_>,
    ) -> Result<()> {
        let f = self.resolved.function;
        let mut done = 0usize;
        while done < count {
            let n = (count - done).min(self.chunk);
            let (p, s) = self.load(stage, src.wrapping_offset(done as isize * step), step, n);
            f(&[acc, p, acc], &[n], &[0, s, 0], &self.resolved.data);
            guard.after_chunk()?;
            done += n;
        }
        Ok(())
    }

    /// Running fold: `dst[i] = f(dst[i-1], src[i])` for `i` in `1..count`.
    ///
    /// # Safety
    /// `src` and `dst` must be valid for `count` elements at their steps.
    #[allow(clippy::too_many_arguments)]
    unsafe fn scan(
        &self,
        stage: &mut Stage,
        dst: *mut u8,
        dst_step: isize,
        src: *const u8,
        src_step: isize,
        count: usize,
        guard: &mut ChunkGuard<'_>,
    ) -> Result<()> {
        let f = self.resolved.function;
        let mut done = 1usize;
        while done < count {
            let n = (count - done).min(self.chunk);
            let i = done as isize;
            let (p, s) = self.load(stage, src.wrapping_offset(i * src_step), src_step, n);
            let args = [dst.wrapping_offset((i - 1) * dst_step), p, dst.wrapping_offset(i * dst_step)];
            f(&args, &[n], &[dst_step, s, dst_step], &self.resolved.data);
            guard.after_chunk()?;
            done += n;
        }
        Ok(())
    }

    unsafe fn write_identity(&self, dst: *mut u8) {
        if let Some(bytes) = &self.identity {
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst, self.itemsize);
        }
    }

    unsafe fn copy_first(&self, stage: &mut Stage, src: *const u8, step: isize, dst: *mut u8) {
        let (p, _) = self.load(stage, src, step, 1);
        ptr::copy_nonoverlapping(p, dst, self.itemsize);
    }
}

/// Axis order that moves `axis` last.
fn axis_last(ndim: usize, axis: usize) -> Vec<usize> {
    (0..ndim).filter(|&d| d != axis).chain(std::iter::once(axis)).collect()
}

/// Inverse of [`axis_last`].
fn axis_back(ndim: usize, axis: usize) -> Vec<usize> {
    (0..ndim)
        .map(|p| match p.cmp(&axis) {
            std::cmp::Ordering::Less => p,
            std::cmp::Ordering::Equal => ndim - 1,
            std::cmp::Ordering::Greater => p - 1,
        })
        .collect()
}

impl UFunc {
    /// Combine all elements along `axis`.
    ///
    /// The axis is removed from the result, or kept with size 1 when
    /// `opts.keepdims` is set. An empty axis yields the identity.
    pub fn reduce(&self, input: &ArrayView<'_>, axis: usize, opts: ReduceOptions<'_>) -> Result<NdArray> {
        self.reduce_family(input, axis, Mode::Reduce, opts)
    }

    /// Running combination along `axis`; the result has the input's shape.
    pub fn accumulate(&self, input: &ArrayView<'_>, axis: usize, opts: ReduceOptions<'_>) -> Result<NdArray> {
        self.reduce_family(input, axis, Mode::Accumulate, opts)
    }

    /// Reduce the ranges `[indices[j], indices[j + 1])` (the last one running
    /// to the end of the axis) independently.
    ///
    /// An empty range writes the identity when the ufunc has one and leaves
    /// the output slot unmodified otherwise.
    pub fn reduceat(
        &self,
        input: &ArrayView<'_>,
        axis: usize,
        indices: &[usize],
        opts: ReduceOptions<'_>,
    ) -> Result<NdArray> {
        self.reduce_family(input, axis, Mode::ReduceAt(indices), opts)
    }

    fn reduce_family(&self, input: &ArrayView<'_>, axis: usize, mode: Mode<'_>, opts: ReduceOptions<'_>) -> Result<NdArray> {
        if self.nin != 2 || self.nout != 1 || self.is_generalized() {
            return Err(UFuncError::ReductionUnsupported(self.name.clone()));
        }
        let ndim = input.ndim();
        if axis >= ndim {
            return Err(UFuncError::InvalidAxis { axis, rank: ndim });
        }
        let len = input.dims()[axis];

        let otype = opts
            .dtype
            .or_else(|| opts.out.as_ref().map(|o| o.dtype()))
            .unwrap_or_else(|| input.dtype());
        let resolved = self.resolve_types(&[otype, otype], &[Some(otype)])?;
        if resolved.types.iter().any(|&t| t != otype) {
            return Err(UFuncError::NoMatchingLoop {
                ufunc: self.name.clone(),
                types: format_signature(&[otype, otype, otype], 2),
            });
        }
        let config = &opts.config;
        if resolved.is_object() && !config.sink().host_api_available() {
            return Err(UFuncError::HostApiRequired(self.name.clone()));
        }
        let identity = self.identity.value().map(|v| scalar_bytes(v, otype));
        if len == 0 && identity.is_none() {
            return Err(UFuncError::ZeroSizeReduction(self.name.clone()));
        }
        if let Mode::ReduceAt(indices) = mode {
            if let Some(&index) = indices.iter().find(|&&i| i >= len) {
                return Err(UFuncError::IndexOutOfBounds { index, len });
            }
        }

        // Result shape in the caller's axis order.
        let mut final_dims = input.dims().to_vec();
        let mut keep_axis = true;
        match mode {
            Mode::Reduce if opts.keepdims => final_dims[axis] = 1,
            Mode::Reduce => {
                final_dims.remove(axis);
                keep_axis = false;
            }
            Mode::Accumulate => {}
            Mode::ReduceAt(indices) => final_dims[axis] = indices.len(),
        }
        let out = opts.out;
        if let Some(out) = &out {
            if out.dims() != final_dims.as_slice() {
                return Err(UFuncError::ShapeMismatch(out.dims().to_vec(), final_dims));
            }
        }

        // Work array in axis-last order.
        let forward = axis_last(ndim, axis);
        let mut work_dims: Vec<usize> = forward.iter().map(|&d| input.dims()[d]).collect();
        let m = match mode {
            Mode::Reduce => 1,
            Mode::Accumulate => len,
            Mode::ReduceAt(indices) => indices.len(),
        };
        if let Some(last) = work_dims.last_mut() {
            *last = m;
        }
        let mut work = match &out {
            Some(out) if keep_axis => out.view().permute(&forward)?.to_owned_as(otype)?,
            Some(out) => out.view().to_owned_as(otype)?.reshape(&work_dims)?,
            None => NdArray::zeros(&work_dims, otype)?,
        };

        let src = input.permute(&forward)?;
        let src_descr = input.descr();
        let buffered = src_descr.dtype != otype || src_descr.needs_swap() || !input.is_aligned();
        let chunk = config.resolved_buffer_size()?.min(len).max(1);
        let mut stage = Stage::for_types(src_descr, otype, buffered, true, chunk)?;

        let red = Reduction {
            itemsize: otype.itemsize(),
            chunk,
            identity,
            otype,
            src_descr,
            resolved,
        };
        tracing::debug!(
            ufunc = %self.name,
            ?mode,
            axis,
            otype = %red.otype,
            shape = ?input.dims(),
            buffered,
            "executing reduction"
        );

        let checker = FpChecker::new(&self.name, config.error_mask, config.sink(), config.status());
        let needs_api = red.resolved.is_object() || self.check_return;
        let mut guard = ChunkGuard::new(&self.name, checker, needs_api);

        let outer_dims = &work_dims[..ndim - 1];
        let src_outer = &src.strides()[..ndim - 1];
        let src_step = src.strides()[ndim - 1];
        let dst_step = work.strides()[ndim - 1];
        let work_outer = work.strides()[..ndim - 1].to_vec();
        let plan = LoopPlan::new(outer_dims, &[src_outer, &work_outer], &[1, 2]);
        let src_base = src.ptr();
        let dst_base = work.base_ptr_mut();

        plan.for_each_outer(|offsets| {
            for i in 0..plan.inner_len as isize {
                let s = src_base.wrapping_offset(offsets[0] + i * plan.inner_strides[0]);
                let d = dst_base.wrapping_offset(offsets[1] + i * plan.inner_strides[1]);
                unsafe {
                    match mode {
                        Mode::Reduce if len == 0 => red.write_identity(d),
                        Mode::Reduce => {
                            red.copy_first(&mut stage, s, src_step, d);
                            let rest = s.wrapping_offset(src_step);
                            red.fold(&mut stage, d, rest, src_step, len - 1, &mut guard)?;
                        }
                        Mode::Accumulate => {
                            if len > 0 {
                                red.copy_first(&mut stage, s, src_step, d);
                                red.scan(&mut stage, d, dst_step, s, src_step, len, &mut guard)?;
                            }
                        }
                        Mode::ReduceAt(indices) => {
                            for (j, &start) in indices.iter().enumerate() {
                                let end = indices.get(j + 1).copied().unwrap_or(len);
                                let slot = d.wrapping_offset(j as isize * dst_step);
                                if end <= start {
                                    red.write_identity(slot);
                                    continue;
                                }
                                let first = s.wrapping_offset(start as isize * src_step);
                                red.copy_first(&mut stage, first, src_step, slot);
                                let rest = first.wrapping_offset(src_step);
                                red.fold(&mut stage, slot, rest, src_step, end - start - 1, &mut guard)?;
                            }
                        }
                    }
                }
            }
            Ok(())
        })?;

        let arranged = if keep_axis {
            work.permute(&axis_back(ndim, axis))?
        } else {
            work.reshape(&final_dims)?
        };
        if let Some(mut target) = out {
            copy_into(&mut target, &arranged.view())?;
            return Ok(target);
        }
        if arranged.view().is_c_contiguous() {
            Ok(arranged)
        } else {
            arranged.view().to_owned_as(otype)
        }
    }
}
