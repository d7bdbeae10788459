//! Loop execution.
//!
//! One invocation runs in one of three strategies:
//!
//! - [`LoopMethod::Plain`]: every operand is aligned, in native byte order and
//!   of its resolved type. The inner loop is called once per outer position
//!   directly on the operands' memory.
//! - [`LoopMethod::Buffered`]: at least one operand needs a cast, a byte swap
//!   or realignment. The innermost axis is walked in chunks of at most
//!   `buffer_size` elements; such operands are gathered, swapped and cast
//!   into scratch buffers (inputs) or cast, swapped and scattered back
//!   (outputs) around each call.
//! - [`LoopMethod::SignatureNoBuffer`]: generalized ufuncs. Core sizes and
//!   core strides are passed to the inner loop after the loop count and loop
//!   steps. Operands that would need buffering are staged whole into native
//!   copies first, and staged outputs are copied back at the end.
//!
//! Floating-point status and the host error channel are checked after every
//! chunk. A failure stops execution after the chunk that produced it; output
//! already written stays written.

use std::ptr;

use smallvec::{smallvec, SmallVec};

use crate::array::{ArrayView, NdArray};
use crate::broadcast::{broadcast_operands, broadcast_strides, Geometry};
use crate::cast::{byte_swap, cast_fn, copy_into, gather, scatter, CastFn, ScratchBuffer};
use crate::config::InvokeOptions;
use crate::dispatch::{format_signature, ResolvedLoop};
use crate::dtype::{DType, TypeDescr};
use crate::fpe::FpChecker;
use crate::iter::LoopPlan;
use crate::ufunc::UFunc;
use crate::{Result, UFuncError};

/// Execution strategy of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopMethod {
    Plain,
    Buffered,
    SignatureNoBuffer,
}

// ============================================================================
// Per-chunk checks
// ============================================================================

/// Host-error and floating-point checks run after every chunk.
pub(crate) struct ChunkGuard<'a> {
    ufunc: &'a str,
    checker: FpChecker<'a>,
    needs_api: bool,
}

impl<'a> ChunkGuard<'a> {
    pub(crate) fn new(ufunc: &'a str, checker: FpChecker<'a>, needs_api: bool) -> Self {
        checker.start();
        Self {
            ufunc,
            checker,
            needs_api,
        }
    }

    pub(crate) fn after_chunk(&mut self) -> Result<()> {
        if self.needs_api {
            if let Some(message) = self.checker.sink().take_host_error() {
                return Err(UFuncError::InnerLoop {
                    ufunc: self.ufunc.to_string(),
                    message,
                });
            }
        }
        self.checker.check()
    }
}

// ============================================================================
// Operands
// ============================================================================

/// One argument as seen by the loop: base pointer plus loop and core strides.
pub(crate) struct Operand {
    pub(crate) ptr: *mut u8,
    pub(crate) descr: TypeDescr,
    pub(crate) resolved: DType,
    /// True if the loop cannot read or write this operand in place.
    pub(crate) buffered: bool,
    pub(crate) loop_strides: Vec<isize>,
    pub(crate) core_strides: Vec<isize>,
}

impl Operand {
    /// Describe `view` (whose data starts at `ptr`) for a loop over `loop_dims`.
    ///
    /// The trailing `ncore` axes are core axes; the rest broadcast to `loop_dims`.
    pub(crate) fn new(
        ptr: *mut u8,
        view: &ArrayView<'_>,
        resolved: DType,
        ncore: usize,
        loop_dims: &[usize],
    ) -> Result<Self> {
        let descr = view.descr();
        let split = view.ndim() - ncore;
        let loop_strides = broadcast_strides(loop_dims, &view.dims()[..split], &view.strides()[..split])?;
        Ok(Self {
            ptr,
            descr,
            resolved,
            buffered: descr.dtype != resolved || descr.needs_swap() || !view.is_aligned(),
            loop_strides,
            core_strides: view.strides()[split..].to_vec(),
        })
    }
}

/// Stride weights for axis ordering: outputs count double.
fn weights(nin: usize, nargs: usize) -> Vec<usize> {
    (0..nargs).map(|k| if k < nin { 1 } else { 2 }).collect()
}

fn plan_for(ops: &[Operand], loop_dims: &[usize], nin: usize) -> LoopPlan {
    let strides: Vec<&[isize]> = ops.iter().map(|o| o.loop_strides.as_slice()).collect();
    LoopPlan::new(loop_dims, &strides, &weights(nin, ops.len()))
}

// ============================================================================
// Chunk staging
// ============================================================================

/// Scratch state of one buffered operand.
pub(crate) struct Stage {
    /// Elements in the operand's own type and byte order.
    raw: Option<ScratchBuffer>,
    /// Elements in the resolved type, when a cast is needed.
    castbuf: Option<ScratchBuffer>,
    cast: Option<CastFn>,
}

impl Stage {
    pub(crate) fn new(op: &Operand, is_input: bool, chunk: usize) -> Result<Self> {
        Self::for_types(op.descr, op.resolved, op.buffered, is_input, chunk)
    }

    /// Stage between memory described by `descr` and loop elements of `resolved`.
    pub(crate) fn for_types(descr: TypeDescr, resolved: DType, buffered: bool, is_input: bool, chunk: usize) -> Result<Self> {
        if !buffered {
            return Ok(Self {
                raw: None,
                castbuf: None,
                cast: None,
            });
        }
        let raw = ScratchBuffer::new(chunk * descr.itemsize())?;
        let (castbuf, cast) = if descr.dtype != resolved {
            let (from, to) = if is_input {
                (descr.dtype, resolved)
            } else {
                (resolved, descr.dtype)
            };
            let f = cast_fn(from, to).ok_or(UFuncError::UnsupportedCast { from, to })?;
            (Some(ScratchBuffer::new(chunk * resolved.itemsize())?), Some(f))
        } else {
            (None, None)
        };
        Ok(Self {
            raw: Some(raw),
            castbuf,
            cast,
        })
    }

    /// Pointer and step the inner loop uses for this operand.
    pub(crate) fn working(&mut self, base: *mut u8, stride: isize, resolved: DType) -> (*mut u8, isize) {
        let step = resolved.itemsize() as isize;
        match (self.castbuf.as_mut(), self.raw.as_mut()) {
            (Some(buf), _) => (buf.as_mut_ptr(), step),
            (None, Some(raw)) => (raw.as_mut_ptr(), step),
            (None, None) => (base, stride),
        }
    }

    /// Gather, swap and cast `n` input elements starting at `base`.
    ///
    /// # Safety
    /// `base` must be valid for `n` reads at `stride`.
    pub(crate) unsafe fn fill(&mut self, base: *const u8, stride: isize, n: usize, descr: TypeDescr) {
        let Some(raw) = self.raw.as_mut() else {
            return;
        };
        gather(base, stride, n, descr.itemsize(), raw.as_mut_ptr());
        if descr.needs_swap() {
            byte_swap(raw.as_mut_slice(), descr.dtype, n);
        }
        if let (Some(buf), Some(f)) = (self.castbuf.as_mut(), self.cast) {
            f(raw.as_mut_ptr(), buf.as_mut_ptr(), n);
        }
    }

    /// Cast, swap and scatter `n` output elements to `base`.
    ///
    /// # Safety
    /// `base` must be valid for `n` writes at `stride`.
    pub(crate) unsafe fn flush(&mut self, base: *mut u8, stride: isize, n: usize, descr: TypeDescr) {
        let Some(raw) = self.raw.as_mut() else {
            return;
        };
        if let (Some(buf), Some(f)) = (self.castbuf.as_mut(), self.cast) {
            f(buf.as_mut_ptr(), raw.as_mut_ptr(), n);
        }
        if descr.needs_swap() {
            byte_swap(raw.as_mut_slice(), descr.dtype, n);
        }
        scatter(raw.as_mut_ptr(), n, descr.itemsize(), base, stride);
    }
}

// ============================================================================
// Strategies
// ============================================================================

fn run_plain(ops: &[Operand], loop_dims: &[usize], nin: usize, resolved: &ResolvedLoop, guard: &mut ChunkGuard<'_>) -> Result<()> {
    let plan = plan_for(ops, loop_dims, nin);
    let f = resolved.function;
    let dims = [plan.inner_len];
    let mut args: SmallVec<[*mut u8; 4]> = smallvec![ptr::null_mut(); ops.len()];
    plan.for_each_outer(|offsets| {
        for (k, op) in ops.iter().enumerate() {
            args[k] = op.ptr.wrapping_offset(offsets[k]);
        }
        unsafe { f(&args, &dims, &plan.inner_strides, &resolved.data) };
        guard.after_chunk()
    })
}

fn run_buffered(
    ops: &[Operand],
    loop_dims: &[usize],
    nin: usize,
    resolved: &ResolvedLoop,
    buffer_size: usize,
    guard: &mut ChunkGuard<'_>,
) -> Result<()> {
    let plan = plan_for(ops, loop_dims, nin);
    let chunk = plan.inner_len.min(buffer_size).max(1);
    let mut stages = Vec::with_capacity(ops.len());
    for (k, op) in ops.iter().enumerate() {
        stages.push(Stage::new(op, k < nin, chunk)?);
    }
    let f = resolved.function;
    let mut args: SmallVec<[*mut u8; 4]> = smallvec![ptr::null_mut(); ops.len()];
    let mut steps: SmallVec<[isize; 4]> = smallvec![0; ops.len()];

    plan.for_each_outer(|offsets| {
        let mut done = 0usize;
        while done < plan.inner_len {
            let n = (plan.inner_len - done).min(chunk);
            for (k, op) in ops.iter().enumerate() {
                let stride = plan.inner_strides[k];
                let base = op.ptr.wrapping_offset(offsets[k] + done as isize * stride);
                if k < nin {
                    unsafe { stages[k].fill(base, stride, n, op.descr) };
                }
                (args[k], steps[k]) = stages[k].working(base, stride, op.resolved);
            }
            unsafe { f(&args, &[n], &steps, &resolved.data) };
            for (k, op) in ops.iter().enumerate().skip(nin) {
                let stride = plan.inner_strides[k];
                let base = op.ptr.wrapping_offset(offsets[k] + done as isize * stride);
                unsafe { stages[k].flush(base, stride, n, op.descr) };
            }
            tracing::trace!(offset = done, len = n, "buffered chunk");
            guard.after_chunk()?;
            done += n;
        }
        Ok(())
    })
}

fn run_signature(ops: &[Operand], geometry: &Geometry, nin: usize, resolved: &ResolvedLoop, guard: &mut ChunkGuard<'_>) -> Result<()> {
    let plan = plan_for(ops, &geometry.loop_dims, nin);
    let f = resolved.function;
    let mut dimensions = Vec::with_capacity(1 + geometry.core_sizes.len());
    dimensions.push(plan.inner_len);
    dimensions.extend_from_slice(&geometry.core_sizes);
    let mut steps = plan.inner_strides.clone();
    for op in ops {
        steps.extend_from_slice(&op.core_strides);
    }
    let mut args: SmallVec<[*mut u8; 4]> = smallvec![ptr::null_mut(); ops.len()];
    plan.for_each_outer(|offsets| {
        for (k, op) in ops.iter().enumerate() {
            args[k] = op.ptr.wrapping_offset(offsets[k]);
        }
        unsafe { f(&args, &dimensions, &steps, &resolved.data) };
        guard.after_chunk()
    })
}

// ============================================================================
// Invocation
// ============================================================================

/// Resolution and shape results shared by `invoke` and `invoke_into`.
struct CallPlan {
    resolved: ResolvedLoop,
    geometry: Geometry,
    buffer_size: usize,
}

impl UFunc {
    /// Apply the ufunc with default options, allocating all outputs.
    pub fn call(&self, inputs: &[ArrayView<'_>]) -> Result<Vec<NdArray>> {
        self.invoke(inputs, Vec::new(), &InvokeOptions::default())
    }

    /// Apply the ufunc.
    ///
    /// `outputs[k]` may hold a caller-provided output with exactly the loop
    /// shape; missing or `None` entries are allocated with the broadcast shape
    /// and the resolved type. Returns all outputs.
    pub fn invoke(
        &self,
        inputs: &[ArrayView<'_>],
        outputs: Vec<Option<NdArray>>,
        opts: &InvokeOptions<'_>,
    ) -> Result<Vec<NdArray>> {
        if outputs.len() > self.nout {
            return Err(UFuncError::OperandCountMismatch {
                expected: self.nout,
                found: outputs.len(),
            });
        }
        let mut outputs = outputs;
        outputs.resize_with(self.nout, || None);
        let call = {
            let out_dims: Vec<Option<&[usize]>> = outputs.iter().map(|o| o.as_ref().map(|a| a.dims())).collect();
            self.plan_call(inputs, &out_dims, opts)?
        };

        let mut outs = Vec::with_capacity(self.nout);
        for (j, out) in outputs.into_iter().enumerate() {
            match out {
                Some(array) => outs.push(array),
                None => outs.push(NdArray::zeros(
                    &call.geometry.out_dims[j],
                    call.resolved.types[self.nin + j],
                )?),
            }
        }
        self.execute(inputs, &mut outs, &call, opts)?;
        Ok(outs)
    }

    /// Apply the ufunc into caller-owned outputs.
    ///
    /// On an execution error the outputs keep whatever the completed chunks
    /// wrote.
    pub fn invoke_into(&self, inputs: &[ArrayView<'_>], outputs: &mut [NdArray], opts: &InvokeOptions<'_>) -> Result<()> {
        if outputs.len() != self.nout {
            return Err(UFuncError::OperandCountMismatch {
                expected: self.nout,
                found: outputs.len(),
            });
        }
        let call = {
            let out_dims: Vec<Option<&[usize]>> = outputs.iter().map(|a| Some(a.dims())).collect();
            self.plan_call(inputs, &out_dims, opts)?
        };
        self.execute(inputs, outputs, &call, opts)
    }

    /// Strategy an invocation with freshly allocated outputs would use.
    pub fn loop_method(&self, inputs: &[ArrayView<'_>], opts: &InvokeOptions<'_>) -> Result<LoopMethod> {
        if self.is_generalized() {
            return Ok(LoopMethod::SignatureNoBuffer);
        }
        let call = self.plan_call(inputs, &[], opts)?;
        for (k, view) in inputs.iter().enumerate() {
            let op = Operand::new(view.ptr() as *mut u8, view, call.resolved.types[k], 0, &call.geometry.loop_dims)?;
            if op.buffered {
                return Ok(LoopMethod::Buffered);
            }
        }
        Ok(LoopMethod::Plain)
    }

    fn plan_call(&self, inputs: &[ArrayView<'_>], out_dims: &[Option<&[usize]>], opts: &InvokeOptions<'_>) -> Result<CallPlan> {
        if inputs.len() != self.nin {
            return Err(UFuncError::OperandCountMismatch {
                expected: self.nin,
                found: inputs.len(),
            });
        }
        let buffer_size = opts.config.resolved_buffer_size()?;
        let in_types: Vec<DType> = inputs.iter().map(|v| v.dtype()).collect();
        let resolved = self.resolve_types(&in_types, &opts.output_types)?;
        if resolved.is_object() && !opts.config.sink().host_api_available() {
            return Err(UFuncError::HostApiRequired(self.name.clone()));
        }
        let in_dims: Vec<&[usize]> = inputs.iter().map(|v| v.dims()).collect();
        let mut padded: Vec<Option<&[usize]>> = out_dims.to_vec();
        padded.resize(self.nout, None);
        let geometry = broadcast_operands(self, &in_dims, &padded)?;
        Ok(CallPlan {
            resolved,
            geometry,
            buffer_size,
        })
    }

    fn execute(&self, inputs: &[ArrayView<'_>], outs: &mut [NdArray], call: &CallPlan, opts: &InvokeOptions<'_>) -> Result<()> {
        if let Some(prepare) = opts.prepare_outputs {
            prepare(self, outs)?;
            for (out, dims) in outs.iter().zip(&call.geometry.out_dims) {
                if out.dims() != dims.as_slice() {
                    return Err(UFuncError::ShapeMismatch(out.dims().to_vec(), dims.clone()));
                }
            }
        }
        if call.geometry.loop_dims.iter().any(|&d| d == 0) {
            tracing::debug!(ufunc = %self.name, "empty loop shape, nothing to execute");
            return Ok(());
        }

        let config = &opts.config;
        let checker = FpChecker::new(&self.name, config.error_mask, config.sink(), config.status());
        let needs_api = call.resolved.is_object() || self.check_return;
        let mut guard = ChunkGuard::new(&self.name, checker, needs_api);

        if self.is_generalized() {
            return self.execute_generalized(inputs, outs, call, &mut guard);
        }

        let loop_dims = &call.geometry.loop_dims;
        let types = &call.resolved.types;
        let mut ops = Vec::with_capacity(self.nargs());
        for (k, view) in inputs.iter().enumerate() {
            ops.push(Operand::new(view.ptr() as *mut u8, view, types[k], 0, loop_dims)?);
        }
        for (j, out) in outs.iter_mut().enumerate() {
            let ptr = out.base_ptr_mut();
            ops.push(Operand::new(ptr, &out.view(), types[self.nin + j], 0, loop_dims)?);
        }

        let method = if ops.iter().any(|o| o.buffered) {
            LoopMethod::Buffered
        } else {
            LoopMethod::Plain
        };
        tracing::debug!(
            ufunc = %self.name,
            loop_types = %format_signature(types, self.nin),
            ?method,
            shape = ?loop_dims,
            "executing ufunc"
        );
        match method {
            LoopMethod::Plain => run_plain(&ops, loop_dims, self.nin, &call.resolved, &mut guard),
            _ => run_buffered(&ops, loop_dims, self.nin, &call.resolved, call.buffer_size, &mut guard),
        }
    }

    fn execute_generalized(
        &self,
        inputs: &[ArrayView<'_>],
        outs: &mut [NdArray],
        call: &CallPlan,
        guard: &mut ChunkGuard<'_>,
    ) -> Result<()> {
        let loop_dims = &call.geometry.loop_dims;
        let types = &call.resolved.types;
        let mut ops = Vec::with_capacity(self.nargs());

        // Staged copies must outlive the loop.
        let mut staged_in: Vec<NdArray> = Vec::new();
        for (k, view) in inputs.iter().enumerate() {
            let ncore = self.core_ndim(k);
            let mut op = Operand::new(view.ptr() as *mut u8, view, types[k], ncore, loop_dims)?;
            if op.buffered {
                let copy = view.to_owned_as(types[k])?;
                let copy_view = copy.view();
                op = Operand::new(copy_view.ptr() as *mut u8, &copy_view, types[k], ncore, loop_dims)?;
                drop(copy_view);
                staged_in.push(copy);
            }
            ops.push(op);
        }
        let mut staged_out: Vec<(usize, NdArray)> = Vec::new();
        for (j, out) in outs.iter_mut().enumerate() {
            let resolved = types[self.nin + j];
            let ncore = self.core_ndim(self.nin + j);
            let ptr = out.base_ptr_mut();
            let mut op = Operand::new(ptr, &out.view(), resolved, ncore, loop_dims)?;
            if op.buffered {
                let mut tmp = NdArray::zeros(out.dims(), resolved)?;
                let ptr = tmp.base_ptr_mut();
                op = Operand::new(ptr, &tmp.view(), resolved, ncore, loop_dims)?;
                staged_out.push((j, tmp));
            }
            ops.push(op);
        }

        tracing::debug!(
            ufunc = %self.name,
            loop_types = %format_signature(types, self.nin),
            method = ?LoopMethod::SignatureNoBuffer,
            shape = ?loop_dims,
            core = ?call.geometry.core_sizes,
            staged = staged_in.len() + staged_out.len(),
            "executing generalized ufunc"
        );
        let result = run_signature(&ops, &call.geometry, self.nin, &call.resolved, guard);

        let mut copied = Ok(());
        for (j, tmp) in &staged_out {
            if let Err(e) = copy_into(&mut outs[*j], &tmp.view()) {
                copied = copied.and(Err(e));
            }
        }
        result.and(copied)
    }
}
