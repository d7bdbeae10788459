//! Per-call execution settings.

use crate::dtype::DType;
use crate::fpe::{DefaultErrorSink, ErrorMask, ErrorSink, FpStatusSource, ThreadFpStatus};
use crate::ufunc::UFunc;
use crate::{NdArray, Result, UFuncError, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};

static DEFAULT_SINK: DefaultErrorSink = DefaultErrorSink;
static THREAD_STATUS: ThreadFpStatus = ThreadFpStatus;

/// Settings shared by every execution path.
#[derive(Clone, Copy)]
pub struct ExecConfig<'a> {
    /// Buffer size in elements; 0 selects [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: usize,
    pub error_mask: ErrorMask,
    /// Receiver of notifications; `None` uses [`DefaultErrorSink`].
    pub error_sink: Option<&'a dyn ErrorSink>,
    /// Status register; `None` uses the calling thread's register.
    pub fp_status: Option<&'a dyn FpStatusSource>,
}

impl Default for ExecConfig<'_> {
    fn default() -> Self {
        Self {
            buffer_size: 0,
            error_mask: ErrorMask::DEFAULT,
            error_sink: None,
            fp_status: None,
        }
    }
}

impl std::fmt::Debug for ExecConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecConfig")
            .field("buffer_size", &self.buffer_size)
            .field("error_mask", &self.error_mask)
            .field("error_sink", &self.error_sink.is_some())
            .field("fp_status", &self.fp_status.is_some())
            .finish()
    }
}

impl<'a> ExecConfig<'a> {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_error_mask(mut self, mask: ErrorMask) -> Self {
        self.error_mask = mask;
        self
    }

    pub fn with_error_sink(mut self, sink: &'a dyn ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn with_fp_status(mut self, status: &'a dyn FpStatusSource) -> Self {
        self.fp_status = Some(status);
        self
    }

    /// Effective buffer size in elements.
    pub(crate) fn resolved_buffer_size(&self) -> Result<usize> {
        match self.buffer_size {
            0 => Ok(DEFAULT_BUFFER_SIZE),
            n if (MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&n) => Ok(n),
            n => Err(UFuncError::InvalidBufferSize(n)),
        }
    }

    pub(crate) fn sink(&self) -> &'a dyn ErrorSink {
        self.error_sink.unwrap_or(&DEFAULT_SINK)
    }

    pub(crate) fn status(&self) -> &'a dyn FpStatusSource {
        self.fp_status.unwrap_or(&THREAD_STATUS)
    }
}

/// Hook run after outputs are allocated and before any loop executes.
pub type PrepareOutputs<'a> = &'a dyn Fn(&UFunc, &mut [NdArray]) -> Result<()>;

/// Options of [`UFunc::invoke`].
#[derive(Default)]
pub struct InvokeOptions<'a> {
    pub config: ExecConfig<'a>,
    /// Requested output types; `None` entries are resolved by dispatch.
    pub output_types: Vec<Option<DType>>,
    pub prepare_outputs: Option<PrepareOutputs<'a>>,
}

impl<'a> InvokeOptions<'a> {
    pub fn with_config(mut self, config: ExecConfig<'a>) -> Self {
        self.config = config;
        self
    }

    pub fn with_output_types(mut self, types: Vec<Option<DType>>) -> Self {
        self.output_types = types;
        self
    }

    pub fn with_prepare_outputs(mut self, hook: PrepareOutputs<'a>) -> Self {
        self.prepare_outputs = Some(hook);
        self
    }
}

/// Options of the reduce family.
#[derive(Debug, Default)]
pub struct ReduceOptions<'a> {
    pub config: ExecConfig<'a>,
    /// Accumulator and output type; defaults to `out`'s type, then the input type.
    pub dtype: Option<DType>,
    /// Caller-provided output; must have the result shape.
    pub out: Option<NdArray>,
    /// Keep the reduced axis as size 1 (`reduce` only).
    pub keepdims: bool,
}

impl<'a> ReduceOptions<'a> {
    pub fn with_config(mut self, config: ExecConfig<'a>) -> Self {
        self.config = config;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_out(mut self, out: NdArray) -> Self {
        self.out = Some(out);
        self
    }

    pub fn with_keepdims(mut self, keepdims: bool) -> Self {
        self.keepdims = keepdims;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_resolution() {
        let cfg = ExecConfig::default();
        assert_eq!(cfg.resolved_buffer_size().unwrap(), DEFAULT_BUFFER_SIZE);
        assert_eq!(cfg.with_buffer_size(16).resolved_buffer_size().unwrap(), 16);
        assert!(matches!(
            cfg.with_buffer_size(15).resolved_buffer_size(),
            Err(UFuncError::InvalidBufferSize(15))
        ));
        assert!(cfg.with_buffer_size(MAX_BUFFER_SIZE + 1).resolved_buffer_size().is_err());
    }

    #[test]
    fn test_defaults() {
        let opts = InvokeOptions::default();
        assert_eq!(opts.config.error_mask, ErrorMask::DEFAULT);
        assert!(opts.output_types.is_empty());
        let r = ReduceOptions::default().with_keepdims(true);
        assert!(r.keepdims && r.out.is_none());
    }
}
