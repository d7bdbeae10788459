//! Universal-function engine for strided, type-erased arrays.
//!
//! A ufunc is a named element-wise (or generalized) operation with one
//! type-specific inner loop per registered signature. This crate resolves a
//! loop for the operand types, broadcasts the operands, and drives the loop
//! over raw byte pointers, staging operands through aligned buffers when they
//! need a cast, a byte swap, or realignment.
//!
//! # Core Types
//!
//! - [`UFunc`]: registration record (arity, signature table, identity, optional
//!   core signature) plus its append-only user-loop list
//! - [`NdArray`] / [`ArrayView`]: byte-addressed strided arrays with a
//!   [`TypeDescr`] (dtype + byte order)
//! - [`UFuncRegistry`]: process registry of named ufuncs and the numeric
//!   operator table
//!
//! # Primary API
//!
//! - [`UFunc::invoke`] / [`UFunc::call`]: element-wise application with broadcasting
//! - [`UFunc::reduce`], [`UFunc::accumulate`], [`UFunc::reduceat`]: the reduce family
//! - [`UFunc::register_loop`]: add a loop for new type combinations
//! - [`set_fp_error_handler`], [`get_fp_error_status`]: floating-point error control
//!
//! # Example
//!
//! ```rust
//! use strided_ufunc::{builtins, NdArray};
//!
//! let add = builtins::add();
//! let a = NdArray::from_vec(&[3, 1], vec![1.0f64, 2.0, 3.0]).unwrap();
//! let b = NdArray::from_vec(&[1, 4], vec![10.0f64, 20.0, 30.0, 40.0]).unwrap();
//!
//! let out = add.call(&[a.view(), b.view()]).unwrap();
//! assert_eq!(out[0].dims(), &[3, 4]);
//! assert_eq!(out[0].get::<f64>(&[2, 1]).unwrap(), 23.0);
//! ```
//!
//! # Execution strategies
//!
//! - Plain: every operand is aligned, native and of the resolved type; the
//!   inner loop runs directly on the operands' memory.
//! - Buffered: the innermost axis is processed in chunks of at most
//!   [`ExecConfig::buffer_size`] elements through scratch buffers.
//! - Signature-no-buffer: generalized ufuncs receive core sizes and core
//!   strides in addition to the loop strides.

pub mod array;
mod broadcast;
pub mod builtins;
pub mod cast;
mod config;
mod dispatch;
pub mod dtype;
pub mod element;
mod execute;
pub mod fpe;
mod iter;
pub mod loops;
mod reduce;
mod registry;
mod signature;
mod ufunc;

#[cfg(test)]
pub(crate) mod test_util;

// ============================================================================
// Element types and arrays
// ============================================================================
pub use array::{ArrayView, NdArray};
pub use dtype::{can_cast, ByteOrder, DType, Kind, TypeDescr};
pub use element::{Element, ObjectRef, Scalar};

// ============================================================================
// Casting and copying
// ============================================================================
pub use cast::{cast, cast_fn, copy_into, CastFn};

// ============================================================================
// Broadcasting
// ============================================================================
pub use broadcast::broadcast_shapes;

// ============================================================================
// UFunc descriptors, dispatch and execution
// ============================================================================
pub use config::{ExecConfig, InvokeOptions, PrepareOutputs, ReduceOptions};
pub use dispatch::{LoopSource, ResolvedLoop};
pub use execute::LoopMethod;
pub use signature::CoreSignature;
pub use ufunc::{Identity, InnerLoop, LoopData, UFunc, UFuncBuilder, UserLoop};

// ============================================================================
// Floating-point errors
// ============================================================================
pub use fpe::{
    clear_fp_status, get_fp_error_status, raise_fp_status, set_fp_error_handler, DefaultErrorSink,
    ErrorMask, ErrorSink, FpAction, FpErrorHandler, FpStatusSource, FpeFlags, ThreadFpStatus,
};

// ============================================================================
// Registry
// ============================================================================
pub use registry::{NumericOp, UFuncRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size (in elements) used when the caller passes 0.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Smallest accepted buffer size in elements.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Largest accepted buffer size in elements.
pub const MAX_BUFFER_SIZE: usize = 10_000_000;

/// Maximum number of operands (inputs + outputs) of one ufunc.
pub const MAX_ARGS: usize = 32;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while registering or executing ufuncs.
#[derive(Debug, thiserror::Error)]
pub enum UFuncError {
    /// Operand shapes cannot be broadcast together.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// An operand has fewer axes than its core signature requires.
    #[error("{ufunc}: operand {operand} has {ndim} dimensions but its core signature needs {required}")]
    CoreRankTooSmall {
        ufunc: String,
        operand: usize,
        ndim: usize,
        required: usize,
    },

    /// Two operands disagree on the size of a named core dimension.
    #[error("{ufunc}: core dimension '{name}' is {expected} in one operand and {got} in another")]
    CoreDimensionMismatch {
        ufunc: String,
        name: String,
        expected: usize,
        got: usize,
    },

    /// An output core dimension is not bound by any operand.
    #[error("{ufunc}: core dimension '{name}' of an output is not determined by any operand")]
    UnresolvedCoreDimension { ufunc: String, name: String },

    /// No registered loop accepts the operand types.
    #[error("{ufunc}: no matching loop for types {types}")]
    NoMatchingLoop { ufunc: String, types: String },

    /// No cast function exists between two element types.
    #[error("unsupported cast from {from} to {to}")]
    UnsupportedCast { from: DType, to: DType },

    /// A scratch or output allocation failed.
    #[error("failed to allocate {0} bytes")]
    AllocationFailure(usize),

    /// Reduction over an empty axis of a ufunc without identity.
    #[error("zero-size reduction without identity in {0}")]
    ZeroSizeReduction(String),

    /// A floating-point condition fired under the `Raise` action
    /// (or a `Call` handler reported failure).
    #[error("floating point {conditions} encountered in {ufunc} ({action:?})")]
    FloatingPoint {
        ufunc: String,
        conditions: fpe::FpeFlags,
        action: fpe::FpAction,
    },

    /// A `Call` action fired but no handler is installed.
    #[error("floating point error handler requested but none is set")]
    MissingFpHandler,

    /// An object loop needs host services the error sink does not provide.
    #[error("{0}: object loop requires host API access")]
    HostApiRequired(String),

    /// An inner loop reported a failure through the error sink.
    #[error("{ufunc}: inner loop failed: {message}")]
    InnerLoop { ufunc: String, message: String },

    /// Axis index out of range for the array rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// Element index out of range.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Malformed core signature text.
    #[error("invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    /// Inconsistent ufunc registration data.
    #[error("invalid ufunc definition: {0}")]
    InvalidDefinition(String),

    /// A user loop with the same signature is already registered.
    #[error("{ufunc}: a loop for {types} is already registered")]
    DuplicateLoop { ufunc: String, types: String },

    /// A ufunc with the same name is already registered.
    #[error("ufunc '{0}' is already registered")]
    DuplicateUFunc(String),

    /// Wrong number of inputs or outputs.
    #[error("expected {expected} operands, found {found}")]
    OperandCountMismatch { expected: usize, found: usize },

    /// Buffer size outside the accepted range.
    #[error("buffer size {0} is outside [{MIN_BUFFER_SIZE}, {MAX_BUFFER_SIZE}]")]
    InvalidBufferSize(usize),

    /// The reduce family only applies to binary, non-generalized ufuncs.
    #[error("{0}: reduction only supported for binary functions with one output")]
    ReductionUnsupported(String),

    /// Typed element access with the wrong Rust type.
    #[error("element type mismatch: array holds {array}, requested {requested}")]
    ElementTypeMismatch { array: DType, requested: DType },

    /// Strides, dims and offset do not describe a valid view.
    #[error("invalid layout: {0}")]
    InvalidLayout(&'static str),
}

/// Result type for ufunc operations.
pub type Result<T> = std::result::Result<T, UFuncError>;
