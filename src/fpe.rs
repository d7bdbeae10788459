//! Floating-point error tracking.
//!
//! Inner loops report exceptional results (division by zero, overflow,
//! underflow, invalid) by raising flags in a per-thread status register.
//! After every executed chunk the executor reads and clears the register and
//! applies the action configured for each fired condition in the
//! [`ErrorMask`].
//!
//! # Actions
//!
//! | action | effect |
//! |---|---|
//! | `Ignore` | nothing |
//! | `Warn` | [`ErrorSink::warn`], once per condition per invocation |
//! | `Raise` | the invocation fails with [`UFuncError::FloatingPoint`] after the chunk |
//! | `Call` | [`ErrorSink::call`] every time, by default the handler set with [`set_fp_error_handler`] |
//! | `Print` | [`ErrorSink::print`], once per condition per invocation |
//! | `Log` | [`ErrorSink::log`], once per condition per invocation |

use std::cell::Cell;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Result, UFuncError};

// ============================================================================
// Condition flags
// ============================================================================

/// Portable 4-bit mask of floating-point conditions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FpeFlags(u8);

impl FpeFlags {
    pub const NONE: FpeFlags = FpeFlags(0);
    pub const DIVIDE_BY_ZERO: FpeFlags = FpeFlags(1);
    pub const OVERFLOW: FpeFlags = FpeFlags(2);
    pub const UNDERFLOW: FpeFlags = FpeFlags(4);
    pub const INVALID: FpeFlags = FpeFlags(8);

    const ALL: [FpeFlags; 4] = [
        FpeFlags::DIVIDE_BY_ZERO,
        FpeFlags::OVERFLOW,
        FpeFlags::UNDERFLOW,
        FpeFlags::INVALID,
    ];

    /// Mask from raw bits; bits above the low four are dropped.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        FpeFlags(bits & 0x0f)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: FpeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: FpeFlags) {
        self.0 |= other.0;
    }

    /// The single conditions set in this mask, in bit order.
    pub fn iter(self) -> impl Iterator<Item = FpeFlags> {
        FpeFlags::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    fn name(self) -> &'static str {
        match self.0 {
            1 => "divide by zero",
            2 => "overflow",
            4 => "underflow",
            8 => "invalid value",
            _ => "multiple conditions",
        }
    }

    fn shift(self) -> u32 {
        match self.0 {
            1 => ErrorMask::SHIFT_DIVIDE_BY_ZERO,
            2 => ErrorMask::SHIFT_OVERFLOW,
            4 => ErrorMask::SHIFT_UNDERFLOW,
            _ => ErrorMask::SHIFT_INVALID,
        }
    }
}

impl BitOr for FpeFlags {
    type Output = FpeFlags;

    fn bitor(self, rhs: FpeFlags) -> FpeFlags {
        FpeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FpeFlags {
    fn bitor_assign(&mut self, rhs: FpeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FpeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for cond in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(cond.name())?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for FpeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FpeFlags({self})")
    }
}

// ============================================================================
// Actions and the packed mask
// ============================================================================

/// What to do when a condition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FpAction {
    Ignore = 0,
    Warn = 1,
    Raise = 2,
    Call = 3,
    Print = 4,
    Log = 5,
}

impl FpAction {
    fn from_bits(bits: u32) -> FpAction {
        match bits {
            1 => FpAction::Warn,
            2 => FpAction::Raise,
            3 => FpAction::Call,
            4 => FpAction::Print,
            5 => FpAction::Log,
            _ => FpAction::Ignore,
        }
    }
}

/// Per-condition actions packed into one integer, 3 bits per condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorMask(u32);

impl ErrorMask {
    pub const SHIFT_DIVIDE_BY_ZERO: u32 = 0;
    pub const SHIFT_OVERFLOW: u32 = 3;
    pub const SHIFT_UNDERFLOW: u32 = 6;
    pub const SHIFT_INVALID: u32 = 9;

    const FIELD: u32 = 0b111;

    /// Every condition ignored; status checking is skipped entirely.
    pub const IGNORE_ALL: ErrorMask = ErrorMask(0);

    /// Print on divide-by-zero, overflow and invalid; ignore underflow.
    pub const DEFAULT: ErrorMask = ErrorMask(
        (FpAction::Print as u32) << Self::SHIFT_DIVIDE_BY_ZERO
            | (FpAction::Print as u32) << Self::SHIFT_OVERFLOW
            | (FpAction::Print as u32) << Self::SHIFT_INVALID,
    );

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        ErrorMask(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Mask applying `action` to all four conditions.
    pub fn all(action: FpAction) -> Self {
        FpeFlags::ALL
            .into_iter()
            .fold(ErrorMask::IGNORE_ALL, |m, c| m.with(c, action))
    }

    /// Set the action of every condition in `conditions`.
    pub fn with(self, conditions: FpeFlags, action: FpAction) -> Self {
        let mut bits = self.0;
        for cond in conditions.iter() {
            let shift = cond.shift();
            bits = (bits & !(Self::FIELD << shift)) | ((action as u32) << shift);
        }
        ErrorMask(bits)
    }

    /// Action configured for a single condition.
    pub fn action(self, condition: FpeFlags) -> FpAction {
        FpAction::from_bits((self.0 >> condition.shift()) & Self::FIELD)
    }

    #[inline]
    pub fn is_ignore_all(self) -> bool {
        self.0 == 0
    }
}

impl Default for ErrorMask {
    fn default() -> Self {
        ErrorMask::DEFAULT
    }
}

// ============================================================================
// Status register
// ============================================================================

thread_local! {
    static FP_STATUS: Cell<u8> = const { Cell::new(0) };
}

/// Set `flags` in the calling thread's status register.
#[inline]
pub fn raise_fp_status(flags: FpeFlags) {
    if !flags.is_empty() {
        FP_STATUS.with(|s| s.set(s.get() | flags.bits()));
    }
}

/// Read and clear the calling thread's status register.
pub fn get_fp_error_status() -> FpeFlags {
    FP_STATUS.with(|s| FpeFlags::from_bits(s.replace(0)))
}

/// Clear the calling thread's status register.
pub fn clear_fp_status() {
    FP_STATUS.with(|s| s.set(0));
}

/// Read-and-clear access to a floating-point status register.
pub trait FpStatusSource {
    fn read_and_clear(&self) -> FpeFlags;

    fn clear(&self) {
        let _ = self.read_and_clear();
    }
}

/// The calling thread's software status register.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadFpStatus;

impl FpStatusSource for ThreadFpStatus {
    fn read_and_clear(&self) -> FpeFlags {
        get_fp_error_status()
    }

    fn clear(&self) {
        clear_fp_status();
    }
}

// ============================================================================
// Handler and sink
// ============================================================================

/// Callback used by the `Call` action: receives the ufunc name and the
/// conditions that fired in one chunk.
pub type FpErrorHandler = Arc<dyn Fn(&str, FpeFlags) -> Result<()> + Send + Sync>;

static FP_HANDLER: RwLock<Option<FpErrorHandler>> = parking_lot::const_rwlock(None);

/// Install (or remove, with `None`) the process-wide `Call` handler.
///
/// Returns the previously installed handler.
pub fn set_fp_error_handler(handler: Option<FpErrorHandler>) -> Option<FpErrorHandler> {
    std::mem::replace(&mut *FP_HANDLER.write(), handler)
}

pub(crate) fn fp_error_handler() -> Option<FpErrorHandler> {
    FP_HANDLER.read().clone()
}

/// Destination of floating-point notifications and host-level errors.
///
/// Every method has a default, so an empty `impl` gives the standard
/// behavior; a host embedding overrides the parts it owns.
pub trait ErrorSink {
    /// `Warn` action. An `Err` aborts the invocation.
    fn warn(&self, ufunc: &str, condition: FpeFlags) -> Result<()> {
        tracing::warn!(ufunc, %condition, "floating point warning");
        Ok(())
    }

    /// `Print` action.
    fn print(&self, ufunc: &str, condition: FpeFlags) {
        eprintln!("Warning: {condition} encountered in {ufunc}");
    }

    /// `Log` action.
    fn log(&self, ufunc: &str, condition: FpeFlags) {
        tracing::info!(target: "strided_ufunc::fpe", ufunc, %condition, "floating point condition");
    }

    /// `Call` action.
    fn call(&self, ufunc: &str, conditions: FpeFlags) -> Result<()> {
        match fp_error_handler() {
            Some(handler) => handler(ufunc, conditions),
            None => Err(UFuncError::MissingFpHandler),
        }
    }

    /// Whether object loops may run (they need host services).
    fn host_api_available(&self) -> bool {
        false
    }

    /// Error recorded by an object loop since the last call, if any.
    fn take_host_error(&self) -> Option<String> {
        None
    }
}

/// Sink with the default behavior of every action.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorSink;

impl ErrorSink for DefaultErrorSink {}

// ============================================================================
// Per-invocation checking
// ============================================================================

/// Applies the error mask after each chunk of one invocation.
pub(crate) struct FpChecker<'a> {
    ufunc: &'a str,
    mask: ErrorMask,
    sink: &'a dyn ErrorSink,
    status: &'a dyn FpStatusSource,
    notified: FpeFlags,
}

impl<'a> FpChecker<'a> {
    pub(crate) fn new(
        ufunc: &'a str,
        mask: ErrorMask,
        sink: &'a dyn ErrorSink,
        status: &'a dyn FpStatusSource,
    ) -> Self {
        Self {
            ufunc,
            mask,
            sink,
            status,
            notified: FpeFlags::NONE,
        }
    }

    pub(crate) fn sink(&self) -> &'a dyn ErrorSink {
        self.sink
    }

    /// Clear the status register before the first chunk.
    pub(crate) fn start(&self) {
        self.status.clear();
    }

    /// Read, clear and act on the status register.
    pub(crate) fn check(&mut self) -> Result<()> {
        if self.mask.is_ignore_all() {
            return Ok(());
        }
        let fired = self.status.read_and_clear();
        if fired.is_empty() {
            return Ok(());
        }
        let mut raised = FpeFlags::NONE;
        let mut called = FpeFlags::NONE;
        for cond in fired.iter() {
            let action = self.mask.action(cond);
            match action {
                FpAction::Ignore => {}
                FpAction::Raise => raised |= cond,
                FpAction::Call => called |= cond,
                FpAction::Warn | FpAction::Print | FpAction::Log => {
                    if self.notified.contains(cond) {
                        continue;
                    }
                    self.notified.insert(cond);
                    match action {
                        FpAction::Warn => self.sink.warn(self.ufunc, cond)?,
                        FpAction::Print => self.sink.print(self.ufunc, cond),
                        _ => self.sink.log(self.ufunc, cond),
                    }
                }
            }
        }
        if !called.is_empty() {
            self.sink.call(self.ufunc, called)?;
        }
        if !raised.is_empty() {
            tracing::debug!(ufunc = self.ufunc, conditions = %raised, "raising floating point error");
            return Err(UFuncError::FloatingPoint {
                ufunc: self.ufunc.to_string(),
                conditions: raised,
                action: FpAction::Raise,
            });
        }
        Ok(())
    }
}
