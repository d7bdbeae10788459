use std::cell::{Cell, RefCell};

use crate::fpe::{ErrorSink, FpStatusSource, FpeFlags};
use crate::Result;

/// Sink that records every notification instead of emitting it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: RefCell<Vec<(String, FpeFlags)>>,
    pub(crate) host_api: bool,
    pub(crate) host_error: RefCell<Option<String>>,
}

impl RecordingSink {
    pub(crate) fn with_host_api() -> Self {
        Self {
            host_api: true,
            ..Self::default()
        }
    }

    pub(crate) fn events(&self) -> Vec<(String, FpeFlags)> {
        self.events.borrow().clone()
    }

    fn record(&self, kind: &str, cond: FpeFlags) {
        self.events.borrow_mut().push((kind.to_string(), cond));
    }
}

impl ErrorSink for RecordingSink {
    fn warn(&self, _ufunc: &str, condition: FpeFlags) -> Result<()> {
        self.record("warn", condition);
        Ok(())
    }

    fn print(&self, _ufunc: &str, condition: FpeFlags) {
        self.record("print", condition);
    }

    fn log(&self, _ufunc: &str, condition: FpeFlags) {
        self.record("log", condition);
    }

    fn call(&self, _ufunc: &str, conditions: FpeFlags) -> Result<()> {
        self.record("call", conditions);
        Ok(())
    }

    fn host_api_available(&self) -> bool {
        self.host_api
    }

    fn take_host_error(&self) -> Option<String> {
        self.host_error.borrow_mut().take()
    }
}

/// Status source returning a preset value once.
pub(crate) struct FixedStatus(Cell<u8>);

impl FixedStatus {
    pub(crate) fn new(flags: FpeFlags) -> Self {
        Self(Cell::new(flags.bits()))
    }

    pub(crate) fn set(&self, flags: FpeFlags) {
        self.0.set(flags.bits());
    }
}

impl FpStatusSource for FixedStatus {
    fn read_and_clear(&self) -> FpeFlags {
        FpeFlags::from_bits(self.0.replace(0))
    }
}
