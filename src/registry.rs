//! Named ufunc registry and the numeric operator table.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::builtins;
use crate::ufunc::UFunc;
use crate::{Result, UFuncError};

/// Slots of the numeric operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Maximum,
    Minimum,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    Negative,
    Absolute,
    Sqrt,
}

impl NumericOp {
    pub const ALL: [NumericOp; 18] = [
        NumericOp::Add,
        NumericOp::Subtract,
        NumericOp::Multiply,
        NumericOp::Divide,
        NumericOp::FloorDivide,
        NumericOp::Maximum,
        NumericOp::Minimum,
        NumericOp::Equal,
        NumericOp::NotEqual,
        NumericOp::Less,
        NumericOp::LessEqual,
        NumericOp::Greater,
        NumericOp::GreaterEqual,
        NumericOp::LogicalAnd,
        NumericOp::LogicalOr,
        NumericOp::Negative,
        NumericOp::Absolute,
        NumericOp::Sqrt,
    ];

    /// Name of the built-in ufunc bound to this slot by default.
    pub fn ufunc_name(self) -> &'static str {
        match self {
            NumericOp::Add => "add",
            NumericOp::Subtract => "subtract",
            NumericOp::Multiply => "multiply",
            NumericOp::Divide => "divide",
            NumericOp::FloorDivide => "floor_divide",
            NumericOp::Maximum => "maximum",
            NumericOp::Minimum => "minimum",
            NumericOp::Equal => "equal",
            NumericOp::NotEqual => "not_equal",
            NumericOp::Less => "less",
            NumericOp::LessEqual => "less_equal",
            NumericOp::Greater => "greater",
            NumericOp::GreaterEqual => "greater_equal",
            NumericOp::LogicalAnd => "logical_and",
            NumericOp::LogicalOr => "logical_or",
            NumericOp::Negative => "negative",
            NumericOp::Absolute => "absolute",
            NumericOp::Sqrt => "sqrt",
        }
    }
}

/// Registry of named ufuncs plus the operator table.
///
/// Registered ufuncs are shared as `Arc<UFunc>`; user loops added through
/// any handle are visible to every holder.
#[derive(Default)]
pub struct UFuncRegistry {
    ufuncs: RwLock<HashMap<String, Arc<UFunc>>>,
    ops: RwLock<HashMap<NumericOp, Arc<UFunc>>>,
}

impl std::fmt::Debug for UFuncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UFuncRegistry")
            .field("ufuncs", &self.names())
            .field("ops", &self.ops.read().len())
            .finish()
    }
}

impl UFuncRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in ufunc, with the operator table bound
    /// to the built-ins of the same name.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut ufuncs = registry.ufuncs.write();
            for f in builtins::all() {
                ufuncs.insert(f.name().to_string(), Arc::new(f));
            }
            let mut ops = registry.ops.write();
            for op in NumericOp::ALL {
                if let Some(f) = ufuncs.get(op.ufunc_name()) {
                    ops.insert(op, Arc::clone(f));
                }
            }
        }
        registry
    }

    /// Process-wide registry, created with the built-ins on first use.
    pub fn global() -> &'static UFuncRegistry {
        static GLOBAL: OnceLock<UFuncRegistry> = OnceLock::new();
        GLOBAL.get_or_init(UFuncRegistry::with_builtins)
    }

    /// Add a ufunc under its name. Names are unique.
    pub fn register(&self, ufunc: UFunc) -> Result<Arc<UFunc>> {
        let mut ufuncs = self.ufuncs.write();
        if ufuncs.contains_key(ufunc.name()) {
            return Err(UFuncError::DuplicateUFunc(ufunc.name().to_string()));
        }
        tracing::debug!(ufunc = %ufunc.name(), nin = ufunc.nin(), nout = ufunc.nout(), "registered ufunc");
        let ufunc = Arc::new(ufunc);
        ufuncs.insert(ufunc.name().to_string(), Arc::clone(&ufunc));
        Ok(ufunc)
    }

    pub fn get(&self, name: &str) -> Option<Arc<UFunc>> {
        self.ufuncs.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ufuncs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.ufuncs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ufuncs.read().is_empty()
    }

    /// Bind `op` to `ufunc`, returning the previous binding.
    pub fn set_numeric_op(&self, op: NumericOp, ufunc: Arc<UFunc>) -> Option<Arc<UFunc>> {
        tracing::debug!(?op, ufunc = %ufunc.name(), "bound numeric operator");
        self.ops.write().insert(op, ufunc)
    }

    pub fn numeric_op(&self, op: NumericOp) -> Option<Arc<UFunc>> {
        self.ops.read().get(&op).cloned()
    }
}
