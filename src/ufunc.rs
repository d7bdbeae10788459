//! UFunc descriptors and their user-loop lists.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dtype::DType;
use crate::element::Scalar;
use crate::signature::CoreSignature;
use crate::{Result, UFuncError, MAX_ARGS};

/// Type-specific inner loop.
///
/// - `args[k]`: pointer to the first element of argument `k` (inputs, then outputs)
/// - `dimensions[0]`: number of loop iterations; for generalized ufuncs the
///   sizes of the named core dimensions follow, by dimension index
/// - `steps[k]`: byte step of argument `k` per iteration; for generalized
///   ufuncs the core strides of every argument follow, argument by argument
/// - `data`: the opaque data registered with the loop
///
/// # Safety
/// Callers guarantee that every pointer is valid for the described access
/// pattern and points at elements of the loop's registered types.
pub type InnerLoop = unsafe fn(args: &[*mut u8], dimensions: &[usize], steps: &[isize], data: &LoopData);

/// Opaque per-loop data handed to the inner loop.
#[derive(Clone, Default)]
pub struct LoopData(Option<Arc<dyn Any + Send + Sync>>);

impl LoopData {
    pub fn none() -> Self {
        LoopData(None)
    }

    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        LoopData(Some(Arc::new(value)))
    }

    /// The stored value, if present and of type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for LoopData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("LoopData(..)"),
            None => f.write_str("LoopData(None)"),
        }
    }
}

/// Identity element of a binary ufunc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    #[default]
    None,
    Zero,
    One,
    MinusOne,
}

impl Identity {
    pub fn value(self) -> Option<Scalar> {
        match self {
            Identity::None => None,
            Identity::Zero => Some(Scalar::Int(0)),
            Identity::One => Some(Scalar::Int(1)),
            Identity::MinusOne => Some(Scalar::Int(-1)),
        }
    }
}

/// A loop registered after construction.
#[derive(Clone)]
pub struct UserLoop {
    pub types: Vec<DType>,
    pub function: InnerLoop,
    pub data: LoopData,
}

impl fmt::Debug for UserLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLoop")
            .field("types", &self.types)
            .field("data", &self.data)
            .finish()
    }
}

/// Registration record of one ufunc.
pub struct UFunc {
    pub(crate) name: String,
    pub(crate) doc: Option<String>,
    pub(crate) nin: usize,
    pub(crate) nout: usize,
    pub(crate) identity: Identity,
    /// Flat signature table, `ntypes * nargs` entries.
    pub(crate) types: Vec<DType>,
    pub(crate) functions: Vec<InnerLoop>,
    pub(crate) data: Vec<LoopData>,
    pub(crate) check_return: bool,
    pub(crate) core: Option<CoreSignature>,
    pub(crate) user_loops: RwLock<Vec<UserLoop>>,
}

impl fmt::Debug for UFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UFunc")
            .field("name", &self.name)
            .field("nin", &self.nin)
            .field("nout", &self.nout)
            .field("identity", &self.identity)
            .field("ntypes", &self.ntypes())
            .field("signature", &self.core.as_ref().map(|c| c.text.as_str()))
            .finish()
    }
}

impl UFunc {
    /// Build a ufunc from parallel function, data and type tables.
    ///
    /// `types` holds `functions.len()` signatures of `nin + nout` types each.
    /// `data` is either empty or has one entry per function.
    #[allow(clippy::too_many_arguments)]
    pub fn from_func_and_data(
        functions: Vec<InnerLoop>,
        data: Vec<LoopData>,
        types: Vec<DType>,
        nin: usize,
        nout: usize,
        identity: Identity,
        name: &str,
        doc: Option<&str>,
    ) -> Result<Self> {
        Self::from_parts(functions, data, types, nin, nout, identity, name, doc, None, false)
    }

    /// Start a [`UFuncBuilder`].
    pub fn builder(name: &str, nin: usize, nout: usize) -> UFuncBuilder {
        UFuncBuilder {
            name: name.to_string(),
            nin,
            nout,
            identity: Identity::None,
            doc: None,
            signature: None,
            check_return: false,
            loops: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        functions: Vec<InnerLoop>,
        mut data: Vec<LoopData>,
        types: Vec<DType>,
        nin: usize,
        nout: usize,
        identity: Identity,
        name: &str,
        doc: Option<&str>,
        signature: Option<&str>,
        check_return: bool,
    ) -> Result<Self> {
        let nargs = nin + nout;
        if nargs == 0 || nargs > MAX_ARGS {
            return Err(UFuncError::InvalidDefinition(format!(
                "{name}: {nargs} arguments, expected 1..={MAX_ARGS}"
            )));
        }
        if types.len() != functions.len() * nargs {
            return Err(UFuncError::InvalidDefinition(format!(
                "{name}: type table has {} entries, expected {} x {nargs}",
                types.len(),
                functions.len()
            )));
        }
        if data.is_empty() {
            data = vec![LoopData::none(); functions.len()];
        } else if data.len() != functions.len() {
            return Err(UFuncError::InvalidDefinition(format!(
                "{name}: {} data entries for {} functions",
                data.len(),
                functions.len()
            )));
        }
        let core = signature
            .map(|s| CoreSignature::parse(s, nin, nout))
            .transpose()?;
        Ok(Self {
            name: name.to_string(),
            doc: doc.map(str::to_string),
            nin,
            nout,
            identity,
            types,
            functions,
            data,
            check_return,
            core,
            user_loops: RwLock::new(Vec::new()),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    #[inline]
    pub fn nin(&self) -> usize {
        self.nin
    }

    #[inline]
    pub fn nout(&self) -> usize {
        self.nout
    }

    #[inline]
    pub fn nargs(&self) -> usize {
        self.nin + self.nout
    }

    /// Number of built-in signatures.
    #[inline]
    pub fn ntypes(&self) -> usize {
        self.functions.len()
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    #[inline]
    pub fn check_return(&self) -> bool {
        self.check_return
    }

    /// The flat signature table.
    #[inline]
    pub fn types(&self) -> &[DType] {
        &self.types
    }

    /// Built-in signature `i` (`nargs` types).
    pub fn signature(&self, i: usize) -> &[DType] {
        let nargs = self.nargs();
        &self.types[i * nargs..(i + 1) * nargs]
    }

    /// Core signature of a generalized ufunc.
    #[inline]
    pub fn core_signature(&self) -> Option<&CoreSignature> {
        self.core.as_ref()
    }

    #[inline]
    pub fn is_generalized(&self) -> bool {
        self.core.as_ref().is_some_and(|c| c.is_enabled())
    }

    /// Core dimension count of argument `k` (0 for ordinary ufuncs).
    pub(crate) fn core_ndim(&self, k: usize) -> usize {
        self.core.as_ref().map_or(0, |c| c.num_dims[k])
    }

    /// Signatures of the registered user loops, in registration order.
    pub fn user_loop_types(&self) -> Vec<Vec<DType>> {
        self.user_loops.read().iter().map(|l| l.types.clone()).collect()
    }

    /// Append a loop for a new type combination.
    ///
    /// User loops are searched after the built-in table, in registration
    /// order. A second loop with the same signature is rejected.
    ///
    /// Floating-point conditions are read from the calling thread's software
    /// register, not from hardware flags: a loop takes part in error
    /// handling only by reporting its conditions with
    /// [`raise_fp_status`](crate::raise_fp_status).
    pub fn register_loop(&self, types: &[DType], function: InnerLoop, data: LoopData) -> Result<()> {
        if types.len() != self.nargs() {
            return Err(UFuncError::InvalidDefinition(format!(
                "{}: loop signature has {} types, expected {}",
                self.name,
                types.len(),
                self.nargs()
            )));
        }
        let mut loops = self.user_loops.write();
        if loops.iter().any(|l| l.types == types) {
            return Err(UFuncError::DuplicateLoop {
                ufunc: self.name.clone(),
                types: crate::dispatch::format_signature(types, self.nin),
            });
        }
        tracing::debug!(ufunc = %self.name, types = %crate::dispatch::format_signature(types, self.nin), "registered user loop");
        loops.push(UserLoop {
            types: types.to_vec(),
            function,
            data,
        });
        Ok(())
    }
}

/// Builder for [`UFunc`].
pub struct UFuncBuilder {
    name: String,
    nin: usize,
    nout: usize,
    identity: Identity,
    doc: Option<String>,
    signature: Option<String>,
    check_return: bool,
    loops: Vec<(Vec<DType>, InnerLoop, LoopData)>,
}

impl UFuncBuilder {
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    /// Core signature such as `"(m,n),(n,p)->(m,p)"`.
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn check_return(mut self, check: bool) -> Self {
        self.check_return = check;
        self
    }

    pub fn add_loop(self, types: &[DType], function: InnerLoop) -> Self {
        self.add_loop_with_data(types, function, LoopData::none())
    }

    pub fn add_loop_with_data(mut self, types: &[DType], function: InnerLoop, data: LoopData) -> Self {
        self.loops.push((types.to_vec(), function, data));
        self
    }

    pub fn build(self) -> Result<UFunc> {
        let nargs = self.nin + self.nout;
        let mut types = Vec::with_capacity(self.loops.len() * nargs);
        let mut functions = Vec::with_capacity(self.loops.len());
        let mut data = Vec::with_capacity(self.loops.len());
        for (sig, f, d) in self.loops {
            if sig.len() != nargs {
                return Err(UFuncError::InvalidDefinition(format!(
                    "{}: loop signature has {} types, expected {nargs}",
                    self.name,
                    sig.len()
                )));
            }
            types.extend(sig);
            functions.push(f);
            data.push(d);
        }
        UFunc::from_parts(
            functions,
            data,
            types,
            self.nin,
            self.nout,
            self.identity,
            &self.name,
            self.doc.as_deref(),
            self.signature.as_deref(),
            self.check_return,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn noop(_args: &[*mut u8], _dims: &[usize], _steps: &[isize], _data: &LoopData) {}

    #[test]
    fn test_from_func_and_data_validates_table() {
        let err = UFunc::from_func_and_data(
            vec![noop as InnerLoop],
            vec![],
            vec![DType::Float64, DType::Float64],
            2,
            1,
            Identity::None,
            "bad",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, UFuncError::InvalidDefinition(_)));

        let ok = UFunc::from_func_and_data(
            vec![noop as InnerLoop, noop as InnerLoop],
            vec![],
            vec![DType::Int32, DType::Int32, DType::Float64, DType::Float64],
            1,
            1,
            Identity::None,
            "ok",
            Some("doc"),
        )
        .unwrap();
        assert_eq!(ok.ntypes(), 2);
        assert_eq!(ok.signature(1), &[DType::Float64, DType::Float64]);
        assert_eq!(ok.doc(), Some("doc"));
    }

    #[test]
    fn test_builder_with_signature() {
        let f = UFunc::builder("inner", 2, 1)
            .signature("(i),(i)->()")
            .add_loop(&[DType::Float64; 3], noop)
            .build()
            .unwrap();
        assert!(f.is_generalized());
        assert_eq!(f.core_ndim(0), 1);
        assert_eq!(f.core_ndim(2), 0);
    }

    #[test]
    fn test_register_loop_append_only() {
        let f = UFunc::builder("f", 1, 1).build().unwrap();
        f.register_loop(&[DType::Int8, DType::Int8], noop, LoopData::none())
            .unwrap();
        f.register_loop(&[DType::Int16, DType::Int16], noop, LoopData::new(7u32))
            .unwrap();
        assert!(matches!(
            f.register_loop(&[DType::Int8, DType::Int8], noop, LoopData::none()),
            Err(UFuncError::DuplicateLoop { .. })
        ));
        assert_eq!(
            f.user_loop_types(),
            vec![vec![DType::Int8, DType::Int8], vec![DType::Int16, DType::Int16]]
        );
    }

    #[test]
    fn test_loop_data_downcast() {
        let d = LoopData::new(3.5f64);
        assert_eq!(d.get::<f64>(), Some(&3.5));
        assert!(d.get::<u32>().is_none());
        assert!(LoopData::none().is_none());
    }
}
