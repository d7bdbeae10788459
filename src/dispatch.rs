//! Loop selection.
//!
//! Resolution is first-match: the built-in signatures are scanned in
//! registration order, then the user loops in insertion order, and the first
//! signature that accepts the operand types wins. A signature accepts the
//! operands when every input type casts safely to the signature's input type
//! and every requested output type equals the signature's output type.

use crate::dtype::{can_cast, DType};
use crate::ufunc::{InnerLoop, LoopData, UFunc};
use crate::{Result, UFuncError};

/// Where a resolved loop came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSource {
    /// Index into the built-in signature table.
    Builtin(usize),
    /// Index into the user-loop list.
    User(usize),
}

/// Outcome of type resolution.
#[derive(Clone)]
pub struct ResolvedLoop {
    pub function: InnerLoop,
    pub data: LoopData,
    /// Resolved types of all arguments, inputs then outputs.
    pub types: Vec<DType>,
    pub source: LoopSource,
}

impl std::fmt::Debug for ResolvedLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedLoop")
            .field("types", &self.types)
            .field("source", &self.source)
            .field("data", &self.data)
            .finish()
    }
}

impl ResolvedLoop {
    /// True if any argument is an object handle.
    pub fn is_object(&self) -> bool {
        self.types.iter().any(|t| t.is_object())
    }
}

fn signature_matches(sig: &[DType], nin: usize, inputs: &[DType], outputs: &[Option<DType>]) -> bool {
    inputs
        .iter()
        .zip(&sig[..nin])
        .all(|(&have, &want)| can_cast(have, want))
        && outputs
            .iter()
            .zip(&sig[nin..])
            .all(|(req, &want)| req.map_or(true, |r| r == want))
}

/// Printable signature, e.g. `"dd->d"`.
pub(crate) fn format_signature(types: &[DType], nin: usize) -> String {
    let nin = nin.min(types.len());
    let mut s: String = types[..nin].iter().map(|t| t.char_code()).collect();
    s.push_str("->");
    s.extend(types[nin..].iter().map(|t| t.char_code()));
    s
}

fn describe_operands(inputs: &[DType], outputs: &[Option<DType>]) -> String {
    let ins: Vec<&str> = inputs.iter().map(|t| t.name()).collect();
    let outs: Vec<&str> = outputs.iter().map(|t| t.map_or("*", |t| t.name())).collect();
    format!("({}) -> ({})", ins.join(", "), outs.join(", "))
}

impl UFunc {
    /// Select the loop for the given input types and requested output types.
    ///
    /// `outputs` may be shorter than `nout`; missing entries are unconstrained.
    pub fn resolve_types(&self, inputs: &[DType], outputs: &[Option<DType>]) -> Result<ResolvedLoop> {
        if inputs.len() != self.nin {
            return Err(UFuncError::OperandCountMismatch {
                expected: self.nin,
                found: inputs.len(),
            });
        }
        if outputs.len() > self.nout {
            return Err(UFuncError::OperandCountMismatch {
                expected: self.nout,
                found: outputs.len(),
            });
        }

        for i in 0..self.ntypes() {
            let sig = self.signature(i);
            if signature_matches(sig, self.nin, inputs, outputs) {
                tracing::debug!(ufunc = %self.name, loop_types = %format_signature(sig, self.nin), "selected built-in loop");
                return Ok(ResolvedLoop {
                    function: self.functions[i],
                    data: self.data[i].clone(),
                    types: sig.to_vec(),
                    source: LoopSource::Builtin(i),
                });
            }
        }

        let user = self.user_loops.read();
        for (i, entry) in user.iter().enumerate() {
            if signature_matches(&entry.types, self.nin, inputs, outputs) {
                tracing::debug!(ufunc = %self.name, loop_types = %format_signature(&entry.types, self.nin), "selected user loop");
                return Ok(ResolvedLoop {
                    function: entry.function,
                    data: entry.data.clone(),
                    types: entry.types.clone(),
                    source: LoopSource::User(i),
                });
            }
        }

        Err(UFuncError::NoMatchingLoop {
            ufunc: self.name.clone(),
            types: describe_operands(inputs, outputs),
        })
    }
}
