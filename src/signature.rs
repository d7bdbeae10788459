//! Core-dimension signatures of generalized ufuncs.

use crate::{Result, UFuncError};

/// Parsed core signature such as `"(m,n),(n,p)->(m,p)"`.
///
/// Dimension names are numbered by first appearance. Per argument `k`, the
/// indices of its core dimensions are
/// `dim_ixs[offsets[k]..offsets[k] + num_dims[k]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSignature {
    /// Printable signature text, whitespace removed.
    pub text: String,
    /// Distinct dimension names, indexed by dimension index.
    pub dim_names: Vec<String>,
    /// Core dimension count per argument.
    pub num_dims: Vec<usize>,
    /// Flattened dimension indices of all arguments.
    pub dim_ixs: Vec<usize>,
    /// Start of each argument's entries in `dim_ixs`.
    pub offsets: Vec<usize>,
}

impl CoreSignature {
    /// Parse `text` for a ufunc with `nin` inputs and `nout` outputs.
    pub fn parse(text: &str, nin: usize, nout: usize) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let err = |reason: &str| UFuncError::InvalidSignature {
            signature: text.to_string(),
            reason: reason.to_string(),
        };

        let (lhs, rhs) = compact.split_once("->").ok_or_else(|| err("missing '->'"))?;
        let inputs = parse_arg_list(lhs).map_err(|r| err(&r))?;
        let outputs = parse_arg_list(rhs).map_err(|r| err(&r))?;
        if inputs.len() != nin {
            return Err(err(&format!("expected {nin} inputs, found {}", inputs.len())));
        }
        if outputs.len() != nout {
            return Err(err(&format!("expected {nout} outputs, found {}", outputs.len())));
        }

        let mut sig = CoreSignature {
            text: compact.clone(),
            dim_names: Vec::new(),
            num_dims: Vec::with_capacity(nin + nout),
            dim_ixs: Vec::new(),
            offsets: Vec::with_capacity(nin + nout),
        };
        for arg in inputs.iter().chain(outputs.iter()) {
            sig.offsets.push(sig.dim_ixs.len());
            sig.num_dims.push(arg.len());
            for name in arg {
                let ix = match sig.dim_names.iter().position(|n| n == name) {
                    Some(ix) => ix,
                    None => {
                        sig.dim_names.push(name.clone());
                        sig.dim_names.len() - 1
                    }
                };
                sig.dim_ixs.push(ix);
            }
        }
        Ok(sig)
    }

    /// Number of distinct named core dimensions.
    #[inline]
    pub fn num_dim_ix(&self) -> usize {
        self.dim_names.len()
    }

    /// Dimension indices of argument `k`.
    #[inline]
    pub fn arg_dims(&self, k: usize) -> &[usize] {
        let start = self.offsets[k];
        &self.dim_ixs[start..start + self.num_dims[k]]
    }

    /// True if any argument has a core dimension.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !self.dim_ixs.is_empty()
    }
}

/// Split `"(a,b),(),(c)"` into per-argument name lists.
fn parse_arg_list(s: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut args = Vec::new();
    let mut rest = s;
    loop {
        let inner_start = rest
            .strip_prefix('(')
            .ok_or_else(|| format!("expected '(' at '{rest}'"))?;
        let close = inner_start
            .find(')')
            .ok_or_else(|| "unbalanced '('".to_string())?;
        let inner = &inner_start[..close];
        let mut names = Vec::new();
        if !inner.is_empty() {
            for name in inner.split(',') {
                if !is_identifier(name) {
                    return Err(format!("invalid dimension name '{name}'"));
                }
                names.push(name.to_string());
            }
        }
        args.push(names);
        rest = &inner_start[close + 1..];
        if rest.is_empty() {
            return Ok(args);
        }
        rest = rest
            .strip_prefix(',')
            .ok_or_else(|| format!("expected ',' at '{rest}'"))?;
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
