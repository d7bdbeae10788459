//! Broadcasting and core-dimension binding.

use crate::ufunc::UFunc;
use crate::{Result, UFuncError};

/// Compute the common broadcast shape of several operand shapes.
///
/// Shapes are aligned at the trailing axis; missing leading axes count as 1.
/// Per axis, sizes must be equal or 1, and the result is the non-1 size.
pub fn broadcast_shapes(dims_list: &[&[usize]]) -> Result<Vec<usize>> {
    let rank = dims_list.iter().map(|d| d.len()).max().unwrap_or(0);
    let mut out = vec![1usize; rank];
    for dims in dims_list {
        let lead = rank - dims.len();
        for (i, &n) in dims.iter().enumerate() {
            let target = &mut out[lead + i];
            if n == 1 {
                continue;
            }
            if *target == 1 {
                *target = n;
            } else if *target != n {
                return Err(UFuncError::ShapeMismatch(out.clone(), dims.to_vec()));
            }
        }
    }
    Ok(out)
}

/// Strides that view `src_dims` as `target_dims`.
///
/// Missing leading axes and size-1 axes that are stretched get stride 0.
pub(crate) fn broadcast_strides(
    target_dims: &[usize],
    src_dims: &[usize],
    src_strides: &[isize],
) -> Result<Vec<isize>> {
    if src_strides.len() != src_dims.len() {
        return Err(UFuncError::InvalidLayout("stride and dims length mismatch"));
    }
    if src_dims.len() > target_dims.len() {
        return Err(UFuncError::ShapeMismatch(src_dims.to_vec(), target_dims.to_vec()));
    }
    let lead = target_dims.len() - src_dims.len();
    let mut out = vec![0isize; target_dims.len()];
    for i in 0..src_dims.len() {
        let sdim = src_dims[i];
        let tdim = target_dims[lead + i];
        if sdim == tdim {
            out[lead + i] = src_strides[i];
        } else if sdim == 1 {
            out[lead + i] = 0;
        } else {
            return Err(UFuncError::ShapeMismatch(src_dims.to_vec(), target_dims.to_vec()));
        }
    }
    Ok(out)
}

/// Loop geometry of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Geometry {
    /// Broadcast loop shape (core dimensions excluded).
    pub(crate) loop_dims: Vec<usize>,
    /// Size of every named core dimension, by dimension index.
    pub(crate) core_sizes: Vec<usize>,
    /// Full shape of each output: loop shape followed by its core dimensions.
    pub(crate) out_dims: Vec<Vec<usize>>,
}

/// Broadcast the loop part of every operand and bind the core dimensions.
///
/// `outputs[k]` is the shape of a caller-provided output, if any. Provided
/// outputs must match the loop shape exactly.
pub(crate) fn broadcast_operands(
    ufunc: &UFunc,
    inputs: &[&[usize]],
    outputs: &[Option<&[usize]>],
) -> Result<Geometry> {
    let nin = ufunc.nin();
    let num_dim_ix = ufunc.core_signature().map_or(0, |c| c.num_dim_ix());
    let mut bound: Vec<Option<usize>> = vec![None; num_dim_ix];

    let mut split = |k: usize, dims: &[usize]| -> Result<usize> {
        let ncore = ufunc.core_ndim(k);
        if dims.len() < ncore {
            return Err(UFuncError::CoreRankTooSmall {
                ufunc: ufunc.name().to_string(),
                operand: k,
                ndim: dims.len(),
                required: ncore,
            });
        }
        let loop_rank = dims.len() - ncore;
        if let Some(sig) = ufunc.core_signature() {
            for (&ix, &size) in sig.arg_dims(k).iter().zip(&dims[loop_rank..]) {
                match bound[ix] {
                    None => bound[ix] = Some(size),
                    Some(expected) if expected != size => {
                        return Err(UFuncError::CoreDimensionMismatch {
                            ufunc: ufunc.name().to_string(),
                            name: sig.dim_names[ix].clone(),
                            expected,
                            got: size,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(loop_rank)
    };

    let mut loop_parts: Vec<&[usize]> = Vec::with_capacity(inputs.len());
    for (k, dims) in inputs.iter().enumerate() {
        let loop_rank = split(k, *dims)?;
        loop_parts.push(&dims[..loop_rank]);
    }
    let mut out_loop_parts: Vec<Option<&[usize]>> = Vec::with_capacity(outputs.len());
    for (j, dims) in outputs.iter().enumerate() {
        match dims {
            Some(dims) => {
                let loop_rank = split(nin + j, *dims)?;
                out_loop_parts.push(Some(&dims[..loop_rank]));
            }
            None => out_loop_parts.push(None),
        }
    }

    let loop_dims = broadcast_shapes(&loop_parts)?;
    for part in out_loop_parts.iter().flatten() {
        if *part != loop_dims.as_slice() {
            return Err(UFuncError::ShapeMismatch(part.to_vec(), loop_dims.clone()));
        }
    }

    let mut out_dims = Vec::with_capacity(ufunc.nout());
    for j in 0..ufunc.nout() {
        let mut dims = loop_dims.clone();
        if let Some(sig) = ufunc.core_signature() {
            for &ix in sig.arg_dims(nin + j) {
                let size = bound[ix].ok_or_else(|| UFuncError::UnresolvedCoreDimension {
                    ufunc: ufunc.name().to_string(),
                    name: sig.dim_names[ix].clone(),
                })?;
                dims.push(size);
            }
        }
        out_dims.push(dims);
    }

    Ok(Geometry {
        loop_dims,
        core_sizes: bound.into_iter().map(|b| b.unwrap_or(1)).collect(),
        out_dims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::ufunc::LoopData;

    unsafe fn noop(_args: &[*mut u8], _dims: &[usize], _steps: &[isize], _data: &LoopData) {}

    #[test]
    fn test_broadcast_shapes_basic() {
        let a = [3usize, 1];
        let b = [1usize, 4];
        assert_eq!(broadcast_shapes(&[&a, &b]).unwrap(), vec![3, 4]);
        let c = [5usize, 1, 4];
        assert_eq!(broadcast_shapes(&[&a, &c]).unwrap(), vec![5, 3, 4]);
        let empty: &[usize] = &[];
        assert_eq!(broadcast_shapes(&[empty, &b]).unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_broadcast_shapes_incompatible() {
        let a = [2usize, 3];
        let b = [4usize, 3];
        let err = broadcast_shapes(&[&a, &b]).unwrap_err();
        match err {
            UFuncError::ShapeMismatch(_, _) => {}
            _ => panic!("unexpected error: {err:?}"),
        }
    }

    #[test]
    fn test_broadcast_shapes_zero_size() {
        let a = [0usize, 3];
        let b = [1usize, 3];
        assert_eq!(broadcast_shapes(&[&a, &b]).unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_broadcast_strides_leading_axes() {
        let promoted = broadcast_strides(&[2, 3, 4], &[3, 1], &[8, 8]).unwrap();
        assert_eq!(promoted, vec![0, 8, 0]);
        assert!(broadcast_strides(&[3], &[2], &[8]).is_err());
    }

    fn matmul_like() -> UFunc {
        UFunc::builder("mm", 2, 1)
            .signature("(m,n),(n,p)->(m,p)")
            .add_loop(&[DType::Float64; 3], noop)
            .build()
            .unwrap()
    }

    #[test]
    fn test_core_dims_bound_and_loop_broadcast() {
        let f = matmul_like();
        let a = [5usize, 2, 3];
        let b = [3usize, 4];
        let g = broadcast_operands(&f, &[&a, &b], &[None]).unwrap();
        assert_eq!(g.loop_dims, vec![5]);
        assert_eq!(g.core_sizes, vec![2, 3, 4]);
        assert_eq!(g.out_dims, vec![vec![5, 2, 4]]);
    }

    #[test]
    fn test_core_dim_errors() {
        let f = matmul_like();
        let a = [2usize, 3];
        let b = [4usize, 4];
        assert!(matches!(
            broadcast_operands(&f, &[&a, &b], &[None]),
            Err(UFuncError::CoreDimensionMismatch { .. })
        ));
        let v = [3usize];
        assert!(matches!(
            broadcast_operands(&f, &[&v, &b], &[None]),
            Err(UFuncError::CoreRankTooSmall { operand: 0, .. })
        ));
    }

    #[test]
    fn test_unresolved_output_core_dim() {
        let f = UFunc::builder("expand", 1, 1)
            .signature("(i)->(i,k)")
            .add_loop(&[DType::Float64; 2], noop)
            .build()
            .unwrap();
        let a = [3usize];
        assert!(matches!(
            broadcast_operands(&f, &[&a], &[None]),
            Err(UFuncError::UnresolvedCoreDimension { .. })
        ));
        // a provided output binds k
        let out: &[usize] = &[3, 2];
        let g = broadcast_operands(&f, &[&a], &[Some(out)]).unwrap();
        assert_eq!(g.out_dims, vec![vec![3, 2]]);
    }

    #[test]
    fn test_provided_output_must_match_loop_shape() {
        let f = UFunc::builder("add", 2, 1)
            .add_loop(&[DType::Float64; 3], noop)
            .build()
            .unwrap();
        let a = [3usize, 1];
        let b = [1usize, 4];
        let out: &[usize] = &[1, 4];
        assert!(matches!(
            broadcast_operands(&f, &[&a, &b], &[Some(out)]),
            Err(UFuncError::ShapeMismatch(_, _))
        ));
    }
}
