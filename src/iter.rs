//! Iteration planning over the broadcast loop space.
//!
//! The planner drops size-1 axes, orders the rest so that the axis with the
//! smallest weighted strides is innermost, then fuses adjacent axes that are
//! contiguous for every operand. The executor calls the inner loop once per
//! outer position (or once per chunk of the innermost axis when buffering).

use crate::Result;

/// Execution plan for one multi-operand strided loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopPlan {
    /// Outer axes, outermost first.
    pub(crate) outer_dims: Vec<usize>,
    /// Per operand, the byte strides of the outer axes.
    pub(crate) outer_strides: Vec<Vec<isize>>,
    /// Length of the innermost axis (1 for a scalar loop space).
    pub(crate) inner_len: usize,
    /// Per operand, the byte stride of the innermost axis.
    pub(crate) inner_strides: Vec<isize>,
    /// True if the loop space has a zero-size axis.
    pub(crate) empty: bool,
}

/// Order axes outer -> inner by descending weighted stride magnitude.
///
/// Ties keep the original axis order, so row-major operands iterate in
/// row-major order.
pub(crate) fn compute_order(axes: &[usize], strides_list: &[&[isize]], weights: &[usize]) -> Vec<usize> {
    let mut order = axes.to_vec();
    order.sort_by(|&a, &b| {
        let score_a = dim_score(a, strides_list, weights);
        let score_b = dim_score(b, strides_list, weights);
        score_b.cmp(&score_a).then_with(|| a.cmp(&b))
    });
    order
}

fn dim_score(dim: usize, strides_list: &[&[isize]], weights: &[usize]) -> usize {
    let mut score = 0usize;
    for (i, strides) in strides_list.iter().enumerate() {
        let weight = weights.get(i).copied().unwrap_or(1);
        score = score.saturating_add(weight.saturating_mul(strides[dim].unsigned_abs()));
    }
    score
}

impl LoopPlan {
    /// Build a plan for `dims` shared by all operands.
    ///
    /// `weights[k]` scales operand `k`'s strides when ordering axes; outputs
    /// are weighted 2 so their access pattern dominates.
    pub(crate) fn new(dims: &[usize], strides_list: &[&[isize]], weights: &[usize]) -> Self {
        let nop = strides_list.len();
        if dims.iter().any(|&d| d == 0) {
            return Self {
                outer_dims: Vec::new(),
                outer_strides: vec![Vec::new(); nop],
                inner_len: 0,
                inner_strides: vec![0; nop],
                empty: true,
            };
        }

        let axes: Vec<usize> = (0..dims.len()).filter(|&d| dims[d] > 1).collect();
        let order = compute_order(&axes, strides_list, weights);

        // Fuse while pushing outer -> inner: an outer axis merges into the
        // following one when it steps exactly over the whole inner axis.
        let mut fused_dims: Vec<usize> = Vec::with_capacity(order.len());
        let mut fused_strides: Vec<Vec<isize>> = vec![Vec::with_capacity(order.len()); nop];
        for &axis in &order {
            let dim = dims[axis];
            let merge = match fused_dims.last() {
                Some(_) => (0..nop).all(|k| {
                    let outer = *fused_strides[k].last().unwrap_or(&0);
                    outer == strides_list[k][axis] * dim as isize
                }),
                None => false,
            };
            if merge {
                if let Some(last) = fused_dims.last_mut() {
                    *last *= dim;
                }
                for k in 0..nop {
                    if let Some(s) = fused_strides[k].last_mut() {
                        *s = strides_list[k][axis];
                    }
                }
            } else {
                fused_dims.push(dim);
                for k in 0..nop {
                    fused_strides[k].push(strides_list[k][axis]);
                }
            }
        }

        match fused_dims.pop() {
            None => Self {
                outer_dims: Vec::new(),
                outer_strides: vec![Vec::new(); nop],
                inner_len: 1,
                inner_strides: vec![0; nop],
                empty: false,
            },
            Some(inner_len) => {
                let inner_strides = fused_strides
                    .iter_mut()
                    .map(|s| s.pop().unwrap_or(0))
                    .collect();
                Self {
                    outer_dims: fused_dims,
                    outer_strides: fused_strides,
                    inner_len,
                    inner_strides,
                    empty: false,
                }
            }
        }
    }

    /// Number of outer positions.
    pub(crate) fn outer_count(&self) -> usize {
        if self.empty {
            0
        } else {
            self.outer_dims.iter().product()
        }
    }

    /// Visit every outer position, passing per-operand byte offsets.
    pub(crate) fn for_each_outer<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[isize]) -> Result<()>,
    {
        if self.outer_count() == 0 {
            return Ok(());
        }
        let nop = self.inner_strides.len();
        let rank = self.outer_dims.len();
        let mut offsets = vec![0isize; nop];
        let mut idx = vec![0usize; rank];
        loop {
            f(&offsets)?;
            // Odometer increment, innermost outer axis fastest.
            let mut d = rank;
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                idx[d] += 1;
                for (k, off) in offsets.iter_mut().enumerate() {
                    *off += self.outer_strides[k][d];
                }
                if idx[d] < self.outer_dims[d] {
                    break;
                }
                for (k, off) in offsets.iter_mut().enumerate() {
                    *off -= self.outer_strides[k][d] * self.outer_dims[d] as isize;
                }
                idx[d] = 0;
            }
        }
    }
}
