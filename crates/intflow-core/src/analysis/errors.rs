//! Turns analysis results into `error` channel annotations.

use super::range::{BlockEnv, RangeAnalysis};
use crate::annotations::{IntErrorKind, Site};
use crate::crange::Crange;
use crate::instructions::{BinaryOp, Instruction};
use crate::module::Module;
use crate::values::Value;

/// Baseline markers: comparisons with a statically impossible side and
/// array accesses whose index range escapes the bounds.
pub fn mark_errors(module: &mut Module, ranges: &RangeAnalysis) {
    for (site, is_true_branch) in &ranges.impossible_branches {
        let kind = if *is_true_branch {
            IntErrorKind::DeadTrueBranch
        } else {
            IntErrorKind::DeadFalseBranch
        };
        module.annotations.set_error(site.clone(), kind);
    }
    for site in &ranges.gep_oob {
        module.annotations.set_error(site.clone(), IntErrorKind::ArrayOob);
    }
}

/// Opt-in follow-on pass over binary instructions: divisors that admit
/// zero, shift amounts that reach the width, and taint-marked arithmetic
/// that can wrap.
pub fn binary_check(module: &mut Module, ranges: &RangeAnalysis) {
    let mut marks: Vec<(Site, IntErrorKind)> = Vec::new();

    for name in &ranges.analysis_funcs {
        let Some(function) = module.get_function(name) else {
            continue;
        };
        for (block_id, block) in &function.body.blocks {
            let Some(env) = ranges.block_ranges.get(name).and_then(|m| m.get(block_id)) else {
                continue;
            };
            for (index, inst) in block.instructions.iter().enumerate() {
                let Instruction::Binary {
                    op, left, right, ty, ..
                } = inst
                else {
                    continue;
                };
                let Some(width) = ty.int_width() else { continue };
                let (Some(lhs), Some(rhs)) = (
                    operand_range(ranges, env, left),
                    operand_range(ranges, env, right),
                ) else {
                    continue;
                };
                let site = Site::inst(name, *block_id, index);

                if op.is_division() && rhs.contains(0) {
                    marks.push((site.clone(), IntErrorKind::DivByZero));
                } else if op.is_shift()
                    && rhs.unsigned_max().map_or(false, |s| s >= u128::from(width))
                {
                    marks.push((site.clone(), IntErrorKind::BadShift));
                } else if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
                    && module.annotations.taint(&site).is_some()
                    && may_wrap(*op, &lhs, &rhs, width)
                {
                    marks.push((site, IntErrorKind::Overflow));
                }
            }
        }
    }

    for (site, kind) in marks {
        module.annotations.set_error(site, kind);
    }
}

fn operand_range(ranges: &RangeAnalysis, env: &BlockEnv, value: &Value) -> Option<Crange> {
    if let Some(c) = value.as_constant() {
        return Crange::from_constant(c);
    }
    if let Some(range) = env.get(value) {
        return Some(range.clone());
    }
    value.as_global().and_then(|g| ranges.global_range.get(&g).cloned())
}

fn may_wrap(op: BinaryOp, lhs: &Crange, rhs: &Crange, width: u16) -> bool {
    let limit = if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    let (Some((lhs_min, lhs_max)), Some((_, rhs_max))) =
        (lhs.unsigned_bounds(), rhs.unsigned_bounds())
    else {
        return false;
    };
    match op {
        BinaryOp::Add => lhs_max.checked_add(rhs_max).map_or(true, |s| s > limit),
        BinaryOp::Sub => lhs_min < rhs_max,
        BinaryOp::Mul => lhs_max.checked_mul(rhs_max).map_or(true, |p| p > limit),
        _ => false,
    }
}
