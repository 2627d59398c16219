//! Flow-sensitive interval analysis to a module-wide fixed point.
//!
//! Every analyzed function carries a per-block environment mapping values
//! to cranges. Block environments are rebuilt from non-cyclic predecessors
//! (branch and switch conditions narrow the merged input), then each
//! instruction's transfer function runs, and the result is unioned with the
//! previous sweep's entry so ranges only ever grow. Call instructions push
//! argument ranges into callee entry environments and pull return summaries
//! back, which is what ties the per-function sweeps into one module-wide
//! fixed point.

use super::backedge::BackedgeAnalysis;
use super::cfg::ControlFlowGraph;
use super::pass::AnalyzerConfig;
use crate::annotations::Site;
use crate::block::{BlockId, Terminator};
use crate::crange::{apply_binary, Crange};
use crate::function::Function;
use crate::instructions::{CastKind, Instruction};
use crate::module::{GlobalInit, Module};
use crate::types::Type;
use crate::values::{GlobalId, ParamId, Value};
use anyhow::{bail, Context, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::{debug, warn};

pub type BlockEnv = IndexMap<Value, Crange>;

#[derive(Debug, Clone)]
pub struct RangeAnalysis {
    pub backedges: IndexMap<String, BackedgeAnalysis>,
    pub block_ranges: IndexMap<String, IndexMap<BlockId, BlockEnv>>,
    pub func_return_range: IndexMap<String, Crange>,
    pub global_range: IndexMap<GlobalId, Crange>,
    pub global_array_ranges: IndexMap<GlobalId, Vec<Crange>>,
    pub impossible_branches: IndexMap<Site, bool>,
    pub gep_oob: IndexSet<Site>,
    pub analysis_funcs: IndexSet<String>,
    pub iterations: usize,
    pub converged: bool,
    iteration_cap: usize,
}

impl RangeAnalysis {
    pub fn new(iteration_cap: usize) -> Self {
        Self {
            backedges: IndexMap::new(),
            block_ranges: IndexMap::new(),
            func_return_range: IndexMap::new(),
            global_range: IndexMap::new(),
            global_array_ranges: IndexMap::new(),
            impossible_branches: IndexMap::new(),
            gep_oob: IndexSet::new(),
            analysis_funcs: IndexSet::new(),
            iterations: 0,
            converged: false,
            iteration_cap,
        }
    }

    /// Seeds summaries and entry environments. Analysis targets are the
    /// functions that return an integer or are tainted; source-function
    /// arguments start full (anything can come across the boundary), all
    /// other arguments start empty and grow from call sites.
    pub fn init(
        &mut self,
        module: &Module,
        taint_funcs: &IndexSet<String>,
        config: &AnalyzerConfig,
    ) {
        for (name, function) in &module.functions {
            let ret_width = function.signature.return_type.int_width();
            if ret_width.is_none() && !taint_funcs.contains(name) {
                continue;
            }
            if function.is_declaration {
                if let Some(width) = ret_width {
                    debug!(function = %name, "declaration only, assuming full return range");
                    self.func_return_range
                        .insert(name.clone(), Crange::full(width));
                }
                continue;
            }
            if let Some(width) = ret_width {
                self.func_return_range
                    .insert(name.clone(), Crange::empty(width));
            }

            let is_source = config.is_source(name);
            let entry = function.entry_block();
            let entry_env = self
                .block_ranges
                .entry(name.clone())
                .or_default()
                .entry(entry)
                .or_default();
            for (index, param) in function.signature.params.iter().enumerate() {
                if let Some(width) = param.param_type.int_width() {
                    let range = if is_source {
                        Crange::full(width)
                    } else {
                        Crange::empty(width)
                    };
                    entry_env.insert(Value::Param(ParamId(index as u32)), range);
                }
            }
            self.analysis_funcs.insert(name.clone());
        }

        for (gid, global) in &module.globals {
            match (&global.ty, &global.initializer) {
                (Type::Int(width), Some(GlobalInit::Scalar(c))) => {
                    match c.to_bits() {
                        Some(bits) => {
                            self.global_range.insert(*gid, Crange::point(*width, bits));
                        }
                        None => {
                            warn!(global = %global.name, "unsupported initializer width");
                            self.global_range.insert(*gid, Crange::full(*width));
                        }
                    }
                }
                (Type::Int(width), _) => {
                    self.global_range.insert(*gid, Crange::full(*width));
                }
                (Type::Array(elem, len), init) if elem.is_integer() => {
                    let width = elem.int_width().expect("integer element");
                    let elems = match init {
                        Some(GlobalInit::Array(values)) => (0..*len)
                            .map(|i| {
                                values
                                    .get(i)
                                    .and_then(|c| c.to_bits())
                                    .map(|bits| Crange::point(width, bits))
                                    .unwrap_or_else(|| Crange::full(width))
                            })
                            .collect(),
                        _ => vec![Crange::full(width); *len],
                    };
                    self.global_array_ranges.insert(*gid, elems);
                }
                _ => {
                    warn!(global = %global.name, ty = %global.ty, "unhandled global type");
                }
            }
        }
    }

    /// Iterates per-function sweeps until `block_ranges`, `global_range`,
    /// and `func_return_range` all stop changing, or the cap trips.
    pub fn run(&mut self, module: &Module) -> Result<()> {
        for (name, function) in &module.functions {
            if !function.is_declaration {
                self.backedges
                    .insert(name.clone(), BackedgeAnalysis::from_function(function));
            }
        }

        self.iterations = 0;
        self.converged = false;
        loop {
            let old_blocks = self.block_ranges.clone();
            let old_globals = self.global_range.clone();
            let old_returns = self.func_return_range.clone();

            let targets: Vec<String> = self.analysis_funcs.iter().cloned().collect();
            for name in &targets {
                self.analyze_function(module, name)?;
            }

            if self.block_ranges == old_blocks
                && self.global_range == old_globals
                && self.func_return_range == old_returns
            {
                self.converged = true;
                break;
            }
            self.iterations += 1;
            if self.iterations > self.iteration_cap {
                warn!(
                    cap = self.iteration_cap,
                    "iteration cap reached before convergence"
                );
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn analyze_function(&mut self, module: &Module, name: &str) -> Result<()> {
        let function = module
            .get_function(name)
            .with_context(|| format!("analysis target {} missing from module", name))?;
        let cfg = ControlFlowGraph::from_function(function);
        let types = ValueTypes::build(module, function);
        let defs = def_positions(function);
        debug!(function = %name, "range sweep");

        for (&block_id, block) in &function.body.blocks {
            let mut cur: BlockEnv = self
                .block_ranges
                .get(name)
                .and_then(|m| m.get(&block_id))
                .cloned()
                .unwrap_or_default();

            for &pred in cfg.predecessors(block_id) {
                if self
                    .backedges
                    .get(name)
                    .map_or(false, |b| b.is_cyclic_pred(block_id, pred))
                {
                    continue;
                }
                let pred_env: Option<BlockEnv> = self
                    .block_ranges
                    .get(name)
                    .and_then(|m| m.get(&pred))
                    .cloned();
                // A predecessor not yet visited in this run contributes
                // nothing; the next sweep picks it up.
                let Some(pred_env) = pred_env else { continue };
                let pred_block = function
                    .body
                    .get_block(pred)
                    .with_context(|| format!("missing predecessor {} in {}", pred, name))?;

                let mut narrowed: IndexSet<Value> = IndexSet::new();
                match &pred_block.terminator {
                    Terminator::Branch {
                        condition,
                        then_block,
                        ..
                    } => {
                        self.narrow_from_branch(
                            module, name, function, &defs, &pred_env, condition,
                            *then_block == block_id, &mut cur, &mut narrowed,
                        )?;
                    }
                    Terminator::Switch {
                        value: cond,
                        default,
                        cases,
                    } => {
                        if let Some(width) = types.width_of(cond) {
                            let mut case_rng = Crange::empty(width);
                            if *default == block_id {
                                for (c, _) in cases {
                                    if let Some(bits) = c.to_bits() {
                                        case_rng = case_rng.union(&Crange::point(width, bits));
                                    }
                                }
                                case_rng = case_rng.inverse();
                                // The default target keeps whatever flowed in
                                // alongside the complement of the cases.
                                if let Ok(incoming) =
                                    self.lookup_range(module, name, &pred_env, &defs, cond)
                                {
                                    case_rng = case_rng.union(&incoming.zext_or_trunc(width));
                                }
                            } else {
                                for (c, target) in cases {
                                    if *target == block_id {
                                        if let Some(bits) = c.to_bits() {
                                            case_rng =
                                                case_rng.union(&Crange::point(width, bits));
                                        }
                                    }
                                }
                            }
                            if !cond.is_constant() {
                                let existing = cur
                                    .get(cond)
                                    .cloned()
                                    .unwrap_or_else(|| Crange::empty(width));
                                cur.insert(cond.clone(), existing.union(&case_rng));
                                narrowed.insert(cond.clone());
                            }
                        }
                    }
                    Terminator::Jump(_) => {}
                    other => {
                        bail!(
                            "unexpected predecessor terminator {:?} in {}::{}",
                            other,
                            name,
                            pred
                        );
                    }
                }

                for (value, range) in &pred_env {
                    if narrowed.contains(value) {
                        continue;
                    }
                    match cur.get_mut(value) {
                        Some(existing) => *existing = existing.union(range),
                        None => {
                            cur.insert(value.clone(), range.clone());
                        }
                    }
                }
            }

            for inst in &block.instructions {
                self.transfer_instruction(
                    module, name, function, &types, &defs, block_id, inst, &mut cur,
                )?;
            }

            match &block.terminator {
                Terminator::Invalid => {
                    bail!("invalid terminator in {}::{}", name, block_id)
                }
                Terminator::Return(Some(value)) => {
                    if let Some(width) = function.signature.return_type.int_width() {
                        let range = self
                            .lookup_range(module, name, &cur, &defs, value)?
                            .zext_or_trunc(width);
                        let merged = self
                            .func_return_range
                            .get(name)
                            .map(|existing| existing.union(&range))
                            .unwrap_or(range);
                        self.func_return_range.insert(name.to_string(), merged);
                    }
                }
                _ => {}
            }

            self.block_ranges
                .entry(name.to_string())
                .or_default()
                .insert(block_id, cur);
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn narrow_from_branch(
        &mut self,
        module: &Module,
        name: &str,
        function: &Function,
        defs: &HashMap<Value, (BlockId, usize)>,
        pred_env: &BlockEnv,
        condition: &Value,
        is_true_branch: bool,
        cur: &mut BlockEnv,
        narrowed: &mut IndexSet<Value>,
    ) -> Result<()> {
        let Some(&(cmp_block, cmp_index)) = defs.get(condition) else {
            return Ok(());
        };
        let Some(Instruction::Cmp {
            pred: cmp_pred,
            left,
            right,
            ..
        }) = function
            .body
            .get_block(cmp_block)
            .and_then(|b| b.instructions.get(cmp_index))
        else {
            return Ok(());
        };

        let left_range = self.lookup_range(module, name, pred_env, defs, left)?;
        let right_range = self.lookup_range(module, name, pred_env, defs, right)?;
        let lw = left_range.width();
        let rw = right_range.width();

        let (left_pred, right_pred) = if is_true_branch {
            (*cmp_pred, cmp_pred.swapped())
        } else {
            (cmp_pred.inverse(), cmp_pred.inverse().swapped())
        };
        let left_region = Crange::cmp_region(left_pred, &right_range).zext_or_trunc(lw);
        let right_region = Crange::cmp_region(right_pred, &left_range).zext_or_trunc(rw);

        // A constant keeps its exact range; everything else is narrowed by
        // the region and rejoined with what other edges contributed.
        let new_left = if left.is_constant() {
            left_range.clone()
        } else {
            let existing = cur.get(left).cloned().unwrap_or_else(|| Crange::empty(lw));
            left_range.intersect(&left_region).union(&existing)
        };
        let new_right = if right.is_constant() {
            right_range.clone()
        } else {
            let existing = cur.get(right).cloned().unwrap_or_else(|| Crange::empty(rw));
            right_range.intersect(&right_region).union(&existing)
        };

        if new_left.is_empty() || new_right.is_empty() {
            self.impossible_branches
                .insert(Site::inst(name, cmp_block, cmp_index), is_true_branch);
        }

        if !left.is_constant() {
            cur.insert(left.clone(), new_left);
            narrowed.insert(left.clone());
        }
        if !right.is_constant() {
            cur.insert(right.clone(), new_right);
            narrowed.insert(right.clone());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer_instruction(
        &mut self,
        module: &Module,
        name: &str,
        function: &Function,
        types: &ValueTypes,
        defs: &HashMap<Value, (BlockId, usize)>,
        block_id: BlockId,
        inst: &Instruction,
        cur: &mut BlockEnv,
    ) -> Result<()> {
        match inst {
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                if let Some(callee_fn) = module.get_function(callee) {
                    if !callee_fn.is_declaration {
                        let callee_entry = callee_fn.entry_block();
                        for (i, param) in callee_fn.signature.params.iter().enumerate() {
                            let Some(pw) = param.param_type.int_width() else {
                                continue;
                            };
                            let Some(arg) = args.get(i) else { continue };
                            let arg_range = self
                                .lookup_range(module, name, cur, defs, arg)?
                                .zext_or_trunc(pw);
                            let key = Value::Param(ParamId(i as u32));
                            if callee == name && callee_entry == block_id {
                                let merged = cur
                                    .get(&key)
                                    .map(|existing| existing.union(&arg_range))
                                    .unwrap_or(arg_range);
                                cur.insert(key, merged);
                            } else {
                                let env = self
                                    .block_ranges
                                    .entry(callee.clone())
                                    .or_default()
                                    .entry(callee_entry)
                                    .or_default();
                                let merged = env
                                    .get(&key)
                                    .map(|existing| existing.union(&arg_range))
                                    .unwrap_or(arg_range);
                                env.insert(key, merged);
                            }
                        }
                    }
                    if let Some(rw) = callee_fn.signature.return_type.int_width() {
                        let ret = self
                            .func_return_range
                            .get(callee)
                            .cloned()
                            .unwrap_or_else(|| Crange::full(rw));
                        cur.insert(result.clone(), ret.zext_or_trunc(rw));
                    }
                } else {
                    warn!(callee = %callee, "call to undeclared function");
                }
                return Ok(());
            }
            Instruction::Store { address, value } => {
                let is_integer_value =
                    value.is_constant() || types.width_of(value).is_some();
                if !is_integer_value {
                    return Ok(());
                }
                let value_range = self.lookup_range(module, name, cur, defs, value)?;
                if let Some(g) = address.as_global() {
                    if let Some(width) = module.get_global(g).and_then(|gv| gv.ty.int_width()) {
                        let promoted = value_range.zext_or_trunc(width);
                        let merged = self
                            .global_range
                            .get(&g)
                            .map(|existing| existing.union(&promoted))
                            .unwrap_or_else(|| promoted.clone());
                        self.global_range.insert(g, merged);
                        // The stored value, at the global's width, is the
                        // block-local view of the address.
                        cur.insert(address.clone(), promoted);
                        return Ok(());
                    }
                }
                cur.insert(address.clone(), value_range);
                return Ok(());
            }
            _ => {}
        }

        let Some(result) = inst.result() else {
            return Ok(());
        };
        let Some(width) = types.width_of(result) else {
            if matches!(inst, Instruction::Other { .. }) {
                warn!(function = %name, "unhandled instruction kind, leaving range empty");
            }
            return Ok(());
        };

        let mut new_range = Crange::empty(width);
        match inst {
            Instruction::Binary {
                op, left, right, ..
            } => {
                let l = self
                    .lookup_range(module, name, cur, defs, left)?
                    .zext_or_trunc(width);
                let r = self
                    .lookup_range(module, name, cur, defs, right)?
                    .zext_or_trunc(width);
                new_range = apply_binary(*op, &l, &r);
            }
            Instruction::Select {
                then_val, else_val, ..
            } => {
                let t = self
                    .lookup_range(module, name, cur, defs, then_val)?
                    .zext_or_trunc(width);
                let f = self
                    .lookup_range(module, name, cur, defs, else_val)?
                    .zext_or_trunc(width);
                new_range = t.union(&f);
            }
            Instruction::Cast { kind, value, .. } => {
                let src = self.lookup_range(module, name, cur, defs, value)?;
                new_range = match kind {
                    CastKind::Trunc if width <= src.width() => src.truncate(width),
                    CastKind::ZExt if width >= src.width() => src.zero_extend(width),
                    CastKind::SExt if width >= src.width() => src.sign_extend(width),
                    _ => {
                        warn!(function = %name, "cast does not change width as declared");
                        src.zext_or_trunc(width)
                    }
                };
            }
            Instruction::Phi { incomings, .. } => {
                for (incoming_pred, value) in incomings {
                    if self
                        .backedges
                        .get(name)
                        .map_or(false, |b| b.is_cyclic_pred(block_id, *incoming_pred))
                    {
                        continue;
                    }
                    let contribution = if let Some(env) = self
                        .block_ranges
                        .get(name)
                        .and_then(|m| m.get(incoming_pred))
                    {
                        Some(self.lookup_range(module, name, env, defs, value)?)
                    } else {
                        value
                            .as_constant()
                            .and_then(Crange::from_constant)
                    };
                    if let Some(r) = contribution {
                        new_range = new_range.union(&r.zext_or_trunc(width));
                    }
                }
            }
            Instruction::Load { address, .. } => {
                new_range = self.load_range(
                    module, name, function, defs, cur, address, width,
                )?;
            }
            Instruction::Cmp { .. } => {
                // Comparison results stay at bottom; branches consume the
                // predicate, not a tracked {0,1} range.
            }
            Instruction::Other { mnemonic, .. } => {
                warn!(function = %name, mnemonic = %mnemonic, "no transfer function, range stays empty");
            }
            _ => {}
        }

        let merged = cur
            .get(result)
            .map(|existing| new_range.union(existing))
            .unwrap_or(new_range);
        cur.insert(result.clone(), merged);
        Ok(())
    }

    fn load_range(
        &mut self,
        module: &Module,
        name: &str,
        function: &Function,
        defs: &HashMap<Value, (BlockId, usize)>,
        cur: &BlockEnv,
        address: &Value,
        width: u16,
    ) -> Result<Crange> {
        if let Some(g) = address.as_global() {
            if module.get_global(g).map_or(false, |gv| gv.is_integer_scalar()) {
                // A store earlier in the block left the exact value under
                // the address key; prefer it over the global summary.
                if let Some(local) = cur.get(address) {
                    return Ok(local.zext_or_trunc(width));
                }
                return Ok(self
                    .global_range
                    .get(&g)
                    .cloned()
                    .unwrap_or_else(|| Crange::full(width))
                    .zext_or_trunc(width));
            }
        }

        if address.as_temp().is_some() {
            if let Some(&(gep_block, gep_index)) = defs.get(address) {
                if let Some(Instruction::Gep { base, indices, .. }) = function
                    .body
                    .get_block(gep_block)
                    .and_then(|b| b.instructions.get(gep_index))
                {
                    if let Some(g) = base.as_global() {
                        if let (Some(elements), true) = (
                            self.global_array_ranges.get(&g).cloned(),
                            indices.len() == 2,
                        ) {
                            let index_range =
                                self.lookup_range(module, name, cur, defs, &indices[1])?;
                            let index_max = index_range.unsigned_max().unwrap_or(0);
                            if index_max >= elements.len() as u128 {
                                self.gep_oob.insert(Site::inst(name, gep_block, gep_index));
                            }
                            let mut union_range = Crange::empty(width);
                            for element in &elements {
                                union_range = union_range.union(&element.zext_or_trunc(width));
                            }
                            return Ok(union_range);
                        }
                    }
                }
            }
        }

        warn!(function = %name, address = %address, "cannot analyze load address");
        Ok(Crange::full(width))
    }

    /// Range of a value at a program point. Constants are exact; anything
    /// else must be in the given environment, be a tracked global scalar,
    /// or fall back to the environment of its defining block (the only way
    /// a loop body, whose in-cycle merges are suppressed, sees values
    /// defined outside the cycle). A value with none of these is an
    /// invariant violation.
    fn lookup_range(
        &self,
        module: &Module,
        fname: &str,
        env: &BlockEnv,
        defs: &HashMap<Value, (BlockId, usize)>,
        value: &Value,
    ) -> Result<Crange> {
        if let Some(c) = value.as_constant() {
            return Crange::from_constant(c)
                .with_context(|| format!("unsupported constant width: {}", value));
        }
        if let Some(range) = env.get(value) {
            return Ok(range.clone());
        }
        if let Some(g) = value.as_global() {
            if let Some(range) = self.global_range.get(&g) {
                return Ok(range.clone());
            }
        }
        let def_block = match value {
            Value::Temp(_) => defs.get(value).map(|(block, _)| *block),
            Value::Param(_) => module.get_function(fname).map(|f| f.entry_block()),
            _ => None,
        };
        if let Some(block) = def_block {
            if let Some(range) = self
                .block_ranges
                .get(fname)
                .and_then(|m| m.get(&block))
                .and_then(|e| e.get(value))
            {
                return Ok(range.clone());
            }
        }
        bail!("no range for operand {} in {}", value, fname)
    }
}

/// Typed view of a function's values: parameter types plus declared
/// instruction result types, with call results resolved through the callee
/// signature and GEP results through the global they address.
struct ValueTypes {
    map: HashMap<Value, Type>,
}

impl ValueTypes {
    fn build(module: &Module, function: &Function) -> Self {
        let mut map = HashMap::new();
        for (index, param) in function.signature.params.iter().enumerate() {
            map.insert(
                Value::Param(ParamId(index as u32)),
                param.param_type.clone(),
            );
        }
        for block in function.body.blocks.values() {
            for inst in &block.instructions {
                let Some(result) = inst.result() else { continue };
                let ty = match inst {
                    Instruction::Call { callee, .. } => module
                        .get_function(callee)
                        .map(|f| f.signature.return_type.clone()),
                    Instruction::Gep { base, .. } => base
                        .as_global()
                        .and_then(|g| module.get_global(g))
                        .and_then(|gv| gv.ty.pointee().cloned())
                        .map(|t| Type::Ptr(Box::new(t))),
                    _ => inst.result_type(),
                };
                if let Some(ty) = ty {
                    map.insert(result.clone(), ty);
                }
            }
        }
        Self { map }
    }

    fn width_of(&self, value: &Value) -> Option<u16> {
        match value {
            Value::Constant(c) => Some(c.width()),
            _ => self.map.get(value).and_then(|t| t.int_width()),
        }
    }
}

fn def_positions(function: &Function) -> HashMap<Value, (BlockId, usize)> {
    let mut defs = HashMap::new();
    for (&block_id, block) in &function.body.blocks {
        for (index, inst) in block.instructions.iter().enumerate() {
            if let Some(result) = inst.result() {
                if result.as_temp().is_some() {
                    defs.insert(result.clone(), (block_id, index));
                }
            }
        }
    }
    defs
}
