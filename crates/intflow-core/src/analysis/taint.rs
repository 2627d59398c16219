//! Source-to-sink taint propagation.
//!
//! Sources are functions whose name carries a configured prefix; their used
//! integer parameters are rewritten into calls to synthesized shim functions
//! so the taint origin is an instruction, the only entity that carries
//! metadata. Propagation walks the use graph forward from each source and
//! marks everything that can reach a sink. The walk is an explicit worklist
//! with a visited set; the use graph of real programs has diamonds and
//! cycles that recursion does not survive.

use super::def_use::{instruction_at, UserGraph};
use super::pass::AnalyzerConfig;
use crate::annotations::Site;
use crate::function::FunctionSignature;
use crate::instructions::Instruction;
use crate::module::{replace_uses, Module};
use crate::types::Type;
use crate::values::{GlobalId, ParamId, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Marker every synthesized shim call carries in its callee name.
pub const SOURCE_SHIM_MARKER: &str = ".mkint.arg";

pub fn is_source_shim(name: &str) -> bool {
    name.contains(SOURCE_SHIM_MARKER)
}

#[derive(Debug, Clone, Default)]
pub struct TaintSummary {
    /// Functions whose behavior is considered tainted. Grows monotonically.
    pub taint_funcs: IndexSet<String>,
    /// Synthesized shim call sites, per source function.
    pub func_taint_sources: IndexMap<String, Vec<Site>>,
}

pub fn run(config: &AnalyzerConfig, module: &mut Module) -> TaintSummary {
    let func_taint_sources = synthesize_sources(config, module);
    let graph = UserGraph::build(module);
    mark_sinks(config, module, &graph);

    let adjacency = build_adjacency(module, &graph);
    let reaches_sink = sink_reaching_sites(module, &adjacency);

    let mut taint_funcs: IndexSet<String> = IndexSet::new();

    // Initial sweep: from every synthesized source call.
    let mut initial = Vec::new();
    {
        let prop = Propagation {
            module,
            graph: &graph,
            adjacency: &adjacency,
            reaches_sink: &reaches_sink,
            config,
        };
        for (fname, shims) in &func_taint_sources {
            initial.push((fname.clone(), prop.from_starts(shims)));
        }
    }
    for (fname, result) in initial {
        if !result.reached_starts.is_empty() {
            taint_funcs.insert(fname);
        }
        apply(module, &mut taint_funcs, &result);
        for site in &result.reached_starts {
            module.annotations.set_taint(site.clone(), "source");
        }
    }

    // Re-run from the parameters of every tainted non-source function until
    // the set stops growing.
    loop {
        let before = taint_funcs.len();
        let snapshot: Vec<String> = taint_funcs.iter().cloned().collect();
        let mut results = Vec::new();
        {
            let prop = Propagation {
                module,
                graph: &graph,
                adjacency: &adjacency,
                reaches_sink: &reaches_sink,
                config,
            };
            for fname in &snapshot {
                if config.is_source(fname) {
                    continue;
                }
                let Some(function) = module.get_function(fname) else {
                    continue;
                };
                if function.is_declaration {
                    continue;
                }
                let mut starts = Vec::new();
                for i in 0..function.signature.params.len() {
                    starts.extend(
                        prop.graph
                            .users_of(fname, &Value::Param(ParamId(i as u32)))
                            .iter()
                            .cloned(),
                    );
                }
                results.push(prop.from_starts(&starts));
            }
        }
        for result in results {
            apply(module, &mut taint_funcs, &result);
        }
        if taint_funcs.len() == before {
            break;
        }
    }

    debug!(tainted_functions = taint_funcs.len(), "taint analysis converged");
    TaintSummary {
        taint_funcs,
        func_taint_sources,
    }
}

fn apply(module: &mut Module, taint_funcs: &mut IndexSet<String>, result: &PropagationResult) {
    for site in &result.tainted {
        module.annotations.set_taint(site.clone(), "");
    }
    for g in &result.tainted_globals {
        module.annotations.set_taint(Site::Global(*g), "");
    }
    for f in &result.new_taint_funcs {
        taint_funcs.insert(f.clone());
    }
}

/// Rewrites each used integer parameter of a source function into a call to
/// a freshly declared `<fn>.mkint.arg<N>` shim at the top of the entry
/// block, and redirects the parameter's uses to the call result. The shims
/// stay in the emitted module; they carry the `source` marker downstream.
fn synthesize_sources(config: &AnalyzerConfig, module: &mut Module) -> IndexMap<String, Vec<Site>> {
    let source_names: Vec<String> = module
        .functions
        .iter()
        .filter(|(name, f)| config.is_source(name) && !f.is_declaration && !is_source_shim(name))
        .map(|(name, _)| name.clone())
        .collect();

    let mut out = IndexMap::new();
    for name in source_names {
        let mut declarations: Vec<(String, u16)> = Vec::new();
        let mut sites = Vec::new();
        {
            let func = module.functions.get_mut(&name).expect("source function");
            let entry = func.body.entry_block;
            let widths: Vec<(usize, u16)> = func
                .signature
                .params
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.param_type.int_width().map(|w| (i, w)))
                .collect();

            let mut inserted = 0usize;
            for (index, width) in widths {
                if !func.param_is_used(index) {
                    continue;
                }
                let shim_name = format!("{}{}{}", name, SOURCE_SHIM_MARKER, index);
                debug!(callee = %shim_name, "synthesizing taint source call");
                let result = func.body.new_temp();
                func.body
                    .get_block_mut(entry)
                    .expect("entry block")
                    .instructions
                    .insert(
                        inserted,
                        Instruction::Call {
                            result: result.clone(),
                            callee: shim_name.clone(),
                            args: Vec::new(),
                        },
                    );
                replace_uses(func, &Value::Param(ParamId(index as u32)), &result);
                sites.push(Site::inst(&name, entry, inserted));
                declarations.push((shim_name, width));
                inserted += 1;
            }
        }
        for (shim_name, width) in declarations {
            let mut signature = FunctionSignature::new(shim_name);
            signature.return_type = Type::Int(width);
            module.declare_function(signature);
        }
        out.insert(name, sites);
    }
    out
}

/// Marks the producers of designated sink arguments, and the returns of
/// source functions whose result escapes into non-source callers.
fn mark_sinks(config: &AnalyzerConfig, module: &mut Module, graph: &UserGraph) {
    let mut marks: Vec<(Site, String)> = Vec::new();

    for (fname, function) in &module.functions {
        for block in function.body.blocks.values() {
            for inst in &block.instructions {
                let Instruction::Call { callee, args, .. } = inst else {
                    continue;
                };
                for (sink_name, arg_index) in &config.sinks {
                    if callee == sink_name {
                        if let Some(arg) = args.get(*arg_index) {
                            if arg.as_temp().is_some() {
                                if let Some(def) = graph.def_site(fname, arg) {
                                    debug!(
                                        sink = %sink_name,
                                        arg = *arg_index,
                                        "marking sink argument producer"
                                    );
                                    marks.push((def.clone(), sink_name.clone()));
                                }
                            }
                        }
                        break;
                    } else if callee.starts_with(sink_name.as_str()) {
                        warn!(callee = %callee, sink = %sink_name, "possible unlisted sink");
                    }
                }
            }
        }
    }

    // A source function's integer return used by any non-source function
    // leaks across the trust boundary; each of its returns becomes a sink.
    for (fname, function) in &module.functions {
        if !config.is_source(fname)
            || is_source_shim(fname)
            || function.is_declaration
            || !function.returns_integer()
        {
            continue;
        }
        let escapes = graph.call_sites(fname).iter().any(|site| {
            site.function()
                .map_or(false, |caller| !config.is_source(caller))
        });
        if !escapes {
            continue;
        }
        for (block_id, block) in &function.body.blocks {
            if block.terminator.is_return() {
                debug!(function = %fname, "marking boundary return as sink");
                marks.push((Site::term(fname, *block_id), "return".to_string()));
            }
        }
    }

    for (site, name) in marks {
        module.annotations.set_sink(site, name);
    }
}

/// Forward taint edges: an instruction feeds its users; a store to a global
/// feeds every other user of that global; a call into a defined function
/// feeds the users of that function's parameters.
fn build_adjacency(module: &Module, graph: &UserGraph) -> HashMap<Site, Vec<Site>> {
    let mut adjacency = HashMap::new();

    for (fname, function) in &module.functions {
        for (block_id, block) in &function.body.blocks {
            for (idx, inst) in block.instructions.iter().enumerate() {
                let site = Site::inst(fname, *block_id, idx);
                let mut successors = Vec::new();

                if let Some(result) = inst.result() {
                    if result.as_temp().is_some() {
                        successors.extend(graph.users_of(fname, result).iter().cloned());
                    }
                }

                match inst {
                    Instruction::Store { address, .. } => {
                        if let Some(g) = address.as_global() {
                            successors.extend(
                                graph
                                    .global_users(g)
                                    .iter()
                                    .filter(|s| **s != site)
                                    .cloned(),
                            );
                        }
                    }
                    Instruction::Call { callee, .. } => {
                        if let Some(f) = module.get_function(callee) {
                            if !f.is_declaration {
                                for i in 0..f.signature.params.len() {
                                    successors.extend(
                                        graph
                                            .users_of(callee, &Value::Param(ParamId(i as u32)))
                                            .iter()
                                            .cloned(),
                                    );
                                }
                            }
                        }
                    }
                    _ => {}
                }

                adjacency.insert(site, successors);
            }
            adjacency.insert(Site::term(fname, *block_id), Vec::new());
        }
    }

    adjacency
}

/// The set of sites from which some sink is reachable: reverse BFS from
/// every sink-marked site over the forward edges.
fn sink_reaching_sites(module: &Module, adjacency: &HashMap<Site, Vec<Site>>) -> HashSet<Site> {
    let mut reverse: HashMap<Site, Vec<Site>> = HashMap::new();
    for (site, successors) in adjacency {
        for succ in successors {
            reverse.entry(succ.clone()).or_default().push(site.clone());
        }
    }

    let mut reached: HashSet<Site> = module
        .annotations
        .sink_sites()
        .map(|(site, _)| site.clone())
        .filter(|site| !matches!(site, Site::Global(_)))
        .collect();
    let mut queue: VecDeque<Site> = reached.iter().cloned().collect();

    while let Some(site) = queue.pop_front() {
        if let Some(preds) = reverse.get(&site) {
            for pred in preds {
                if reached.insert(pred.clone()) {
                    queue.push_back(pred.clone());
                }
            }
        }
    }

    reached
}

struct Propagation<'m> {
    module: &'m Module,
    graph: &'m UserGraph,
    adjacency: &'m HashMap<Site, Vec<Site>>,
    reaches_sink: &'m HashSet<Site>,
    config: &'m AnalyzerConfig,
}

#[derive(Debug, Default)]
struct PropagationResult {
    tainted: Vec<Site>,
    tainted_globals: Vec<GlobalId>,
    new_taint_funcs: Vec<String>,
    reached_starts: Vec<Site>,
}

impl<'m> Propagation<'m> {
    /// Forward worklist walk restricted to sink-reaching sites. Sink sites
    /// terminate the walk: they are credited, never marked tainted, and
    /// never expanded.
    fn from_starts(&self, starts: &[Site]) -> PropagationResult {
        let mut result = PropagationResult::default();
        let mut visited: HashSet<Site> = HashSet::new();
        let mut queue: VecDeque<Site> = VecDeque::new();

        for start in starts {
            if self.reaches_sink.contains(start) {
                result.reached_starts.push(start.clone());
                queue.push_back(start.clone());
            }
        }

        while let Some(site) = queue.pop_front() {
            if !visited.insert(site.clone()) {
                continue;
            }

            if self.module.annotations.sink(&site).is_some() {
                // The producer feeding a sink is on a source-to-sink path:
                // tainted, credited, and not expanded further.
                result.tainted.push(site.clone());
                result.new_taint_funcs.extend(self.sink_callees(&site));
                continue;
            }

            result.tainted.push(site.clone());

            if let Some(inst) = instruction_at(self.module, &site) {
                match inst {
                    Instruction::Store { address, .. } => {
                        if let Some(g) = address.as_global() {
                            result.tainted_globals.push(g);
                        }
                    }
                    Instruction::Call { callee, .. } => {
                        if let Some(f) = self.module.get_function(callee) {
                            if !f.is_declaration && self.callee_params_reach_sink(callee, f) {
                                result.new_taint_funcs.push(callee.clone());
                            }
                            // A call whose result is on a taint path makes
                            // the callee suspect, body or not.
                            if f.signature.return_type != Type::Void {
                                result.new_taint_funcs.push(callee.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }

            if let Some(successors) = self.adjacency.get(&site) {
                for succ in successors {
                    if self.reaches_sink.contains(succ) && !visited.contains(succ) {
                        queue.push_back(succ.clone());
                    }
                }
            }
        }

        result
    }

    /// Sink functions fed by this site's result: users that are calls to a
    /// configured sink name.
    fn sink_callees(&self, site: &Site) -> Vec<String> {
        let mut out = Vec::new();
        let Some(inst) = instruction_at(self.module, site) else {
            return out;
        };
        let Some(result) = inst.result() else {
            return out;
        };
        let Some(fname) = site.function() else {
            return out;
        };
        for user in self.graph.users_of(fname, result) {
            if let Some(Instruction::Call { callee, .. }) = instruction_at(self.module, user) {
                if self.config.sink_arg(callee).is_some()
                    && self.module.functions.contains_key(callee)
                {
                    out.push(callee.clone());
                }
            }
        }
        out
    }

    fn callee_params_reach_sink(&self, callee: &str, function: &crate::function::Function) -> bool {
        (0..function.signature.params.len()).any(|i| {
            self.graph
                .users_of(callee, &Value::Param(ParamId(i as u32)))
                .iter()
                .any(|site| self.reaches_sink.contains(site))
        })
    }
}
