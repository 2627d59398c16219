use crate::annotations::Site;
use crate::instructions::Instruction;
use crate::module::Module;
use crate::values::{GlobalId, Value};
use std::collections::HashMap;

/// Module-wide def/use index. Taint propagation crosses function
/// boundaries (through globals and call arguments), so unlike a
/// per-function chain the keys carry the owning function's name.
#[derive(Debug, Clone, Default)]
pub struct UserGraph {
    defs: HashMap<(String, Value), Site>,
    users: HashMap<(String, Value), Vec<Site>>,
    global_users: HashMap<GlobalId, Vec<Site>>,
    global_stores: HashMap<GlobalId, Vec<Site>>,
    calls_to: HashMap<String, Vec<Site>>,
}

impl UserGraph {
    pub fn build(module: &Module) -> Self {
        let mut graph = UserGraph::default();

        for (fname, function) in &module.functions {
            for (block_id, block) in &function.body.blocks {
                for (idx, inst) in block.instructions.iter().enumerate() {
                    let site = Site::inst(fname, *block_id, idx);

                    if let Some(result) = inst.result() {
                        if result.as_temp().is_some() {
                            graph
                                .defs
                                .insert((fname.clone(), result.clone()), site.clone());
                        }
                    }

                    for operand in inst.operands() {
                        graph.record_use(fname, operand, &site);
                    }

                    match inst {
                        Instruction::Store { address, .. } => {
                            if let Some(g) = address.as_global() {
                                graph.global_stores.entry(g).or_default().push(site.clone());
                            }
                        }
                        Instruction::Call { callee, .. } => {
                            graph
                                .calls_to
                                .entry(callee.clone())
                                .or_default()
                                .push(site.clone());
                        }
                        _ => {}
                    }
                }

                let term_site = Site::term(fname, *block_id);
                for operand in block.terminator.operands() {
                    graph.record_use(fname, operand, &term_site);
                }
            }
        }

        graph
    }

    fn record_use(&mut self, fname: &str, operand: &Value, site: &Site) {
        match operand {
            Value::Temp(_) | Value::Param(_) => {
                self.users
                    .entry((fname.to_string(), operand.clone()))
                    .or_default()
                    .push(site.clone());
            }
            Value::Global(g) => {
                self.global_users.entry(*g).or_default().push(site.clone());
            }
            Value::Constant(_) => {}
        }
    }

    /// Defining site of an instruction result within `function`.
    pub fn def_site(&self, function: &str, value: &Value) -> Option<&Site> {
        self.defs.get(&(function.to_string(), value.clone()))
    }

    pub fn users_of(&self, function: &str, value: &Value) -> &[Site] {
        self.users
            .get(&(function.to_string(), value.clone()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn global_users(&self, global: GlobalId) -> &[Site] {
        self.global_users
            .get(&global)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn global_stores(&self, global: GlobalId) -> &[Site] {
        self.global_stores
            .get(&global)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn call_sites(&self, callee: &str) -> &[Site] {
        self.calls_to
            .get(callee)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Resolves a site back to its instruction.
pub fn instruction_at<'m>(module: &'m Module, site: &Site) -> Option<&'m Instruction> {
    match site {
        Site::Instruction {
            function,
            block,
            index,
        } => module
            .get_function(function)?
            .body
            .get_block(*block)?
            .instructions
            .get(*index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Terminator;
    use crate::builder::ModuleBuilder;
    use crate::types::Type;

    #[test]
    fn test_defs_users_and_globals() {
        let mut builder = ModuleBuilder::new("m");
        let counter = builder.global_scalar("counter", 32, None);

        let mut func = builder.function("f");
        func.param("x", Type::Int(32)).returns(Type::Int(32));
        let x = func.get_param(0);
        let mut entry = func.entry_block();
        let four = entry.constant_uint(4, 32);
        let scaled = entry.mul(x.clone(), four, Type::Int(32));
        entry.store(Value::Global(counter), scaled.clone());
        let loaded = entry.load(Value::Global(counter), Type::Int(32));
        entry.ret(Some(loaded.clone()));
        func.build();

        let module = builder.build();
        let graph = UserGraph::build(&module);

        let def = graph.def_site("f", &scaled).expect("mul defines scaled");
        assert_eq!(
            *def,
            Site::inst("f", module.get_function("f").unwrap().entry_block(), 0)
        );

        // x feeds the multiply; scaled feeds the store.
        assert_eq!(graph.users_of("f", &x).len(), 1);
        assert_eq!(graph.users_of("f", &scaled).len(), 1);

        // The global is read and written once each; the loaded value flows
        // into the return terminator.
        assert_eq!(graph.global_stores(counter).len(), 1);
        assert_eq!(graph.global_users(counter).len(), 2);
        let ret_users = graph.users_of("f", &loaded);
        assert_eq!(ret_users.len(), 1);
        assert!(matches!(&ret_users[0], Site::Terminator { .. }));

        let entry_block = module.get_function("f").unwrap().entry_block();
        let inst = instruction_at(&module, &Site::inst("f", entry_block, 1));
        assert!(matches!(inst, Some(Instruction::Store { .. })));
        let term_block = module.get_function("f").unwrap().body.get_block(entry_block);
        assert!(matches!(
            term_block.unwrap().terminator,
            Terminator::Return(Some(_))
        ));
    }

    #[test]
    fn test_call_sites() {
        let mut builder = ModuleBuilder::new("m");
        builder.declare_function("ext", vec![Type::Int(32)], Type::Int(32));

        let mut func = builder.function("caller");
        func.param("x", Type::Int(32));
        let x = func.get_param(0);
        let mut entry = func.entry_block();
        entry.call("ext", vec![x]);
        entry.ret(None);
        func.build();

        let module = builder.build();
        let graph = UserGraph::build(&module);
        assert_eq!(graph.call_sites("ext").len(), 1);
        assert!(graph.call_sites("nope").is_empty());
    }
}
