//! The properties the fixed point depends on: monotonic growth, narrowing
//! that never excludes a feasible value, backedge suppression, and
//! stability of the declared fixed point.

use crate::analysis::{AnalyzerConfig, BackedgeAnalysis, IntMisusePass, RangeAnalysis};
use crate::block::Terminator;
use crate::builder::ModuleBuilder;
use crate::crange::Crange;
use crate::function::{Function, FunctionSignature};
use crate::instructions::{BinaryOp, CmpPredicate, Instruction};
use crate::module::Module;
use crate::types::Type;
use crate::values::{Constant, Value};
use indexmap::IndexSet;

/// f1 reads f2's summary before it exists, so the state takes several
/// sweeps to settle.
fn chained_module() -> Module {
    let mut builder = ModuleBuilder::new("chain");
    {
        let mut f1 = builder.function("f1");
        f1.returns(Type::Int(32));
        let mut entry = f1.entry_block();
        let a = entry.call("f2", vec![]);
        entry.ret(Some(a));
        f1.build();
    }
    {
        let mut f2 = builder.function("f2");
        f2.returns(Type::Int(32));
        let mut entry = f2.entry_block();
        let five = entry.constant_uint(5, 32);
        entry.ret(Some(five));
        f2.build();
    }
    builder.build()
}

#[test]
fn test_ranges_grow_monotonically_between_sweeps() {
    let module = chained_module();
    let config = AnalyzerConfig::default();
    let mut ranges = RangeAnalysis::new(config.iteration_cap);
    ranges.init(&module, &IndexSet::new(), &config);
    for (name, function) in &module.functions {
        ranges
            .backedges
            .insert(name.clone(), BackedgeAnalysis::from_function(function));
    }

    let targets: Vec<String> = ranges.analysis_funcs.iter().cloned().collect();
    for name in &targets {
        ranges.analyze_function(&module, name).unwrap();
    }
    let first_blocks = ranges.block_ranges.clone();
    let first_returns = ranges.func_return_range.clone();

    for name in &targets {
        ranges.analyze_function(&module, name).unwrap();
    }

    for (fname, blocks) in &first_blocks {
        for (block_id, env) in blocks {
            for (value, old_range) in env {
                let new_range = &ranges.block_ranges[fname][block_id][value];
                assert!(
                    new_range.contains_range(old_range),
                    "{}::{} {} shrank: {} -> {}",
                    fname,
                    block_id,
                    value,
                    old_range,
                    new_range
                );
            }
        }
    }
    for (fname, old_range) in &first_returns {
        assert!(ranges.func_return_range[fname].contains_range(old_range));
    }
}

#[test]
fn test_branch_narrowing_keeps_feasible_values() {
    // sys_nrw(x): both sides of x < 10 must admit every concrete x that
    // actually takes them.
    let mut builder = ModuleBuilder::new("narrow");
    let mut func = builder.function("sys_nrw");
    func.param("x", Type::Int(32)).returns(Type::Int(32));
    let x = func.get_param(0);
    let then_id = func.create_block_id();
    let else_id = func.create_block_id();
    {
        let mut entry = func.entry_block();
        let ten = entry.constant_uint(10, 32);
        let cond = entry.ult(x.clone(), ten);
        entry.branch(cond, then_id, else_id);
    }
    func.block_with_id(then_id).ret(Some(x.clone()));
    func.block_with_id(else_id).ret(Some(x));
    func.build();
    let mut module = builder.build();

    let (_, ranges) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    let function = module.get_function("sys_nrw").unwrap();
    let shim = function
        .body
        .get_block(function.entry_block())
        .unwrap()
        .instructions[0]
        .result()
        .unwrap()
        .clone();

    for concrete in 0..64u128 {
        let block = if concrete < 10 { then_id } else { else_id };
        let env = &ranges.block_ranges["sys_nrw"][&block][&shim];
        assert!(
            env.contains(concrete),
            "block {} excludes feasible value {}",
            block,
            concrete
        );
    }
}

/// entry -> header <-> body, header -> exit. The phi at the header may only
/// see its non-cyclic incoming edge.
fn loop_module() -> (Module, crate::block::BlockId, Value) {
    let mut signature = FunctionSignature::new("count");
    signature.return_type = Type::Int(32);
    let mut func = Function::new(signature);
    let entry = func.entry_block();
    let header = func.body.create_block();
    let body = func.body.create_block();
    let exit = func.body.create_block();
    let i = func.body.new_temp();
    let cond = func.body.new_temp();
    let inc = func.body.new_temp();

    func.body
        .get_block_mut(entry)
        .unwrap()
        .set_terminator(Terminator::Jump(header));
    {
        let block = func.body.get_block_mut(header).unwrap();
        block.add_instruction(Instruction::Phi {
            result: i.clone(),
            incomings: vec![
                (entry, Value::Constant(Constant::uint(0, 32))),
                (body, inc.clone()),
            ],
            ty: Type::Int(32),
        });
        block.add_instruction(Instruction::Cmp {
            result: cond.clone(),
            pred: CmpPredicate::Ult,
            left: i.clone(),
            right: Value::Constant(Constant::uint(10, 32)),
        });
        block.set_terminator(Terminator::Branch {
            condition: cond,
            then_block: body,
            else_block: exit,
        });
    }
    {
        let block = func.body.get_block_mut(body).unwrap();
        block.add_instruction(Instruction::Binary {
            result: inc,
            op: BinaryOp::Add,
            left: i.clone(),
            right: Value::Constant(Constant::uint(1, 32)),
            ty: Type::Int(32),
        });
        block.set_terminator(Terminator::Jump(header));
    }
    func.body
        .get_block_mut(exit)
        .unwrap()
        .set_terminator(Terminator::Return(Some(i.clone())));

    let mut module = Module::new("loop");
    module.add_function(func);
    (module, header, i)
}

#[test]
fn test_backedge_contributions_are_suppressed() {
    let (mut module, header, i) = loop_module();
    let (_, ranges) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    // Only the entry edge feeds the phi; the latch is suppressed, so the
    // header's view of the counter is its initial value.
    assert_eq!(ranges.block_ranges["count"][&header][&i], Crange::point(32, 0));
    assert!(ranges.converged);
}

#[test]
fn test_declared_fixed_point_is_stable() {
    let mut module = chained_module();
    let (report, mut ranges) = IntMisusePass::with_defaults().run(&mut module).unwrap();
    assert!(report.converged);

    let blocks = ranges.block_ranges.clone();
    let globals = ranges.global_range.clone();
    let returns = ranges.func_return_range.clone();

    let targets: Vec<String> = ranges.analysis_funcs.iter().cloned().collect();
    for name in &targets {
        ranges.analyze_function(&module, name).unwrap();
    }

    assert_eq!(ranges.block_ranges, blocks);
    assert_eq!(ranges.global_range, globals);
    assert_eq!(ranges.func_return_range, returns);
}

fn sink_module() -> Module {
    let mut builder = ModuleBuilder::new("sink");
    builder.declare_function(
        "kmalloc",
        vec![Type::Int(64)],
        Type::Ptr(Box::new(Type::Int(8))),
    );
    let mut func = builder.function("sys_foo");
    func.param("n", Type::Int(32));
    let n = func.get_param(0);
    let mut entry = func.entry_block();
    let four = entry.constant_uint(4, 32);
    let size = entry.mul(n, four, Type::Int(32));
    entry.call("kmalloc", vec![size]);
    entry.ret(None);
    func.build();
    builder.build()
}

#[test]
fn test_taint_marks_survive_reanalysis() {
    let mut module = sink_module();
    IntMisusePass::with_defaults().run(&mut module).unwrap();

    let tainted_before: Vec<_> = module
        .annotations
        .tainted_sites()
        .map(|(site, label)| (site.clone(), label.to_string()))
        .collect();
    assert!(!tainted_before.is_empty());

    // A second run over the already-annotated module finds the parameters
    // already rewritten; nothing it does may drop an existing mark.
    IntMisusePass::with_defaults().run(&mut module).unwrap();
    for (site, label) in &tainted_before {
        assert_eq!(module.annotations.taint(site), Some(label.as_str()));
    }
}

#[test]
fn test_every_tainted_function_is_attributable() {
    let mut module = sink_module();
    let (report, _) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    // Each entry is the source, the sink it feeds, or the synthesized
    // origin shim; nothing unrelated is swept in.
    for name in &report.tainted_functions {
        assert!(
            name == "sys_foo" || name == "kmalloc" || name == "sys_foo.mkint.arg0",
            "unattributable tainted function: {}",
            name
        );
    }
    assert!(report.tainted_functions.contains(&"sys_foo".to_string()));
    assert!(report.tainted_functions.contains(&"kmalloc".to_string()));
}
