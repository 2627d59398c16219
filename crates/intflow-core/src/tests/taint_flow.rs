//! Taint engine specifics: shim synthesis, global fan-out, boundary
//! returns, and termination on cyclic use graphs.

use crate::analysis::IntMisusePass;
use crate::annotations::Site;
use crate::block::Terminator;
use crate::builder::ModuleBuilder;
use crate::crange::Crange;
use crate::function::{Function, FunctionSignature, Parameter};
use crate::instructions::{BinaryOp, CmpPredicate, Instruction};
use crate::module::Module;
use crate::types::Type;
use crate::values::{Constant, Value};

fn i8_ptr() -> Type {
    Type::Ptr(Box::new(Type::Int(8)))
}

#[test]
fn test_store_to_global_carries_taint_across_functions() {
    // sys_set(n) writes a global; consume() reads it into malloc's size.
    let mut builder = ModuleBuilder::new("globals");
    builder.declare_function("malloc", vec![Type::Int(64)], i8_ptr());
    let shared = builder.global_scalar("shared_len", 32, None);
    {
        let mut func = builder.function("sys_set");
        func.param("n", Type::Int(32));
        let n = func.get_param(0);
        let mut entry = func.entry_block();
        entry.store(Value::Global(shared), n);
        entry.ret(None);
        func.build();
    }
    {
        let mut func = builder.function("consume");
        let mut entry = func.entry_block();
        let loaded = entry.load(Value::Global(shared), Type::Int(32));
        let one = entry.constant_uint(1, 32);
        let size = entry.add(loaded, one, Type::Int(32));
        entry.call("malloc", vec![size]);
        entry.ret(None);
        func.build();
    }
    let mut module = builder.build();

    let (report, _) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    let set_entry = module.get_function("sys_set").unwrap().entry_block();
    let consume_entry = module.get_function("consume").unwrap().entry_block();

    // [shim, store] in sys_set; [load, add, call] in consume.
    assert_eq!(
        module.annotations.taint(&Site::inst("sys_set", set_entry, 0)),
        Some("source")
    );
    assert_eq!(
        module.annotations.taint(&Site::inst("sys_set", set_entry, 1)),
        Some("")
    );
    assert_eq!(module.annotations.taint(&Site::Global(shared)), Some(""));
    assert_eq!(
        module
            .annotations
            .taint(&Site::inst("consume", consume_entry, 0)),
        Some("")
    );
    assert_eq!(
        module
            .annotations
            .sink(&Site::inst("consume", consume_entry, 1)),
        Some("malloc")
    );

    assert!(report.tainted_functions.contains(&"sys_set".to_string()));
    assert!(report.tainted_functions.contains(&"malloc".to_string()));
    assert!(!report.tainted_functions.contains(&"consume".to_string()));
}

/// A counting loop whose phi/add pair forms a use cycle, with the counter
/// flowing into a sink after the loop.
fn cyclic_module() -> (Module, crate::block::BlockId, crate::block::BlockId) {
    let mut module = Module::new("cyclic");

    let mut sink_sig = FunctionSignature::new("__mkint_sink0");
    sink_sig.params.push(Parameter::new("v", Type::Int(32)));
    module.declare_function(sink_sig);

    let mut signature = FunctionSignature::new("sys_loop");
    signature.params.push(Parameter::new("n", Type::Int(32)));
    signature.return_type = Type::Int(32);
    let mut func = Function::new(signature);
    let entry = func.entry_block();
    let header = func.body.create_block();
    let body = func.body.create_block();
    let exit = func.body.create_block();
    let i = func.body.new_temp();
    let cond = func.body.new_temp();
    let inc = func.body.new_temp();
    let sunk = func.body.new_temp();

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
            right: Value::Param(crate::values::ParamId(0)),
            ty: Type::Int(32),
        });
        block.set_terminator(Terminator::Jump(header));
    }
    {
        let block = func.body.get_block_mut(exit).unwrap();
        block.add_instruction(Instruction::Call {
            result: sunk,
            callee: "__mkint_sink0".to_string(),
            args: vec![i.clone()],
        });
        block.set_terminator(Terminator::Return(Some(i)));
    }
    module.add_function(func);
    (module, header, body)
}

#[test]
fn test_worklist_terminates_on_cyclic_use_graph() {
    let (mut module, header, body) = cyclic_module();
    let (report, _) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    // The phi produces the sink argument; the in-loop add sits on the path.
    assert_eq!(
        module.annotations.sink(&Site::inst("sys_loop", header, 0)),
        Some("__mkint_sink0")
    );
    assert_eq!(
        module.annotations.taint(&Site::inst("sys_loop", body, 0)),
        Some("")
    );
    assert!(report.tainted_functions.contains(&"sys_loop".to_string()));
    assert!(report
        .tainted_functions
        .contains(&"__mkint_sink0".to_string()));
}

#[test]
fn test_escaping_source_return_becomes_sink() {
    let mut builder = ModuleBuilder::new("boundary");
    {
        let mut func = builder.function("sys_get");
        func.returns(Type::Int(32));
        let mut entry = func.entry_block();
        let seven = entry.constant_uint(7, 32);
        entry.ret(Some(seven));
        func.build();
    }
    let call_result;
    {
        let mut func = builder.function("driver");
        func.returns(Type::Int(32));
        let mut entry = func.entry_block();
        call_result = entry.call("sys_get", vec![]);
        entry.ret(Some(call_result.clone()));
        func.build();
    }
    let mut module = builder.build();

    let (_, ranges) = IntMisusePass::with_defaults().run(&mut module).unwrap();

    let get_entry = module.get_function("sys_get").unwrap().entry_block();
    assert_eq!(
        module.annotations.sink(&Site::term("sys_get", get_entry)),
        Some("return")
    );

    // The summary still flows: the caller sees the exact constant.
    assert_eq!(ranges.func_return_range["sys_get"], Crange::point(32, 7));
    let driver_entry = module.get_function("driver").unwrap().entry_block();
    assert_eq!(
        ranges.block_ranges["driver"][&driver_entry][&call_result],
        Crange::point(32, 7)
    );
}

#[test]
fn test_only_used_integer_params_get_shims() {
    let mut builder = ModuleBuilder::new("partial");
    let mut func = builder.function("sys_partial");
    func.param("unused", Type::Int(32))
        .param("used", Type::Int(32))
        .returns(Type::Int(32));
    let used = func.get_param(1);
    let mut entry = func.entry_block();
    entry.ret(Some(used));
    func.build();
    let mut module = builder.build();

    IntMisusePass::with_defaults().run(&mut module).unwrap();

    let function = module.get_function("sys_partial").unwrap();
    let entry_block = function.body.get_block(function.entry_block()).unwrap();
    assert_eq!(entry_block.instructions.len(), 1);
    match &entry_block.instructions[0] {
        Instruction::Call { callee, .. } => assert_eq!(callee, "sys_partial.mkint.arg1"),
        other => panic!("expected shim call, found {:?}", other),
    }
    let shim = module.get_function("sys_partial.mkint.arg1").unwrap();
    assert!(shim.is_declaration);
    assert_eq!(shim.signature.return_type, Type::Int(32));
}
