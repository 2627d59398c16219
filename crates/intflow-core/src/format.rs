use crate::annotations::Site;
use crate::block::{BasicBlock, BlockId, Terminator};
use crate::function::Function;
use crate::instructions::Instruction;
use crate::module::Module;
use std::fmt::Write;

/// Readable listing of a whole module, with annotation channels rendered
/// as trailing comments so a dump shows what the analyses concluded.
pub fn format_module(module: &Module) -> String {
    let mut output = String::new();

    writeln!(&mut output, "; module: {}", module.name).unwrap();
    for global in module.globals.values() {
        let taint = module
            .annotations
            .taint(&Site::Global(global.id))
            .map(|_| "  ; taint")
            .unwrap_or("");
        writeln!(
            &mut output,
            "global {} {} : {}{}",
            global.id, global.name, global.ty, taint
        )
        .unwrap();
    }
    writeln!(&mut output).unwrap();

    for (name, function) in &module.functions {
        write!(&mut output, "{}", format_function(module, name, function)).unwrap();
        writeln!(&mut output).unwrap();
    }

    output
}

pub fn format_function(module: &Module, name: &str, function: &Function) -> String {
    let mut output = String::new();

    write!(&mut output, "function {}(", name).unwrap();
    for (i, param) in function.signature.params.iter().enumerate() {
        if i > 0 {
            write!(&mut output, ", ").unwrap();
        }
        write!(&mut output, "{}: {}", param.name, param.param_type).unwrap();
    }
    write!(&mut output, ") -> {}", function.signature.return_type).unwrap();

    if function.is_declaration {
        writeln!(&mut output, ";").unwrap();
        return output;
    }

    writeln!(&mut output, " {{").unwrap();
    for (block_id, block) in &function.body.blocks {
        write!(&mut output, "{}", format_block(module, name, *block_id, block)).unwrap();
    }
    writeln!(&mut output, "}}").unwrap();

    output
}

fn format_block(module: &Module, fname: &str, block_id: BlockId, block: &BasicBlock) -> String {
    let mut output = String::new();

    writeln!(&mut output, "{}:", block_id).unwrap();
    for (index, inst) in block.instructions.iter().enumerate() {
        let site = Site::inst(fname, block_id, index);
        writeln!(
            &mut output,
            "    {}{}",
            format_instruction(inst),
            format_markers(module, &site)
        )
        .unwrap();
    }
    let term_site = Site::term(fname, block_id);
    writeln!(
        &mut output,
        "    {}{}",
        format_terminator(&block.terminator),
        format_markers(module, &term_site)
    )
    .unwrap();

    output
}

fn format_markers(module: &Module, site: &Site) -> String {
    let mut markers = String::new();
    if let Some(label) = module.annotations.taint(site) {
        if label.is_empty() {
            markers.push_str("  ; taint");
        } else {
            write!(&mut markers, "  ; taint={}", label).unwrap();
        }
    }
    if let Some(name) = module.annotations.sink(site) {
        write!(&mut markers, "  ; sink={}", name).unwrap();
    }
    if let Some(kind) = module.annotations.error(site) {
        write!(&mut markers, "  ; error=\"{}\"", kind).unwrap();
    }
    markers
}

pub fn format_instruction(inst: &Instruction) -> String {
    match inst {
        Instruction::Binary {
            result,
            op,
            left,
            right,
            ty,
        } => format!("{} = {}.{} {}, {}", result, op.mnemonic(), ty, left, right),
        Instruction::Cmp {
            result,
            pred,
            left,
            right,
        } => format!("{} = icmp {} {}, {}", result, pred.mnemonic(), left, right),
        Instruction::Cast {
            result,
            kind,
            value,
            to,
        } => {
            let name = match kind {
                crate::instructions::CastKind::Trunc => "trunc",
                crate::instructions::CastKind::ZExt => "zext",
                crate::instructions::CastKind::SExt => "sext",
            };
            format!("{} = {} {} to {}", result, name, value, to)
        }
        Instruction::Select {
            result,
            condition,
            then_val,
            else_val,
            ..
        } => format!("{} = select {}, {}, {}", result, condition, then_val, else_val),
        Instruction::Phi {
            result, incomings, ..
        } => {
            let arms = incomings
                .iter()
                .map(|(block, value)| format!("[{}: {}]", block, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} = phi {}", result, arms)
        }
        Instruction::Load { result, address, ty } => {
            format!("{} = load.{} {}", result, ty, address)
        }
        Instruction::Store { address, value } => format!("store {}, {}", address, value),
        Instruction::Gep {
            result,
            base,
            indices,
        } => {
            let idx = indices
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} = gep {}, [{}]", result, base, idx)
        }
        Instruction::Call {
            result,
            callee,
            args,
        } => {
            let args = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} = call {}({})", result, callee, args)
        }
        Instruction::Other {
            result, mnemonic, ..
        } => match result {
            Some(result) => format!("{} = {}", result, mnemonic),
            None => mnemonic.clone(),
        },
    }
}

fn format_terminator(terminator: &Terminator) -> String {
    match terminator {
        Terminator::Jump(target) => format!("jump {}", target),
        Terminator::Branch {
            condition,
            then_block,
            else_block,
        } => format!("br {}, {}, {}", condition, then_block, else_block),
        Terminator::Switch {
            value,
            default,
            cases,
        } => {
            let arms = cases
                .iter()
                .map(|(c, block)| format!("{} -> {}", c, block))
                .collect::<Vec<_>>()
                .join(", ");
            format!("switch {}, default {}, [{}]", value, default, arms)
        }
        Terminator::Return(None) => "return".to_string(),
        Terminator::Return(Some(value)) => format!("return {}", value),
        Terminator::Unreachable => "unreachable".to_string(),
        Terminator::Invalid => "<invalid>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModuleBuilder;
    use crate::types::Type;

    #[test]
    fn test_format_listing() {
        let mut builder = ModuleBuilder::new("demo");
        let mut func = builder.function("f");
        func.param("x", Type::Int(32)).returns(Type::Int(32));
        let x = func.get_param(0);
        let mut entry = func.entry_block();
        let two = entry.constant_uint(2, 32);
        let doubled = entry.mul(x, two, Type::Int(32));
        entry.ret(Some(doubled));
        func.build();

        let listing = format_module(&builder.build());
        assert!(listing.contains("function f(x: i32) -> i32 {"));
        assert!(listing.contains("t0 = mul.i32 p0, 2u32"));
        assert!(listing.contains("return t0"));
    }
}
