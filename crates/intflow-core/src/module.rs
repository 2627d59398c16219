use crate::annotations::AnnotationMap;
use crate::function::{Function, FunctionSignature};
use crate::types::Type;
use crate::values::{Constant, GlobalId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A whole translation unit: functions in program order, module-level
/// globals, and the annotation channels the analyses write into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: IndexMap<String, Function>,
    pub globals: IndexMap<GlobalId, GlobalVar>,
    pub annotations: AnnotationMap,
    next_global_id: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            globals: IndexMap::new(),
            annotations: AnnotationMap::new(),
            next_global_id: 0,
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions
            .insert(function.signature.name.clone(), function);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Inserts a declaration unless the name already exists.
    pub fn declare_function(&mut self, signature: FunctionSignature) {
        if !self.functions.contains_key(&signature.name) {
            let name = signature.name.clone();
            self.functions.insert(name, Function::declaration(signature));
        }
    }

    pub fn add_global(&mut self, var: GlobalVarSpec) -> GlobalId {
        let id = GlobalId(self.next_global_id);
        self.next_global_id += 1;
        self.globals.insert(
            id,
            GlobalVar {
                id,
                name: var.name,
                ty: var.ty,
                initializer: var.initializer,
            },
        );
        id
    }

    pub fn get_global(&self, id: GlobalId) -> Option<&GlobalVar> {
        self.globals.get(&id)
    }

    /// Structural soundness: defined functions have terminated blocks and
    /// every integer stays inside the width the analyses can represent.
    pub fn validate(&self) -> crate::Result<()> {
        for (name, function) in &self.functions {
            for param in &function.signature.params {
                if let Some(width) = param.param_type.int_width() {
                    if width == 0 || width > crate::types::MAX_INT_WIDTH {
                        return Err(crate::IrError::UnsupportedWidth(width));
                    }
                }
            }
            if function.is_declaration {
                continue;
            }
            if function.body.blocks.is_empty() {
                return Err(crate::IrError::EmptyFunction(name.clone()));
            }
            for (block_id, block) in &function.body.blocks {
                if !block.is_terminated() {
                    return Err(crate::IrError::UnterminatedBlock(format!(
                        "{}::{}",
                        name, block_id
                    )));
                }
            }
        }
        for global in self.globals.values() {
            if let Some(width) = global.element_width() {
                if width == 0 || width > crate::types::MAX_INT_WIDTH {
                    return Err(crate::IrError::UnsupportedWidth(width));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub id: GlobalId,
    pub name: String,
    pub ty: Type,
    pub initializer: Option<GlobalInit>,
}

impl GlobalVar {
    pub fn is_integer_scalar(&self) -> bool {
        self.ty.is_integer()
    }

    pub fn is_integer_array(&self) -> bool {
        matches!(&self.ty, Type::Array(elem, _) if elem.is_integer())
    }

    pub fn element_width(&self) -> Option<u16> {
        match &self.ty {
            Type::Int(bits) => Some(*bits),
            Type::Array(elem, _) => elem.int_width(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalInit {
    Scalar(Constant),
    Array(Vec<Constant>),
}

/// Construction-time description of a global, before an id is assigned.
#[derive(Debug, Clone)]
pub struct GlobalVarSpec {
    pub name: String,
    pub ty: Type,
    pub initializer: Option<GlobalInit>,
}

impl GlobalVarSpec {
    pub fn scalar(name: impl Into<String>, bits: u16, init: Option<Constant>) -> Self {
        Self {
            name: name.into(),
            ty: Type::Int(bits),
            initializer: init.map(GlobalInit::Scalar),
        }
    }

    pub fn array(
        name: impl Into<String>,
        elem_bits: u16,
        len: usize,
        init: Option<Vec<Constant>>,
    ) -> Self {
        Self {
            name: name.into(),
            ty: Type::Array(Box::new(Type::Int(elem_bits)), len),
            initializer: init.map(GlobalInit::Array),
        }
    }
}

/// Redirects every read of `from` to `to` inside one function body. Used
/// once, when taint-source parameters are rewritten to shim calls.
pub fn replace_uses(function: &mut Function, from: &Value, to: &Value) {
    for block in function.body.blocks.values_mut() {
        for inst in &mut block.instructions {
            for operand in inst.operands_mut() {
                if operand == from {
                    *operand = to.clone();
                }
            }
        }
        for operand in block.terminator.operands_mut() {
            if operand == from {
                *operand = to.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Terminator;
    use crate::function::Parameter;
    use crate::instructions::{BinaryOp, Instruction};
    use crate::values::ParamId;

    #[test]
    fn test_global_registration() {
        let mut module = Module::new("m");
        let g0 = module.add_global(GlobalVarSpec::scalar("counter", 32, None));
        let g1 = module.add_global(GlobalVarSpec::array("table", 32, 8, None));
        assert_eq!(g0, GlobalId(0));
        assert_eq!(g1, GlobalId(1));
        assert!(module.get_global(g0).unwrap().is_integer_scalar());
        assert!(module.get_global(g1).unwrap().is_integer_array());
        assert_eq!(module.get_global(g1).unwrap().element_width(), Some(32));
    }

    #[test]
    fn test_declare_function_is_idempotent() {
        let mut module = Module::new("m");
        let mut sig = FunctionSignature::new("kmalloc");
        sig.return_type = Type::Int(64);
        module.declare_function(sig.clone());
        module.declare_function(sig);
        assert_eq!(module.functions.len(), 1);
        assert!(module.get_function("kmalloc").unwrap().is_declaration);
    }

    #[test]
    fn test_replace_uses_rewrites_operands_and_terminators() {
        let mut sig = FunctionSignature::new("f");
        sig.params.push(Parameter::new("x", Type::Int(32)));
        sig.return_type = Type::Int(32);
        let mut func = Function::new(sig);

        let x = Value::Param(ParamId(0));
        let t0 = func.body.new_temp();
        let entry = func.entry_block();
        let block = func.body.get_block_mut(entry).unwrap();
        block.add_instruction(Instruction::Binary {
            result: t0.clone(),
            op: BinaryOp::Add,
            left: x.clone(),
            right: x.clone(),
            ty: Type::Int(32),
        });
        block.set_terminator(Terminator::Return(Some(x.clone())));

        let shim = func.body.new_temp();
        replace_uses(&mut func, &x, &shim);

        let block = func.body.get_block(entry).unwrap();
        match &block.instructions[0] {
            Instruction::Binary { left, right, .. } => {
                assert_eq!(left, &shim);
                assert_eq!(right, &shim);
            }
            other => panic!("unexpected instruction: {:?}", other),
        }
        assert_eq!(block.terminator, Terminator::Return(Some(shim)));
    }
}
