use crate::block::{BasicBlock, BlockId};
use crate::types::Type;
use crate::values::{ParamId, TempId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub signature: FunctionSignature,
    pub body: FunctionBody,
    /// Declaration-only functions have an empty body and are never analyzed
    /// beyond their signature.
    pub is_declaration: bool,
}

impl Function {
    pub fn new(signature: FunctionSignature) -> Self {
        Self {
            signature,
            body: FunctionBody::new(),
            is_declaration: false,
        }
    }

    pub fn declaration(signature: FunctionSignature) -> Self {
        Self {
            signature,
            body: FunctionBody::empty(),
            is_declaration: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn entry_block(&self) -> BlockId {
        self.body.entry_block
    }

    pub fn returns_integer(&self) -> bool {
        self.signature.return_type.is_integer()
    }

    pub fn param_value(&self, index: usize) -> Value {
        Value::Param(ParamId(index as u32))
    }

    pub fn param_type(&self, index: usize) -> Option<&Type> {
        self.signature.params.get(index).map(|p| &p.param_type)
    }

    /// True when the given parameter appears as an operand anywhere in the
    /// body (instructions or terminators).
    pub fn param_is_used(&self, index: usize) -> bool {
        let param = Value::Param(ParamId(index as u32));
        self.body.blocks.values().any(|block| {
            block
                .instructions
                .iter()
                .any(|inst| inst.operands().into_iter().any(|v| *v == param))
                || block.terminator.operands().into_iter().any(|v| *v == param)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Type,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: Type::Void,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: Type,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: Type) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBody {
    pub entry_block: BlockId,
    pub blocks: IndexMap<BlockId, BasicBlock>,
    next_block_id: u32,
    next_temp_id: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        let entry_block = BlockId(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry_block, BasicBlock::new(entry_block));

        Self {
            entry_block,
            blocks,
            next_block_id: 1,
            next_temp_id: 0,
        }
    }

    fn empty() -> Self {
        Self {
            entry_block: BlockId(0),
            blocks: IndexMap::new(),
            next_block_id: 0,
            next_temp_id: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    pub fn new_temp(&mut self) -> Value {
        let id = TempId(self.next_temp_id);
        self.next_temp_id += 1;
        Value::Temp(id)
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }
}

impl Default for FunctionBody {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{BinaryOp, Instruction};

    #[test]
    fn test_body_block_allocation() {
        let mut body = FunctionBody::new();
        assert_eq!(body.entry_block, BlockId(0));
        let b1 = body.create_block();
        let b2 = body.create_block();
        assert_eq!(b1, BlockId(1));
        assert_eq!(b2, BlockId(2));
        assert_eq!(body.blocks.len(), 3);
    }

    #[test]
    fn test_param_use_detection() {
        let mut sig = FunctionSignature::new("f");
        sig.params.push(Parameter::new("x", Type::Int(32)));
        sig.params.push(Parameter::new("y", Type::Int(32)));
        sig.return_type = Type::Int(32);
        let mut func = Function::new(sig);

        let result = func.body.new_temp();
        let x = func.param_value(0);
        let entry = func.entry_block();
        func.body
            .get_block_mut(entry)
            .unwrap()
            .add_instruction(Instruction::Binary {
                result,
                op: BinaryOp::Add,
                left: x.clone(),
                right: x,
                ty: Type::Int(32),
            });

        assert!(func.param_is_used(0));
        assert!(!func.param_is_used(1));
    }
}
