use crate::block::{BlockId, Terminator};
use crate::function::FunctionBody;
use crate::instructions::{BinaryOp, CastKind, CmpPredicate, Instruction};
use crate::types::Type;
use crate::values::{Constant, Value};

pub struct BlockBuilder<'a> {
    body: &'a mut FunctionBody,
    block_id: BlockId,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(body: &'a mut FunctionBody, block_id: BlockId) -> Self {
        Self { body, block_id }
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    fn push(&mut self, inst: Instruction) {
        self.body
            .get_block_mut(self.block_id)
            .expect("block exists")
            .add_instruction(inst);
    }

    pub fn constant_uint(&self, value: u64, bits: u16) -> Value {
        Value::Constant(Constant::uint(value, bits))
    }

    pub fn constant_int(&self, value: i64, bits: u16) -> Value {
        Value::Constant(Constant::int(value, bits))
    }

    pub fn constant_bool(&self, value: bool) -> Value {
        Value::Constant(Constant::Bool(value))
    }

    pub fn binary(&mut self, op: BinaryOp, left: Value, right: Value, ty: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Binary {
            result: result.clone(),
            op,
            left,
            right,
            ty,
        });
        result
    }

    pub fn add(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::Add, left, right, ty)
    }

    pub fn sub(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::Sub, left, right, ty)
    }

    pub fn mul(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::Mul, left, right, ty)
    }

    pub fn udiv(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::UDiv, left, right, ty)
    }

    pub fn sdiv(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::SDiv, left, right, ty)
    }

    pub fn shl(&mut self, left: Value, right: Value, ty: Type) -> Value {
        self.binary(BinaryOp::Shl, left, right, ty)
    }

    pub fn cmp(&mut self, pred: CmpPredicate, left: Value, right: Value) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Cmp {
            result: result.clone(),
            pred,
            left,
            right,
        });
        result
    }

    pub fn eq(&mut self, left: Value, right: Value) -> Value {
        self.cmp(CmpPredicate::Eq, left, right)
    }

    pub fn ult(&mut self, left: Value, right: Value) -> Value {
        self.cmp(CmpPredicate::Ult, left, right)
    }

    pub fn ugt(&mut self, left: Value, right: Value) -> Value {
        self.cmp(CmpPredicate::Ugt, left, right)
    }

    pub fn slt(&mut self, left: Value, right: Value) -> Value {
        self.cmp(CmpPredicate::Slt, left, right)
    }

    pub fn cast(&mut self, kind: CastKind, value: Value, to: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Cast {
            result: result.clone(),
            kind,
            value,
            to,
        });
        result
    }

    pub fn trunc(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastKind::Trunc, value, to)
    }

    pub fn zext(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastKind::ZExt, value, to)
    }

    pub fn sext(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastKind::SExt, value, to)
    }

    pub fn select(&mut self, condition: Value, then_val: Value, else_val: Value, ty: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Select {
            result: result.clone(),
            condition,
            then_val,
            else_val,
            ty,
        });
        result
    }

    pub fn phi(&mut self, incomings: Vec<(BlockId, Value)>, ty: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Phi {
            result: result.clone(),
            incomings,
            ty,
        });
        result
    }

    pub fn load(&mut self, address: Value, ty: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Load {
            result: result.clone(),
            address,
            ty,
        });
        result
    }

    pub fn store(&mut self, address: Value, value: Value) {
        self.push(Instruction::Store { address, value });
    }

    pub fn gep(&mut self, base: Value, indices: Vec<Value>) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Gep {
            result: result.clone(),
            base,
            indices,
        });
        result
    }

    pub fn call(&mut self, callee: &str, args: Vec<Value>) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Call {
            result: result.clone(),
            callee: callee.to_string(),
            args,
        });
        result
    }

    pub fn other(&mut self, mnemonic: &str, ty: Type) -> Value {
        let result = self.body.new_temp();
        self.push(Instruction::Other {
            result: Some(result.clone()),
            mnemonic: mnemonic.to_string(),
            ty,
        });
        result
    }

    pub fn jump(&mut self, target: BlockId) {
        self.seal(Terminator::Jump(target));
    }

    pub fn branch(&mut self, condition: Value, then_block: BlockId, else_block: BlockId) {
        self.seal(Terminator::Branch {
            condition,
            then_block,
            else_block,
        });
    }

    pub fn switch(&mut self, value: Value, default: BlockId, cases: Vec<(Constant, BlockId)>) {
        self.seal(Terminator::Switch {
            value,
            default,
            cases,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.seal(Terminator::Return(value));
    }

    pub fn unreachable(&mut self) {
        self.seal(Terminator::Unreachable);
    }

    fn seal(&mut self, terminator: Terminator) {
        self.body
            .get_block_mut(self.block_id)
            .expect("block exists")
            .set_terminator(terminator);
    }
}
