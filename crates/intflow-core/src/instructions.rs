use crate::block::BlockId;
use crate::types::Type;
use crate::values::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Binary {
        result: Value,
        op: BinaryOp,
        left: Value,
        right: Value,
        ty: Type,
    },
    Cmp {
        result: Value,
        pred: CmpPredicate,
        left: Value,
        right: Value,
    },
    Cast {
        result: Value,
        kind: CastKind,
        value: Value,
        to: Type,
    },
    Select {
        result: Value,
        condition: Value,
        then_val: Value,
        else_val: Value,
        ty: Type,
    },
    Phi {
        result: Value,
        incomings: Vec<(BlockId, Value)>,
        ty: Type,
    },
    Load {
        result: Value,
        address: Value,
        ty: Type,
    },
    Store {
        address: Value,
        value: Value,
    },
    /// Address computation into a global array. Two indices address a
    /// one-dimensional array the way a front end lowers `arr[i]`.
    Gep {
        result: Value,
        base: Value,
        indices: Vec<Value>,
    },
    Call {
        result: Value,
        callee: String,
        args: Vec<Value>,
    },
    /// Anything the analyses have no transfer function for. The result
    /// keeps its declared type but its range stays at bottom.
    Other {
        result: Option<Value>,
        mnemonic: String,
        ty: Type,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }

    pub fn is_division(&self) -> bool {
        matches!(
            self,
            BinaryOp::UDiv | BinaryOp::SDiv | BinaryOp::URem | BinaryOp::SRem
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPredicate {
    /// Predicate with the operands exchanged: `a < b` iff `b > a`.
    pub fn swapped(&self) -> CmpPredicate {
        match self {
            CmpPredicate::Eq => CmpPredicate::Eq,
            CmpPredicate::Ne => CmpPredicate::Ne,
            CmpPredicate::Ult => CmpPredicate::Ugt,
            CmpPredicate::Ule => CmpPredicate::Uge,
            CmpPredicate::Ugt => CmpPredicate::Ult,
            CmpPredicate::Uge => CmpPredicate::Ule,
            CmpPredicate::Slt => CmpPredicate::Sgt,
            CmpPredicate::Sle => CmpPredicate::Sge,
            CmpPredicate::Sgt => CmpPredicate::Slt,
            CmpPredicate::Sge => CmpPredicate::Sle,
        }
    }

    /// Logical negation: `!(a < b)` iff `a >= b`.
    pub fn inverse(&self) -> CmpPredicate {
        match self {
            CmpPredicate::Eq => CmpPredicate::Ne,
            CmpPredicate::Ne => CmpPredicate::Eq,
            CmpPredicate::Ult => CmpPredicate::Uge,
            CmpPredicate::Ule => CmpPredicate::Ugt,
            CmpPredicate::Ugt => CmpPredicate::Ule,
            CmpPredicate::Uge => CmpPredicate::Ult,
            CmpPredicate::Slt => CmpPredicate::Sge,
            CmpPredicate::Sle => CmpPredicate::Sgt,
            CmpPredicate::Sgt => CmpPredicate::Sle,
            CmpPredicate::Sge => CmpPredicate::Slt,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            CmpPredicate::Eq => "eq",
            CmpPredicate::Ne => "ne",
            CmpPredicate::Ult => "ult",
            CmpPredicate::Ule => "ule",
            CmpPredicate::Ugt => "ugt",
            CmpPredicate::Uge => "uge",
            CmpPredicate::Slt => "slt",
            CmpPredicate::Sle => "sle",
            CmpPredicate::Sgt => "sgt",
            CmpPredicate::Sge => "sge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    Trunc,
    ZExt,
    SExt,
}

impl Instruction {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Instruction::Binary { result, .. }
            | Instruction::Cmp { result, .. }
            | Instruction::Cast { result, .. }
            | Instruction::Select { result, .. }
            | Instruction::Phi { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::Gep { result, .. }
            | Instruction::Call { result, .. } => Some(result),
            Instruction::Other { result, .. } => result.as_ref(),
            Instruction::Store { .. } => None,
        }
    }

    /// Every value the instruction reads, in operand order.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Binary { left, right, .. } | Instruction::Cmp { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Select {
                condition,
                then_val,
                else_val,
                ..
            } => vec![condition, then_val, else_val],
            Instruction::Phi { incomings, .. } => incomings.iter().map(|(_, v)| v).collect(),
            Instruction::Load { address, .. } => vec![address],
            Instruction::Store { address, value } => vec![address, value],
            Instruction::Gep { base, indices, .. } => {
                let mut ops = vec![base];
                ops.extend(indices.iter());
                ops
            }
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Other { .. } => Vec::new(),
        }
    }

    /// Mutable references to every value the instruction reads.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Instruction::Binary { left, right, .. } | Instruction::Cmp { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Select {
                condition,
                then_val,
                else_val,
                ..
            } => vec![condition, then_val, else_val],
            Instruction::Phi { incomings, .. } => {
                incomings.iter_mut().map(|(_, v)| v).collect()
            }
            Instruction::Load { address, .. } => vec![address],
            Instruction::Store { address, value } => vec![address, value],
            Instruction::Gep { base, indices, .. } => {
                let mut ops = vec![base];
                ops.extend(indices.iter_mut());
                ops
            }
            Instruction::Call { args, .. } => args.iter_mut().collect(),
            Instruction::Other { .. } => Vec::new(),
        }
    }

    /// Declared result type, where the instruction states one.
    pub fn result_type(&self) -> Option<Type> {
        match self {
            Instruction::Binary { ty, .. }
            | Instruction::Select { ty, .. }
            | Instruction::Phi { ty, .. }
            | Instruction::Load { ty, .. } => Some(ty.clone()),
            Instruction::Cmp { .. } => Some(Type::bool()),
            Instruction::Cast { to, .. } => Some(to.clone()),
            Instruction::Other {
                result: Some(_),
                ty,
                ..
            } => Some(ty.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{Constant, TempId};

    #[test]
    fn test_predicate_swap_and_inverse() {
        assert_eq!(CmpPredicate::Ult.swapped(), CmpPredicate::Ugt);
        assert_eq!(CmpPredicate::Sge.swapped(), CmpPredicate::Sle);
        assert_eq!(CmpPredicate::Eq.swapped(), CmpPredicate::Eq);
        assert_eq!(CmpPredicate::Ult.inverse(), CmpPredicate::Uge);
        assert_eq!(CmpPredicate::Eq.inverse(), CmpPredicate::Ne);
        for pred in [
            CmpPredicate::Eq,
            CmpPredicate::Ne,
            CmpPredicate::Ult,
            CmpPredicate::Ule,
            CmpPredicate::Ugt,
            CmpPredicate::Uge,
            CmpPredicate::Slt,
            CmpPredicate::Sle,
            CmpPredicate::Sgt,
            CmpPredicate::Sge,
        ] {
            assert_eq!(pred.inverse().inverse(), pred);
            assert_eq!(pred.swapped().swapped(), pred);
        }
    }

    #[test]
    fn test_instruction_views() {
        let inst = Instruction::Binary {
            result: Value::Temp(TempId(0)),
            op: BinaryOp::Mul,
            left: Value::Temp(TempId(1)),
            right: Value::Constant(Constant::uint(4, 32)),
            ty: Type::Int(32),
        };
        assert_eq!(inst.result(), Some(&Value::Temp(TempId(0))));
        assert_eq!(inst.operands().len(), 2);
        assert_eq!(inst.result_type(), Some(Type::Int(32)));

        let store = Instruction::Store {
            address: Value::Global(crate::values::GlobalId(0)),
            value: Value::Temp(TempId(1)),
        };
        assert!(store.result().is_none());
        assert_eq!(store.operands().len(), 2);
    }
}
