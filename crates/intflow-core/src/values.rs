use crate::types::Type;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Constant(Constant),
    /// Formal parameter of the enclosing function.
    Param(ParamId),
    /// Result of an instruction.
    Temp(TempId),
    /// Address of a module-level scalar or array.
    Global(GlobalId),
}

impl Value {
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<GlobalId> {
        match self {
            Value::Global(g) => Some(*g),
            _ => None,
        }
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self {
            Value::Temp(t) => Some(*t),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "{}", c),
            Value::Param(id) => write!(f, "{}", id),
            Value::Temp(id) => write!(f, "{}", id),
            Value::Global(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TempId(pub u32);

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Uint(BigUint, u16),
    Int(BigInt, u16),
}

impl Constant {
    pub fn uint(value: u64, bits: u16) -> Self {
        Constant::Uint(BigUint::from(value), bits)
    }

    pub fn int(value: i64, bits: u16) -> Self {
        Constant::Int(BigInt::from(value), bits)
    }

    pub fn width(&self) -> u16 {
        match self {
            Constant::Bool(_) => 1,
            Constant::Uint(_, bits) | Constant::Int(_, bits) => *bits,
        }
    }

    pub fn ty(&self) -> Type {
        Type::Int(self.width())
    }

    /// Two's-complement encoding of the constant at its own width.
    /// `None` when the width exceeds what the analyses support.
    pub fn to_bits(&self) -> Option<u128> {
        let bits = self.width();
        if bits == 0 || bits > crate::types::MAX_INT_WIDTH {
            return None;
        }
        match self {
            Constant::Bool(b) => Some(u128::from(*b)),
            Constant::Uint(val, _) => {
                let modulus = BigUint::one() << usize::from(bits);
                (val % modulus).to_u128()
            }
            Constant::Int(val, _) => {
                let modulus = BigInt::one() << usize::from(bits);
                let mut wrapped = val % &modulus;
                if wrapped < BigInt::zero() {
                    wrapped += &modulus;
                }
                wrapped.to_biguint().and_then(|v| v.to_u128())
            }
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Uint(val, bits) => write!(f, "{}u{}", val, bits),
            Constant::Int(val, bits) => write!(f, "{}i{}", val, bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_to_bits() {
        assert_eq!(Constant::uint(42, 32).to_bits(), Some(42));
        assert_eq!(Constant::Bool(true).to_bits(), Some(1));
        // -1 wraps to all-ones at the constant's width.
        assert_eq!(Constant::int(-1, 8).to_bits(), Some(0xff));
        assert_eq!(Constant::int(-16, 8).to_bits(), Some(0xf0));
    }

    #[test]
    fn test_constant_width_masking() {
        // An over-wide literal is reduced modulo 2^width.
        assert_eq!(Constant::uint(0x1ff, 8).to_bits(), Some(0xff));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Temp(TempId(3)).to_string(), "t3");
        assert_eq!(Value::Param(ParamId(0)).to_string(), "p0");
        assert_eq!(Value::Global(GlobalId(1)).to_string(), "g1");
        assert_eq!(
            Value::Constant(Constant::uint(7, 32)).to_string(),
            "7u32"
        );
    }
}
