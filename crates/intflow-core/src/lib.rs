/*! IR data model and taint-guided integer range analysis.
 *
 * Integer misuse hides where externally-controlled values meet arithmetic:
 * allocation sizes, array indices, shift amounts. This crate models a
 * lowered SSA translation unit and runs two cooperating analyses over it —
 * taint propagation from syscall-shaped entry points to allocator-shaped
 * sinks, and a flow-sensitive interval analysis with branch narrowing —
 * then annotates the suspect instructions in place.
 */

pub mod analysis;
pub mod annotations;
pub mod block;
pub mod builder;
pub mod crange;
pub mod format;
pub mod function;
pub mod instructions;
pub mod ir_persist;
pub mod module;
pub mod types;
pub mod values;

pub use analysis::{AnalysisReport, AnalyzerConfig, Finding, IntMisusePass, RangeAnalysis};
pub use annotations::{AnnotationMap, IntErrorKind, Site};
pub use block::{BasicBlock, BlockId, Terminator};
pub use builder::{BlockBuilder, FunctionBuilder, ModuleBuilder};
pub use crange::Crange;
pub use function::{Function, FunctionBody, FunctionSignature, Parameter};
pub use instructions::{BinaryOp, CastKind, CmpPredicate, Instruction};
pub use module::{GlobalInit, GlobalVar, GlobalVarSpec, Module};
pub use types::Type;
pub use values::{Constant, GlobalId, ParamId, TempId, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("unterminated block: {0}")]
    UnterminatedBlock(String),
    #[error("function has no body: {0}")]
    EmptyFunction(String),
    #[error("unsupported integer width: {0}")]
    UnsupportedWidth(u16),
}

pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests;
