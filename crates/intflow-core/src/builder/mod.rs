/*! Fluent construction of IR modules.
 *
 * Upstream frontends and tests produce analyzable modules through these
 * builders; they handle temp numbering, block allocation, and terminator
 * placement so callers only state program logic.
 */

pub mod block_builder;
pub mod function_builder;

pub use block_builder::BlockBuilder;
pub use function_builder::FunctionBuilder;

use crate::function::FunctionSignature;
use crate::module::{GlobalVarSpec, Module};
use crate::types::Type;
use crate::values::{Constant, GlobalId};

pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
        }
    }

    pub fn global_scalar(
        &mut self,
        name: impl Into<String>,
        bits: u16,
        init: Option<Constant>,
    ) -> GlobalId {
        self.module
            .add_global(GlobalVarSpec::scalar(name, bits, init))
    }

    pub fn global_array(
        &mut self,
        name: impl Into<String>,
        elem_bits: u16,
        len: usize,
        init: Option<Vec<Constant>>,
    ) -> GlobalId {
        self.module
            .add_global(GlobalVarSpec::array(name, elem_bits, len, init))
    }

    /// Registers an external function the module calls but does not define.
    pub fn declare_function(&mut self, name: impl Into<String>, params: Vec<Type>, ret: Type) {
        let mut signature = FunctionSignature::new(name);
        signature.params = params
            .into_iter()
            .enumerate()
            .map(|(i, ty)| crate::function::Parameter::new(format!("arg{}", i), ty))
            .collect();
        signature.return_type = ret;
        self.module.declare_function(signature);
    }

    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        FunctionBuilder::new(&mut self.module, name.to_string())
    }

    pub fn build(self) -> Module {
        self.module
    }
}
