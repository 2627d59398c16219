use super::BlockBuilder;
use crate::block::BlockId;
use crate::function::{Function, FunctionSignature, Parameter};
use crate::module::Module;
use crate::types::Type;
use crate::values::{ParamId, Value};

pub struct FunctionBuilder<'a> {
    module: &'a mut Module,
    function: Function,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(module: &'a mut Module, name: String) -> Self {
        let function = Function::new(FunctionSignature::new(name));
        Self { module, function }
    }

    pub fn param(&mut self, name: &str, ty: Type) -> &mut Self {
        self.function.signature.params.push(Parameter::new(name, ty));
        self
    }

    pub fn returns(&mut self, ty: Type) -> &mut Self {
        self.function.signature.return_type = ty;
        self
    }

    pub fn get_param(&self, index: usize) -> Value {
        Value::Param(ParamId(index as u32))
    }

    /// Reserves a block to be filled in later via `block_with_id`, so
    /// forward branches can name their targets.
    pub fn create_block_id(&mut self) -> BlockId {
        self.function.body.create_block()
    }

    pub fn entry_block(&mut self) -> BlockBuilder<'_> {
        let entry = self.function.body.entry_block;
        BlockBuilder::new(&mut self.function.body, entry)
    }

    pub fn block(&mut self) -> BlockBuilder<'_> {
        let id = self.function.body.create_block();
        BlockBuilder::new(&mut self.function.body, id)
    }

    pub fn block_with_id(&mut self, id: BlockId) -> BlockBuilder<'_> {
        BlockBuilder::new(&mut self.function.body, id)
    }

    pub fn build(self) {
        self.module.add_function(self.function);
    }
}
