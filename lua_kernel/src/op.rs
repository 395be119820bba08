//! Operator schema - how the Lua operator describes itself to a host.

use std::fmt;

use log::debug;

use crate::config::KernelInfo;
use crate::error::{KernelError, KernelResult};
use crate::kernel::LuaKernel;

/// Number of input and output slots the operator declares.
pub const OP_IO_SLOTS: usize = 16;

/// Operator name as it appears in a model graph.
pub const OP_NAME: &str = "Lua";

/// Domain the operator is registered under.
pub const OP_DOMAIN: &str = "lang.lua";

/// Element type of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Double,
}

/// Whether a host must connect a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCharacteristic {
    Required,
    Optional,
}

/// Static description of a custom operator.
pub trait OpSchema: Send + Sync {
    fn name(&self) -> &str;

    fn input_count(&self) -> usize;
    fn input_type(&self, slot: usize) -> ElementType;

    fn output_count(&self) -> usize;
    fn output_type(&self, slot: usize) -> ElementType;

    fn input_characteristic(&self, _slot: usize) -> SlotCharacteristic {
        SlotCharacteristic::Required
    }

    fn output_characteristic(&self, _slot: usize) -> SlotCharacteristic {
        SlotCharacteristic::Required
    }
}

/// The `Lua` operator: `N` optional `f64` inputs and outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaOp<const N: usize = OP_IO_SLOTS>;

impl<const N: usize> LuaOp<N> {
    pub fn new() -> Self {
        LuaOp
    }

    /// Build a kernel for one node from its attributes.
    pub fn create_kernel(&self, info: &KernelInfo) -> KernelResult<LuaKernel<N>> {
        LuaKernel::from_info(info)
    }
}

impl<const N: usize> OpSchema for LuaOp<N> {
    fn name(&self) -> &str {
        OP_NAME
    }

    fn input_count(&self) -> usize {
        N
    }

    fn input_type(&self, _slot: usize) -> ElementType {
        ElementType::Double
    }

    fn output_count(&self) -> usize {
        N
    }

    fn output_type(&self, _slot: usize) -> ElementType {
        ElementType::Double
    }

    fn input_characteristic(&self, _slot: usize) -> SlotCharacteristic {
        SlotCharacteristic::Optional
    }

    fn output_characteristic(&self, _slot: usize) -> SlotCharacteristic {
        SlotCharacteristic::Optional
    }
}

/// A named collection of operators, handed to the host as one unit.
pub struct OpDomain {
    name: String,
    ops: Vec<Box<dyn OpSchema>>,
}

impl OpDomain {
    pub fn new(name: impl Into<String>) -> Self {
        OpDomain {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    /// The `lang.lua` domain with the default `Lua` operator registered.
    pub fn lua() -> Self {
        let mut domain = OpDomain::new(OP_DOMAIN);
        domain.ops.push(Box::new(LuaOp::<OP_IO_SLOTS>::new()));
        domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an operator; names are unique within a domain.
    pub fn add(&mut self, op: Box<dyn OpSchema>) -> KernelResult<()> {
        if self.get(op.name()).is_some() {
            return Err(KernelError::Registration {
                detail: format!(
                    "operator '{}' is already registered in domain '{}'",
                    op.name(),
                    self.name
                ),
            });
        }
        debug!("registering {}::{}", self.name, op.name());
        self.ops.push(op);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn OpSchema> {
        self.ops
            .iter()
            .find(|op| op.name() == name)
            .map(|op| op.as_ref())
    }

    pub fn ops(&self) -> impl Iterator<Item = &dyn OpSchema> {
        self.ops.iter().map(|op| op.as_ref())
    }
}

impl fmt::Debug for OpDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpDomain")
            .field("name", &self.name)
            .field("ops", &self.ops().map(|op| op.name()).collect::<Vec<_>>())
            .finish()
    }
}
