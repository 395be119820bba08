//! KernelContext trait - the host side of a compute call.

use lua_tensor::{Shape, Tensor, TensorView};

/// What a kernel sees of the host during one call.
///
/// Slots are addressed `0..N`; any slot may be absent on either side.
pub trait KernelContext {
    /// The input tensor at `slot`, or `None` if the host supplied none.
    fn input(&self, slot: usize) -> Option<TensorView<'_>>;

    /// Whether the host expects an output at `slot`. Allocates nothing.
    fn has_output(&self, slot: usize) -> bool;

    /// Allocate the output at `slot` with `shape` and return its buffer.
    ///
    /// Returns `None` when the host has no output at `slot` or cannot
    /// provide a buffer of that size.
    fn output(&mut self, slot: usize, shape: &Shape) -> Option<&mut [f64]>;
}

#[derive(Clone, Debug, Default, PartialEq)]
enum OutputSlot {
    #[default]
    Undeclared,
    Declared,
    Allocated(Tensor),
}

/// An in-memory host: owned inputs and a set of declared outputs.
///
/// Declared outputs are allocated zero-filled on request; requests for
/// undeclared slots, or for buffers too large to allocate, are refused.
#[derive(Clone, Debug, Default)]
pub struct HostContext {
    inputs: Vec<Option<Tensor>>,
    outputs: Vec<OutputSlot>,
}

impl HostContext {
    /// Create a host with `slots` empty input and output positions.
    pub fn new(slots: usize) -> Self {
        HostContext {
            inputs: vec![None; slots],
            outputs: vec![OutputSlot::Undeclared; slots],
        }
    }

    /// Builder-style input setter.
    pub fn with_input(mut self, slot: usize, tensor: Tensor) -> Self {
        self.set_input(slot, tensor);
        self
    }

    /// Builder-style output declaration.
    pub fn with_output(mut self, slot: usize) -> Self {
        self.declare_output(slot);
        self
    }

    pub fn set_input(&mut self, slot: usize, tensor: Tensor) {
        self.inputs[slot] = Some(tensor);
    }

    pub fn declare_output(&mut self, slot: usize) {
        self.outputs[slot] = OutputSlot::Declared;
    }

    pub fn slots(&self) -> usize {
        self.inputs.len()
    }

    /// The output written at `slot`, if it was ever allocated.
    pub fn output_tensor(&self, slot: usize) -> Option<&Tensor> {
        match self.outputs.get(slot)? {
            OutputSlot::Allocated(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Number of outputs that have been allocated.
    pub fn allocated_outputs(&self) -> usize {
        self.outputs
            .iter()
            .filter(|slot| matches!(slot, OutputSlot::Allocated(_)))
            .count()
    }

    /// Take every output, leaving declared slots ready for the next call.
    pub fn take_outputs(&mut self) -> Vec<Option<Tensor>> {
        self.outputs
            .iter_mut()
            .map(|slot| match std::mem::take(slot) {
                OutputSlot::Allocated(tensor) => {
                    *slot = OutputSlot::Declared;
                    Some(tensor)
                }
                other => {
                    *slot = other;
                    None
                }
            })
            .collect()
    }
}

impl KernelContext for HostContext {
    fn input(&self, slot: usize) -> Option<TensorView<'_>> {
        self.inputs.get(slot)?.as_ref().map(Tensor::view)
    }

    fn has_output(&self, slot: usize) -> bool {
        !matches!(self.outputs.get(slot), None | Some(OutputSlot::Undeclared))
    }

    fn output(&mut self, slot: usize, shape: &Shape) -> Option<&mut [f64]> {
        let entry = self.outputs.get_mut(slot)?;
        if *entry == OutputSlot::Undeclared {
            return None;
        }
        *entry = OutputSlot::Allocated(Tensor::try_zeros(shape.clone())?);
        match entry {
            OutputSlot::Allocated(tensor) => Some(tensor.as_slice_mut()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lua_tensor::TensorData;

    #[test]
    fn test_inputs() {
        let t = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2])).unwrap();
        let host = HostContext::new(3).with_input(1, t);
        assert!(host.input(0).is_none());
        assert_eq!(host.input(1).unwrap().as_slice(), &[1.0, 2.0]);
        assert!(host.input(7).is_none());
    }

    #[test]
    fn test_output_allocation() {
        let mut host = HostContext::new(2).with_output(0);
        assert!(host.output(1, &Shape::scalar()).is_none());

        let buffer = host.output(0, &Shape::new(vec![2, 2])).unwrap();
        assert_eq!(buffer.len(), 4);
        buffer[3] = 9.0;

        let out = host.output_tensor(0).unwrap();
        assert_eq!(out.shape(), &Shape::new(vec![2, 2]));
        assert_eq!(out.as_slice(), &[0.0, 0.0, 0.0, 9.0]);
        assert_eq!(host.allocated_outputs(), 1);
    }

    #[test]
    fn test_take_outputs_keeps_declarations() {
        let mut host = HostContext::new(2).with_output(1);
        host.output(1, &Shape::scalar()).unwrap()[0] = 4.0;

        let outputs = host.take_outputs();
        assert!(outputs[0].is_none());
        assert_eq!(outputs[1].as_ref().unwrap().as_slice(), &[4.0]);
        assert_eq!(host.allocated_outputs(), 0);
        assert!(host.output(1, &Shape::scalar()).is_some());
    }

    #[test]
    fn test_has_output_does_not_allocate() {
        let mut host = HostContext::new(2).with_output(0);
        assert!(host.has_output(0));
        assert!(!host.has_output(1));
        assert!(!host.has_output(9));
        assert_eq!(host.allocated_outputs(), 0);

        assert!(host.output(0, &Shape::new(vec![1 << 62])).is_none());
        assert!(host.has_output(0));
        assert_eq!(host.allocated_outputs(), 0);
    }
}
