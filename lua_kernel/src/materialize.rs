//! Result materializer: script return values to host outputs.
//!
//! [`read_outputs`] runs while the Lua scope is still alive. It first checks
//! every slot in order: a `nil` must meet a slot the host leaves empty, and
//! anything else must be a well-formed tensor table that meets a slot the
//! host expects. Only then are the accessors walked into owned buffers.
//! [`commit_outputs`] copies the evaluated data to the host afterwards, so a
//! script-side failure never leaves an output written.

use log::trace;
use lua_tensor::{Shape, Tensor, TensorData};
use mlua::{Function, Table, Value, Variadic};

use crate::context::KernelContext;
use crate::error::{bridge_error, diagnostic, KernelError, KernelResult};

/// A returned value that passed the structural tensor-table check.
pub struct ReturnedTensor<'lua> {
    pub shape: Shape,
    pub get: Function<'lua>,
}

impl<'lua> ReturnedTensor<'lua> {
    /// Validate one returned slot value. `nil` means the slot is absent.
    pub fn from_value(slot: usize, value: Value<'lua>) -> KernelResult<Option<Self>> {
        let table = match value {
            Value::Nil => return Ok(None),
            Value::Table(table) => table,
            other => {
                return Err(KernelError::Type {
                    slot,
                    detail: format!(
                        "the returned value must be a (tensor) table, found {}",
                        other.type_name()
                    ),
                })
            }
        };

        let shape = read_shape(slot, &table)?;
        let get = match table.get::<_, Value>("get") {
            Ok(Value::Function(get)) => get,
            Ok(other) => {
                return Err(KernelError::Type {
                    slot,
                    detail: format!(
                        "the returned tensor-table does not have a function 'get' field (found {})",
                        other.type_name()
                    ),
                })
            }
            Err(e) => {
                return Err(KernelError::Type {
                    slot,
                    detail: diagnostic(&e),
                })
            }
        };

        Ok(Some(ReturnedTensor { shape, get }))
    }

    /// Call the accessor once per element, in row-major order.
    pub fn evaluate(&self, slot: usize) -> KernelResult<Tensor> {
        let numel = self.shape.numel();
        let mut data = Vec::new();
        data.try_reserve_exact(numel)
            .map_err(|e| KernelError::Evaluation {
                slot,
                detail: format!("cannot hold {numel} elements for shape {}: {e}", self.shape),
            })?;
        for index in self.shape.indices() {
            let args: Variadic<i64> = index.iter().map(|&i| i as i64).collect();
            let value = self
                .get
                .call::<_, Value>(args)
                .map_err(|e| evaluation_error(slot, &e))?;
            data.push(element(slot, &index, value)?);
        }
        Tensor::from_vec(data, self.shape.clone()).map_err(|e| KernelError::Evaluation {
            slot,
            detail: e.to_string(),
        })
    }
}

/// Extract a shape from `table.shape`, requiring keys `1..=rank` exactly once.
fn read_shape(slot: usize, table: &Table) -> KernelResult<Shape> {
    let malformed = |detail: String| KernelError::MalformedShape { slot, detail };

    let shape = match table.get::<_, Value>("shape") {
        Ok(Value::Table(shape)) => shape,
        Ok(Value::Nil) => {
            return Err(malformed(
                "the returned tensor-table does not have an (array) table 'shape' field".to_string(),
            ))
        }
        Ok(other) => {
            return Err(malformed(format!(
                "'shape' must be an array table, found {}",
                other.type_name()
            )))
        }
        Err(e) => return Err(malformed(diagnostic(&e))),
    };

    let mut entries = Vec::new();
    for pair in shape.pairs::<Value, Value>() {
        let (key, dim) = pair.map_err(|e| malformed(diagnostic(&e)))?;
        entries.push((key, dim));
    }

    // Table keys are unique, so `len` distinct keys in 1..=len leave no gaps.
    let rank = entries.len();
    let mut dims = vec![0usize; rank];
    for (key, dim) in entries {
        let position = match key {
            Value::Integer(k) if k >= 1 && k as u64 <= rank as u64 => k as usize - 1,
            _ => {
                return Err(malformed(format!(
                    "the returned shape is not an array table (unexpected key {})",
                    describe(&key)
                )))
            }
        };
        dims[position] = match dim {
            Value::Integer(d) if d >= 0 => d as usize,
            Value::Number(d) if d >= 0.0 && d.fract() == 0.0 && d < usize::MAX as f64 => d as usize,
            other => {
                return Err(malformed(format!(
                    "dimension {} must be a non-negative integer, found {}",
                    position + 1,
                    describe(&other)
                )))
            }
        };
    }

    let shape = Shape::new(dims);
    if shape.checked_numel().is_none() {
        return Err(malformed(format!(
            "shape {shape} has more elements than can be addressed"
        )));
    }
    Ok(shape)
}

fn element(slot: usize, index: &[usize], value: Value) -> KernelResult<f64> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Integer(i) => Ok(i as f64),
        other => Err(KernelError::Evaluation {
            slot,
            detail: format!(
                "get{:?} returned {}, expected a number",
                index,
                other.type_name()
            ),
        }),
    }
}

fn evaluation_error(slot: usize, err: &mlua::Error) -> KernelError {
    let detail = match bridge_error(err) {
        Some(inner) => inner.to_string(),
        None => diagnostic(err),
    };
    KernelError::Evaluation { slot, detail }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s.to_string_lossy()),
        other => other.type_name().to_string(),
    }
}

fn absent_mismatch(slot: usize) -> KernelError {
    KernelError::SlotMismatch {
        slot,
        detail: "was nil, but it has a slot and would be missing".to_string(),
    }
}

fn present_mismatch(slot: usize) -> KernelError {
    KernelError::SlotMismatch {
        slot,
        detail: "was not nil, but it has no slot and would be implicitly ignored".to_string(),
    }
}

/// Check every returned slot against the host, then evaluate the present ones.
///
/// Slots are checked in order, each one fully (presence, structure, shape)
/// before the next. No accessor runs until every slot has passed.
pub fn read_outputs<'lua, C, const N: usize>(
    ctx: &C,
    returned: Vec<Value<'lua>>,
) -> KernelResult<[Option<Tensor>; N]>
where
    C: KernelContext + ?Sized,
{
    let mut checked: [Option<ReturnedTensor<'lua>>; N] = std::array::from_fn(|_| None);
    for (slot, value) in returned.into_iter().enumerate().take(N) {
        let tensor = ReturnedTensor::from_value(slot, value)?;
        match (&tensor, ctx.has_output(slot)) {
            (None, true) => return Err(absent_mismatch(slot)),
            (Some(_), false) => return Err(present_mismatch(slot)),
            _ => {}
        }
        checked[slot] = tensor;
    }

    let mut outputs: [Option<Tensor>; N] = std::array::from_fn(|_| None);
    for (slot, tensor) in checked.iter().enumerate() {
        if let Some(tensor) = tensor {
            trace!("output {slot}: evaluating shape {}", tensor.shape);
            outputs[slot] = Some(tensor.evaluate(slot)?);
        }
    }
    Ok(outputs)
}

/// Copy evaluated outputs into host buffers.
pub fn commit_outputs<C, const N: usize>(
    ctx: &mut C,
    outputs: [Option<Tensor>; N],
) -> KernelResult<()>
where
    C: KernelContext + ?Sized,
{
    for (slot, output) in outputs.into_iter().enumerate() {
        let Some(tensor) = output else { continue };
        // Presence was settled in `read_outputs`; a refusal here is the host
        // failing to provide the buffer.
        let buffer = ctx
            .output(slot, tensor.shape())
            .ok_or_else(|| KernelError::SlotMismatch {
                slot,
                detail: format!("the host provided no buffer for shape {}", tensor.shape()),
            })?;
        if buffer.len() != tensor.numel() {
            return Err(KernelError::SlotMismatch {
                slot,
                detail: format!(
                    "host buffer holds {} elements, shape {} needs {}",
                    buffer.len(),
                    tensor.shape(),
                    tensor.numel()
                ),
            });
        }
        buffer.copy_from_slice(tensor.as_slice());
    }
    Ok(())
}
