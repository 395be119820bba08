//! Slot marshaller: host inputs to script-visible tensor tables.
//!
//! Each present input becomes
//!
//! ```lua
//! { shape = {d0, d1, ...}, get = function(i0, i1, ...) return element end }
//! ```
//!
//! and each absent input becomes `nil`. The `get` closures are created in a
//! Lua scope and borrow an owned copy of the host data, so they stop working
//! once the call that created them returns.

use log::trace;
use lua_tensor::{Tensor, TensorData};
use mlua::{Lua, Scope, Table, Value, Variadic};

use crate::context::KernelContext;
use crate::error::{KernelError, KernelResult};

/// Copy every host input into owned storage, keeping absent slots absent.
pub fn copy_inputs<C, const N: usize>(ctx: &C) -> [Option<Tensor>; N]
where
    C: KernelContext + ?Sized,
{
    std::array::from_fn(|slot| {
        let tensor = ctx.input(slot).map(|view| view.to_tensor());
        if let Some(t) = &tensor {
            trace!("input {slot}: shape {}", t.shape());
        }
        tensor
    })
}

/// Build the positional argument list for the compute function.
pub fn marshal_inputs<'lua, 'scope, const N: usize>(
    lua: &'lua Lua,
    scope: &Scope<'lua, 'scope>,
    inputs: &'scope [Option<Tensor>; N],
) -> KernelResult<Vec<Value<'lua>>>
where
    'lua: 'scope,
{
    inputs
        .iter()
        .map(|slot| match slot {
            Some(tensor) => tensor_table(lua, scope, tensor)
                .map(Value::Table)
                .map_err(|e| KernelError::from_script(&e)),
            None => Ok(Value::Nil),
        })
        .collect()
}

/// Create the `{shape, get}` table for one tensor.
fn tensor_table<'lua, 'scope>(
    lua: &'lua Lua,
    scope: &Scope<'lua, 'scope>,
    tensor: &'scope Tensor,
) -> mlua::Result<Table<'lua>>
where
    'lua: 'scope,
{
    let table = lua.create_table_with_capacity(0, 2)?;

    // Store the shape as an array table: {1: shape[0], 2: shape[1], ...}
    let shape = lua.create_sequence_from(tensor.shape().dims().iter().map(|&d| d as i64))?;
    table.set("shape", shape)?;

    let view = tensor.view();
    let get = scope.create_function(move |_, args: Variadic<Value>| {
        let rank = view.shape().ndim();
        if args.len() != rank {
            return Err(KernelError::Arity {
                rank,
                got: args.len(),
            }
            .into_lua_error());
        }
        let index = integer_indices(&args)?;
        view.get(&index)
            .map_err(|e| KernelError::from(e).into_lua_error())
    })?;
    table.set("get", get)?;

    Ok(table)
}

/// Read accessor arguments as integers, the way `luaL_checkinteger` would.
fn integer_indices(args: &[Value]) -> mlua::Result<Vec<i64>> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| match arg {
            Value::Integer(i) => Ok(*i),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Ok(*n as i64),
            other => Err(mlua::Error::RuntimeError(format!(
                "bad argument #{} to 'get' (integer expected, got {})",
                position + 1,
                other.type_name()
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostContext;
    use crate::error::ErrorKind;
    use lua_tensor::Shape;
    use mlua::Function;

    fn matrix() -> Tensor {
        Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2])).unwrap()
    }

    #[test]
    fn test_copy_inputs_keeps_absent_slots() {
        let host = HostContext::new(3).with_input(1, matrix());
        let inputs: [Option<Tensor>; 3] = copy_inputs(&host);
        assert!(inputs[0].is_none());
        assert_eq!(inputs[1], Some(matrix()));
        assert!(inputs[2].is_none());
    }

    #[test]
    fn test_tensor_table_shape_and_get() {
        let lua = Lua::new();
        let inputs = [Some(matrix()), None];
        let probe: Function = lua
            .load(
                r#"
                return function(x, y)
                    assert(y == nil)
                    return #x.shape, x.shape[1], x.shape[2], x.get(1, 0), x.get(0, 1.0)
                end
                "#,
            )
            .eval()
            .unwrap();

        let (rank, d0, d1, a, b) = lua
            .scope(|scope| {
                let args = marshal_inputs(&lua, scope, &inputs).unwrap();
                probe.call::<_, (i64, i64, i64, f64, f64)>(mlua::MultiValue::from_vec(args))
            })
            .unwrap();
        assert_eq!((rank, d0, d1), (2, 2, 2));
        assert_eq!(a, 3.0);
        assert_eq!(b, 2.0);
    }

    #[test]
    fn test_get_errors_carry_kinds() {
        let lua = Lua::new();
        let inputs = [Some(matrix())];
        let call: Function = lua
            .load("return function(x, ...) return x.get(...) end")
            .eval()
            .unwrap();

        let outcome = |index: &[f64]| {
            lua.scope(|scope| {
                let mut args = marshal_inputs(&lua, scope, &inputs).unwrap();
                args.extend(index.iter().map(|&i| Value::Number(i)));
                Ok(call
                    .call::<_, f64>(mlua::MultiValue::from_vec(args))
                    .map_err(|e| KernelError::from_script(&e)))
            })
            .unwrap()
        };

        assert_eq!(outcome(&[1.0, 1.0]), Ok(4.0));

        let arity = outcome(&[0.0]).unwrap_err();
        assert_eq!(arity.kind(), ErrorKind::Arity);

        let bounds = outcome(&[5.0, 5.0]).unwrap_err();
        assert_eq!(bounds.kind(), ErrorKind::Bounds);

        let negative = outcome(&[0.0, -1.0]).unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Bounds);

        let too_many = outcome(&[0.0, 0.0, 0.5]).unwrap_err();
        assert_eq!(too_many.kind(), ErrorKind::Arity);

        let fractional = outcome(&[0.5, 0.0]).unwrap_err();
        assert_eq!(fractional.kind(), ErrorKind::ScriptExecution);
        assert!(fractional.to_string().contains("integer expected"));
    }

    #[test]
    fn test_accessor_dies_with_scope() {
        let lua = Lua::new();
        let inputs = [Some(matrix())];
        let keep: Function = lua
            .load("return function(x) kept = x end")
            .eval()
            .unwrap();

        lua.scope(|scope| {
            let args = marshal_inputs(&lua, scope, &inputs).unwrap();
            keep.call::<_, ()>(mlua::MultiValue::from_vec(args))
        })
        .unwrap();

        let late: mlua::Result<f64> = lua.load("return kept.get(0, 0)").eval();
        assert!(late.is_err());
    }
}
