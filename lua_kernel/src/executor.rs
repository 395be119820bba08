//! Script executor: the per-call Lua state, compilation and invocation.

use std::cell::Cell;

use log::{debug, trace};
use mlua::{Function, HookTriggers, Lua, MultiValue, Value};

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};

/// Chunk name shown in Lua diagnostics (`code:LINE: message`).
const CHUNK_NAME: &str = "=code";

/// VM instructions between two step-limit checks.
const HOOK_INTERVAL: u32 = 1000;

/// A Lua state owned by exactly one compute call.
///
/// The state is closed when the inner `Lua` drops, whichever way the call
/// ends; the `Drop` impl here only traces it.
pub struct ScriptEnvironment {
    lua: Lua,
}

impl ScriptEnvironment {
    /// Open a fresh state with the standard libraries loaded.
    pub fn new(config: &KernelConfig) -> Self {
        let lua = Lua::new();
        if let Some(limit) = config.step_limit() {
            install_step_limit(&lua, limit);
        }
        trace!("opened Lua state");
        ScriptEnvironment { lua }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Compile and run the source, returning the compute function it yields.
    ///
    /// The chunk must return exactly one value, and that value must be a function.
    pub fn compile(&self, code: &str) -> KernelResult<Function<'_>> {
        let chunk = self
            .lua
            .load(code)
            .set_name(CHUNK_NAME)
            .into_function()
            .map_err(|e| KernelError::from_script(&e))?;

        let values = chunk
            .call::<_, MultiValue>(())
            .map_err(|e| KernelError::from_script(&e))?
            .into_vec();

        if values.len() != 1 {
            return Err(KernelError::structure(format!(
                "Lua code must return a single function, but {} values were returned",
                values.len()
            )));
        }
        match values.into_iter().next() {
            Some(Value::Function(function)) => Ok(function),
            Some(other) => Err(KernelError::structure(format!(
                "Lua code must return a function to be called with operator inputs, but a {} was found",
                other.type_name()
            ))),
            None => Err(KernelError::structure("Lua code returned no value")),
        }
    }
}

impl Drop for ScriptEnvironment {
    fn drop(&mut self) {
        trace!("closing Lua state");
    }
}

/// Call the compute function with one argument per slot and collect exactly
/// `slots` return values.
pub fn invoke<'lua>(
    function: &Function<'lua>,
    args: Vec<Value<'lua>>,
    slots: usize,
) -> KernelResult<Vec<Value<'lua>>> {
    let returned = function
        .call::<_, MultiValue>(MultiValue::from_vec(args))
        .map_err(|e| KernelError::from_script(&e))?
        .into_vec();

    if returned.len() != slots {
        return Err(KernelError::structure(format!(
            "compute function must return {slots} values (one per output slot), but {} were returned",
            returned.len()
        )));
    }
    Ok(returned)
}

fn install_step_limit(lua: &Lua, limit: u64) {
    debug!("limiting scripts to {limit} instructions");
    let used = Cell::new(0u64);
    let triggers = HookTriggers {
        every_nth_instruction: Some(HOOK_INTERVAL),
        ..Default::default()
    };
    lua.set_hook(triggers, move |_lua, _debug| {
        let steps = used.get() + u64::from(HOOK_INTERVAL);
        used.set(steps);
        if steps > limit {
            return Err(mlua::Error::RuntimeError(format!(
                "step limit of {limit} instructions exceeded"
            )));
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn env() -> ScriptEnvironment {
        ScriptEnvironment::new(&KernelConfig::new(""))
    }

    #[test]
    fn test_compile_returns_function() {
        let env = env();
        let f = env.compile("return function(a) return a end").unwrap();
        let out = invoke(&f, vec![Value::Integer(3)], 1).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Value::Integer(3)));
    }

    #[test]
    fn test_compile_rejects_two_values() {
        let env = env();
        let err = env
            .compile("return function() end, function() end")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptStructure);
        assert!(err.to_string().contains("2 values"));
    }

    #[test]
    fn test_compile_rejects_nothing_and_non_functions() {
        let env = env();
        assert_eq!(
            env.compile("local x = 1").unwrap_err().kind(),
            ErrorKind::ScriptStructure
        );
        let err = env.compile("return 42").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptStructure);
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_syntax_error_is_execution_error() {
        let env = env();
        let err = env.compile("return function(").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptExecution);
        assert!(err.to_string().starts_with("code:"));
    }

    #[test]
    fn test_top_level_raise_keeps_message() {
        let env = env();
        let err = env.compile("error('no tensors today')").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptExecution);
        assert!(err.to_string().contains("no tensors today"));
    }

    #[test]
    fn test_invoke_return_count() {
        let env = env();
        let f = env.compile("return function() return 1, 2 end").unwrap();
        assert_eq!(
            invoke(&f, vec![], 3).unwrap_err().kind(),
            ErrorKind::ScriptStructure
        );
        assert_eq!(invoke(&f, vec![], 2).unwrap().len(), 2);
    }

    #[test]
    fn test_invoke_runtime_error() {
        let env = env();
        let f = env
            .compile("return function() error('bad slot') end")
            .unwrap();
        let err = invoke(&f, vec![], 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptExecution);
        assert!(err.to_string().contains("bad slot"));
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let env = ScriptEnvironment::new(&KernelConfig::new("").with_step_limit(100_000));
        let f = env.compile("return function() while true do end end").unwrap();
        let err = invoke(&f, vec![], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptExecution);
        assert!(err.to_string().contains("step limit"));
    }
}
