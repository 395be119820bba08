//! Kernel invocation wrapper - one compute call from start to finish.

use std::fmt;

use log::{debug, trace};
use lua_tensor::Tensor;
use mlua::{Function, Lua, Scope};

use crate::config::{KernelConfig, KernelInfo};
use crate::context::KernelContext;
use crate::error::{KernelError, KernelResult};
use crate::executor::{invoke, ScriptEnvironment};
use crate::marshal::{copy_inputs, marshal_inputs};
use crate::materialize::{commit_outputs, read_outputs};
use crate::op::OP_IO_SLOTS;

/// Where a compute call currently is.
///
/// Phases only move forward; `Done` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Compiling,
    Marshalling,
    Executing,
    Materializing,
    Done,
    Errored,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Compiling => "compiling",
            Phase::Marshalling => "marshalling",
            Phase::Executing => "executing",
            Phase::Materializing => "materializing",
            Phase::Done => "done",
            Phase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Phase tracker for a single call.
#[derive(Debug)]
struct Invocation {
    phase: Phase,
}

impl Invocation {
    fn start() -> Self {
        Invocation { phase: Phase::Idle }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "{} -> {} re-enters a phase", self.phase, next);
        trace!("lua kernel: {} -> {}", self.phase, next);
        self.phase = next;
    }

    fn finish(&mut self, result: &KernelResult<()>) {
        match result {
            Ok(()) => {
                self.advance(Phase::Done);
                debug!("lua kernel: call finished");
            }
            Err(err) => {
                let failed_in = self.phase;
                self.advance(Phase::Errored);
                debug!("lua kernel: call failed while {failed_in}: {err}");
            }
        }
    }
}

/// A kernel instance for one `Lua` node with `N` input and output slots.
///
/// The kernel only holds its configuration. Every call to
/// [`LuaKernel::compute`] opens its own Lua state, so one kernel can serve
/// concurrent calls from many threads.
#[derive(Debug, Clone)]
pub struct LuaKernel<const N: usize = OP_IO_SLOTS> {
    config: KernelConfig,
}

impl<const N: usize> LuaKernel<N> {
    pub fn new(config: KernelConfig) -> Self {
        LuaKernel { config }
    }

    /// Build a kernel from node attributes (`code`, optional `step_limit`).
    pub fn from_info(info: &KernelInfo) -> KernelResult<Self> {
        Ok(LuaKernel::new(KernelConfig::from_info(info)?))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Run the script once against the host's inputs and write its outputs.
    ///
    /// Either every produced output has been written and `Ok(())` is
    /// returned, or the call failed with a single [`KernelError`].
    pub fn compute<C>(&self, ctx: &mut C) -> KernelResult<()>
    where
        C: KernelContext + ?Sized,
    {
        let mut invocation = Invocation::start();
        let result = self.run(ctx, &mut invocation);
        invocation.finish(&result);
        result
    }

    fn run<C>(&self, ctx: &mut C, invocation: &mut Invocation) -> KernelResult<()>
    where
        C: KernelContext + ?Sized,
    {
        // Dropped at the end of this function on every path.
        let env = ScriptEnvironment::new(&self.config);

        invocation.advance(Phase::Compiling);
        let compute = env.compile(self.config.code())?;

        invocation.advance(Phase::Marshalling);
        let inputs: [Option<Tensor>; N] = copy_inputs(ctx);

        let lua = env.lua();
        let host: &C = &*ctx;
        let outputs = lua
            .scope(|scope| Ok(execute(lua, scope, &compute, &inputs, host, invocation)))
            .map_err(|e| KernelError::from_script(&e))??;

        commit_outputs(ctx, outputs)
    }
}

/// The part of a call that needs the scoped accessors alive.
fn execute<'lua, 'scope, C, const N: usize>(
    lua: &'lua Lua,
    scope: &Scope<'lua, 'scope>,
    compute: &Function<'lua>,
    inputs: &'scope [Option<Tensor>; N],
    host: &C,
    invocation: &mut Invocation,
) -> KernelResult<[Option<Tensor>; N]>
where
    'lua: 'scope,
    C: KernelContext + ?Sized,
{
    let args = marshal_inputs(lua, scope, inputs)?;

    invocation.advance(Phase::Executing);
    let returned = invoke(compute, args, N)?;

    invocation.advance(Phase::Materializing);
    read_outputs::<_, N>(host, returned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostContext;
    use crate::error::ErrorKind;
    use lua_tensor::{Shape, TensorData};

    fn kernel<const N: usize>(code: &str) -> LuaKernel<N> {
        LuaKernel::new(KernelConfig::new(code))
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(Phase::Idle < Phase::Compiling);
        assert!(Phase::Executing < Phase::Materializing);
        assert!(Phase::Materializing < Phase::Done);
        assert!(Phase::Done < Phase::Errored);
    }

    #[test]
    fn test_invocation_terminal_phases() {
        let mut ok = Invocation::start();
        ok.advance(Phase::Compiling);
        ok.finish(&Ok(()));
        assert_eq!(ok.phase, Phase::Done);

        let mut failed = Invocation::start();
        failed.advance(Phase::Compiling);
        failed.finish(&Err(KernelError::structure("nope")));
        assert_eq!(failed.phase, Phase::Errored);
    }

    #[test]
    fn test_scale_by_two() {
        let k = kernel::<1>(
            "return function(x) return { shape = x.shape, get = function(i) return 2 * x.get(i) end } end",
        );
        let input = Tensor::from_vec(vec![1.0, -2.0, 0.5], Shape::new(vec![3])).unwrap();
        let mut host = HostContext::new(1).with_input(0, input).with_output(0);
        k.compute(&mut host).unwrap();
        assert_eq!(host.output_tensor(0).unwrap().as_slice(), &[2.0, -4.0, 1.0]);
    }

    #[test]
    fn test_compile_error_before_marshalling() {
        let k = kernel::<1>("return function(x");
        let mut host = HostContext::new(1).with_output(0);
        let err = k.compute(&mut host).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptExecution);
        assert_eq!(host.allocated_outputs(), 0);
    }

    #[test]
    fn test_globals_do_not_leak_between_calls() {
        let k = kernel::<1>(
            "return function(x) local old = stash; stash = x; return old end",
        );
        let mut host = HostContext::new(1).with_input(0, Tensor::scalar(1.0));
        k.compute(&mut host).unwrap();
        k.compute(&mut host).unwrap();
        assert_eq!(host.allocated_outputs(), 0);
    }
}
