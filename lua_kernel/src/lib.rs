//! # lua_kernel - Run Lua scripts as tensor operators
//!
//! This crate implements the `Lua` custom operator: a kernel that evaluates a
//! user-supplied Lua script as a pure transform over up to `N` optional
//! `f64` tensor inputs and outputs.
//!
//! ## Script contract
//!
//! The script source must evaluate to a single function. That function is
//! called with one argument per input slot, `nil` for absent inputs and a
//! tensor table otherwise:
//!
//! ```lua
//! { shape = {d0, d1, ...}, get = function(i0, i1, ...) return element end }
//! ```
//!
//! Indices are 0-based, one per axis. The function must return exactly `N`
//! values: `nil` for an output slot it leaves empty, or a table with the same
//! `shape`/`get` layout, which is read back in row-major order.
//!
//! ## Example
//!
//! ```
//! use lua_kernel::{HostContext, KernelConfig, LuaKernel};
//! use lua_tensor::prelude::*;
//!
//! let kernel = LuaKernel::<1>::new(KernelConfig::new("return function(x) return x end"));
//! let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2])).unwrap();
//! let mut host = HostContext::new(1).with_input(0, x.clone()).with_output(0);
//!
//! kernel.compute(&mut host).unwrap();
//! assert_eq!(host.output_tensor(0), Some(&x));
//! ```
//!
//! ## Architecture
//!
//! - [`marshal`]: host inputs to scoped Lua tensor tables
//! - [`executor`]: per-call Lua state, compilation, invocation
//! - [`materialize`]: returned tables back to host buffers
//! - [`kernel`]: the per-call state machine tying the three together
//! - [`op`] and [`config`]: what the host sees before any call

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod kernel;
pub mod marshal;
pub mod materialize;
pub mod op;

pub use config::{AttributeValue, KernelConfig, KernelInfo};
pub use context::{HostContext, KernelContext};
pub use error::{ErrorKind, KernelError, KernelResult};
pub use kernel::{LuaKernel, Phase};
pub use op::{ElementType, LuaOp, OpDomain, OpSchema, SlotCharacteristic, OP_DOMAIN, OP_IO_SLOTS, OP_NAME};
