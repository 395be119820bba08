//! CLI for the Lua tensor operator.
//!
//! `lua-op run` evaluates a script file against tensors read from JSON and
//! prints the produced outputs. `lua-op demo` runs a small fixed graph:
//! `z = x + y` computed on the host, then fed to a `Lua` node that sums it.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use lua_kernel::{HostContext, KernelConfig, LuaKernel, OP_IO_SLOTS};
use lua_tensor::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "lua-op")]
#[command(version)]
#[command(about = "Run Lua scripts as tensor operators")]
#[command(long_about = "
Run Lua scripts as tensor operators.

A script returns one function. The function receives one argument per input
slot (nil when absent, otherwise a {shape, get} table) and returns one value
per output slot in the same form.
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a script against JSON tensors
    Run {
        /// Lua script file
        script: PathBuf,

        /// JSON array of input tensors, `null` for absent slots ("-" reads stdin)
        #[arg(short, long)]
        inputs: Option<PathBuf>,

        /// Output slots the host declares
        #[arg(short, long, value_delimiter = ',', default_value = "0")]
        outputs: Vec<usize>,

        /// Number of input and output slots (1, 2, 4, 8 or 16)
        #[arg(long, default_value_t = OP_IO_SLOTS)]
        slots: usize,

        /// Abort the script after this many VM instructions
        #[arg(long)]
        step_limit: Option<u64>,
    },

    /// Add two vectors on the host and sum the result in Lua
    Demo,
}

/// A tensor as it appears in input and output JSON.
#[derive(Debug, Serialize, Deserialize)]
struct TensorJson {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TensorJson {
    fn into_tensor(self, slot: usize) -> Result<Tensor> {
        Tensor::from_vec(self.data, Shape::new(self.shape))
            .with_context(|| format!("input {slot}"))
    }
}

impl From<&Tensor> for TensorJson {
    fn from(tensor: &Tensor) -> Self {
        TensorJson {
            shape: tensor.shape().dims().to_vec(),
            data: tensor.as_slice().to_vec(),
        }
    }
}

const DEMO_SCRIPT: &str = r#"
return function(z)
    return {
        shape = {},
        get = function()
            local total = 0
            for i = 0, z.shape[1] - 1 do
                total = total + z.get(i)
            end
            return total
        end,
    }
end
"#;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            inputs,
            outputs,
            slots,
            step_limit,
        } => {
            let code = fs::read_to_string(&script)
                .with_context(|| format!("reading script {}", script.display()))?;
            let mut config = KernelConfig::new(code);
            if let Some(limit) = step_limit {
                config = config.with_step_limit(limit);
            }

            let inputs = match inputs {
                Some(path) => read_inputs(&path)?,
                None => Vec::new(),
            };
            let host = build_host(slots, inputs, &outputs)?;

            let produced = run_with_slots(slots, config, host)?;
            let json: Vec<Option<TensorJson>> = produced
                .iter()
                .map(|slot| slot.as_ref().map(TensorJson::from))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        Commands::Demo => {
            let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], Shape::new(vec![3]))?;
            let y = Tensor::from_vec(vec![-1.0, 0.5, 1.0], Shape::new(vec![3]))?;
            let z: Vec<f64> = x
                .as_slice()
                .iter()
                .zip(y.as_slice())
                .map(|(a, b)| a + b)
                .collect();
            let z = Tensor::from_vec(z, x.shape().clone())?;

            println!("=== Lua Operator Demo ===\n");
            println!("x = {:?}", x.as_slice());
            println!("y = {:?}", y.as_slice());
            println!("z = x + y = {:?}\n", z.as_slice());
            println!("Lua node:{DEMO_SCRIPT}");

            let mut host = HostContext::new(1).with_input(0, z).with_output(0);
            LuaKernel::<1>::new(KernelConfig::new(DEMO_SCRIPT)).compute(&mut host)?;

            let r = host
                .output_tensor(0)
                .context("the Lua node produced no output")?;
            println!("r = {:?} (shape {})", r.as_slice(), r.shape());
        }
    }

    Ok(())
}

fn read_inputs(path: &Path) -> Result<Vec<Option<TensorJson>>> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        fs::read_to_string(path).with_context(|| format!("reading inputs {}", path.display()))?
    };
    serde_json::from_str(&text).context("inputs must be a JSON array of {shape, data} or null")
}

fn build_host(
    slots: usize,
    inputs: Vec<Option<TensorJson>>,
    outputs: &[usize],
) -> Result<HostContext> {
    if inputs.len() > slots {
        bail!("{} inputs given, but the operator has {slots} slots", inputs.len());
    }
    let mut host = HostContext::new(slots);
    for (slot, input) in inputs.into_iter().enumerate() {
        if let Some(json) = input {
            let tensor = json.into_tensor(slot)?;
            debug!("input {slot}: shape {}", tensor.shape());
            host.set_input(slot, tensor);
        }
    }
    for &slot in outputs {
        if slot >= slots {
            bail!("output slot {slot} is out of range for {slots} slots");
        }
        host.declare_output(slot);
    }
    Ok(host)
}

fn run_with_slots(
    slots: usize,
    config: KernelConfig,
    host: HostContext,
) -> Result<Vec<Option<Tensor>>> {
    match slots {
        1 => run::<1>(config, host),
        2 => run::<2>(config, host),
        4 => run::<4>(config, host),
        8 => run::<8>(config, host),
        16 => run::<16>(config, host),
        other => bail!("unsupported slot count {other} (expected 1, 2, 4, 8 or 16)"),
    }
}

fn run<const N: usize>(config: KernelConfig, mut host: HostContext) -> Result<Vec<Option<Tensor>>> {
    let kernel = LuaKernel::<N>::new(config);
    kernel.compute(&mut host)?;
    info!("{} output(s) written", host.allocated_outputs());
    Ok(host.take_outputs())
}
