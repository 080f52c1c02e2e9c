//! `tickbridge call`: run one call through the bridge like a host would.

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tickbridge_config::Config;
use tickbridge_core::{Bridge, CallDescriptor};
use tickbridge_wasm::{WasmConfig, WasmInterpreter};
use tracing::{debug, warn};

use crate::console_vm::ConsoleVm;

/// Arguments of one `call` invocation.
#[derive(Debug, Clone)]
pub struct CallArgs {
    /// Dotted module name.
    pub module: String,
    /// Export to call.
    pub function: String,
    /// String arguments.
    pub arguments: Vec<String>,
    /// Callback to deliver to; empty for fire-and-forget.
    pub callback: String,
    /// Dispatch to a worker instead of running inline.
    pub threaded: bool,
    /// Ticks to wait for delivery.
    pub ticks: u32,
    /// Milliseconds between ticks.
    pub tick_ms: u64,
    /// Extra module directories.
    pub search: Vec<PathBuf>,
}

/// Run the call. Inline calls print the result; threaded calls tick a
/// console VM until the callback fires or the tick budget runs out.
pub fn run_call(config: &Config, args: CallArgs) -> Result<()> {
    let mut runtime = WasmInterpreter::new(WasmConfig::from(&config.runtime));
    for dir in &args.search {
        runtime = runtime.with_search_dir(dir.clone());
    }
    let bridge = Bridge::from_config(runtime, config).context("failed to start bridge")?;

    let call = CallDescriptor::new(&args.module, &args.function)
        .with_callback(&args.callback)
        .with_arguments(&args.arguments);

    let outcome = if args.threaded {
        run_threaded(&bridge, call, &args)
    } else {
        bridge
            .dispatch_sync(call)
            .map(|result| println!("{result}"))
            .map_err(anyhow::Error::from)
    };

    bridge.shutdown();
    outcome
}

fn run_threaded(
    bridge: &Bridge<WasmInterpreter>,
    call: CallDescriptor,
    args: &CallArgs,
) -> Result<()> {
    let fire_and_forget = call.is_fire_and_forget();
    let id = bridge.dispatch_async(call)?;
    debug!(call_id = %id, "call queued");

    let mut vm = ConsoleVm::new("console", io::stdout()).with_public(&args.callback);
    for tick in 0..args.ticks {
        let report = bridge.tick(&mut vm);
        if report.delivered > 0 {
            debug!(tick, total = vm.delivered(), "callback delivered");
            return Ok(());
        }
        if bridge.in_flight() == 0 && bridge.pending() == 0 {
            if fire_and_forget {
                return Ok(());
            }
            bail!("call {id} failed; the error report above has details");
        }
        thread::sleep(Duration::from_millis(args.tick_ms));
    }

    warn!(call_id = %id, ticks = args.ticks, "no result before tick budget ran out");
    bail!("call {id} did not complete within {} ticks", args.ticks)
}
