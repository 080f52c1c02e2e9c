//! tickbridge CLI - host simulator for the call bridge.
//!
//! Plays the part of a tick-polled host: dispatches a call into the WASM
//! runtime, then ticks a console VM until the callback arrives.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tickbridge_config::LoadOptions;

mod commands;
mod config_bridge;
mod console_vm;

use commands::call::{CallArgs, run_call};

/// tickbridge - run embedded-runtime calls from a tick-polled host
#[derive(Parser)]
#[command(name = "tickbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extra configuration file, merged last
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a function in a WASM module
    Call {
        /// Dotted module name, e.g. `tools.text`
        module: String,

        /// Exported function to call
        function: String,

        /// String arguments
        arguments: Vec<String>,

        /// Host callback that receives the result
        #[arg(long, default_value = "onResult")]
        callback: String,

        /// Run on a worker and deliver on a later tick
        #[arg(short, long)]
        threaded: bool,

        /// Ticks to wait for a threaded result
        #[arg(long, default_value = "200")]
        ticks: u32,

        /// Milliseconds per tick
        #[arg(long, default_value = "50")]
        tick_ms: u64,

        /// Additional module directory (repeatable)
        #[arg(short = 'I', long = "search")]
        search: Vec<PathBuf>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Load and validate without running anything
    Validate,
    /// Show configuration file locations
    Paths,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir().ok();
    let resolved = tickbridge_config::load(&LoadOptions {
        workspace_root: workspace_root.clone(),
        explicit_file: cli.config.clone(),
        ..LoadOptions::default()
    })
    .context("failed to load configuration")?;

    let mut log_config = config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = tickbridge_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Call {
            module,
            function,
            arguments,
            callback,
            threaded,
            ticks,
            tick_ms,
            search,
        } => run_call(
            &resolved.config,
            CallArgs {
                module,
                function,
                arguments,
                callback,
                threaded,
                ticks,
                tick_ms,
                search,
            },
        ),
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => commands::config::show(&resolved, &format),
            ConfigCommands::Validate => {
                commands::config::validate(&resolved);
                Ok(())
            },
            ConfigCommands::Paths => {
                commands::config::paths(&resolved, workspace_root.as_deref());
                Ok(())
            },
        },
    }
}
