//! CLI definitions for tankfarm-console.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tankfarm-console",
    version,
    about = "Tank farm scheduling console",
    infer_subcommands = true,
    after_help = "Examples:\n  tankfarm-console serve                     # web UI on 127.0.0.1:8090\n  tankfarm-console set numTanks=14 numFilled=9\n  tankfarm-console simulate --csv\n  tankfarm-console --backend http://10.0.0.5:5000 optimize"
)]
pub struct Cli {
    /// Show debug logs.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Configuration file.
    #[arg(long, global = true, default_value = "tankfarm.toml")]
    pub config: PathBuf,
    /// Backend base URL (overrides backend.base_url).
    #[arg(long, global = true)]
    pub backend: Option<String>,
    /// Local state file (overrides storage.path).
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load saved inputs and serve the web UI (default).
    Serve {
        /// Listen address (overrides web.listen).
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print the current inputs.
    Show {
        /// Only this part.
        #[arg(long, value_parser = ["fields", "tanks", "mix"])]
        section: Option<String>,
    },
    /// Set inputs (`key=value`) and save.
    #[command(after_help = "Examples:\n  tankfarm-console set numTanks=14\n  tankfarm-console set tank3Name=T-103 tank3Level=420000")]
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        assignments: Vec<String>,
    },
    /// Add or remove idle tank crude lines.
    Idle {
        #[command(subcommand)]
        action: IdleAction,
    },
    /// Replace the crude mix (`name=percent`) and save.
    SetMix {
        #[arg(required = true, value_name = "NAME=PERCENT")]
        rows: Vec<String>,
    },
    /// Show the crude mix with daily volumes.
    Mix {
        /// Show the backend's stored mix instead.
        #[arg(long)]
        remote: bool,
    },
    /// Run a simulation.
    Simulate {
        /// Download the CSV files afterwards.
        #[arg(long)]
        csv: bool,
        /// Summarize tank states at this date instead of the last day.
        #[arg(long, value_name = "DATE")]
        day: Option<String>,
    },
    /// Run the buffer analysis.
    BufferAnalysis,
    /// Run the cargo optimization.
    Cargo,
    /// Optimize the crude mix schedule.
    Optimize,
    /// Check current inventory against the min/max range.
    CheckInventory {
        /// Ask the backend as well.
        #[arg(long)]
        remote: bool,
    },
    /// Export tank status, charts or the solver report.
    Export {
        #[arg(value_parser = ["tank-status", "charts", "solver-report"])]
        kind: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum IdleAction {
    /// Append a crude line to an idle tank.
    Add {
        #[arg(long)]
        tank: u32,
        #[arg(long)]
        crude: String,
        #[arg(long)]
        volume: f64,
    },
    /// Remove a crude line by position (0-based).
    Remove {
        #[arg(long)]
        tank: u32,
        #[arg(long)]
        index: usize,
    },
}
