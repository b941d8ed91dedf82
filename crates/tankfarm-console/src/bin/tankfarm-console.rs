//! CLI entrypoint for the tank farm console.

#[path = "tankfarm-console/cli.rs"]
mod cli;
#[path = "tankfarm-console/run.rs"]
mod run;
#[path = "tankfarm-console/style.rs"]
mod style;

use clap::Parser;

use cli::{Cli, Command, IdleAction};
use tankfarm_console::ConsoleConfig;

fn main() -> anyhow::Result<()> {
    if let Err(err) = run() {
        eprintln!("{}", style::error(format!("Error: {}", format_error_with_tip(&err))));
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConsoleConfig::load_or_default(&cli.config)?
        .with_overrides(cli.backend.clone(), cli.state.clone())?;
    init_logging(&config, cli.verbose);

    let command = cli.command.unwrap_or(Command::Serve { listen: None });
    let listen = match &command {
        Command::Serve { listen } => listen.clone().unwrap_or_else(|| config.listen.to_string()),
        _ => String::new(),
    };
    let mut console = run::load_console(config, cli.verbose);
    match command {
        Command::Serve { .. } => run::serve(console, &listen),
        Command::Show { section } => {
            run::show(&console, section.as_deref());
            Ok(())
        }
        Command::Set { assignments } => run::set(&mut console, &assignments),
        Command::Idle { action } => match action {
            IdleAction::Add {
                tank,
                crude,
                volume,
            } => run::idle_add(&mut console, tank, crude, volume),
            IdleAction::Remove { tank, index } => run::idle_remove(&mut console, tank, index),
        },
        Command::SetMix { rows } => run::set_mix(&mut console, &rows),
        Command::Mix { remote } => run::mix(&console, remote),
        Command::Simulate { csv, day } => run::simulate(&mut console, csv, day.as_deref()),
        Command::BufferAnalysis => {
            run::print_blocks(&console.buffer_analysis()?);
            Ok(())
        }
        Command::Cargo => {
            run::print_blocks(&console.cargo_optimization()?);
            Ok(())
        }
        Command::Optimize => {
            run::print_blocks(&console.optimize_crude_mix()?);
            Ok(())
        }
        Command::CheckInventory { remote } => run::check_inventory(&mut console, remote),
        Command::Export { kind } => run::export(&mut console, &kind),
    }
}

fn init_logging(config: &ConsoleConfig, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config
            .log_level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn format_error_with_tip(err: &anyhow::Error) -> String {
    let message = format!("{err:#}");
    let tip = if message.contains("invalid config") {
        Some("Tip: check tankfarm.toml or pass --config <file>.")
    } else if message.contains("transport error") {
        Some("Tip: is the scheduling backend running? Set it with --backend <url>.")
    } else if message.contains("web bind") {
        Some("Tip: pick another address with `tankfarm-console serve --listen 127.0.0.1:<port>`.")
    } else {
        None
    };
    match tip {
        Some(tip) => format!("{message}\n{tip}"),
        None => message,
    }
}
