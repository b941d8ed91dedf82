//! Subcommand handlers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use tankfarm_core::crude_mix::{summarize, CrudeMixRow};
use tankfarm_core::form::{FieldGroup, FIELD_CATALOG};
use tankfarm_core::lenient::{format_plain, format_thousands, parse_number};
use tankfarm_core::present::{present_mix, Block};
use tankfarm_core::{CrudeLine, TankCategory, TankId};
use tankfarm_console::persist::{LoadSource, SaveOutcome};
use tankfarm_console::web::start_web_server;
use tankfarm_console::{Console, ConsoleConfig, ExportKind};

use crate::style;

pub fn load_console(config: ConsoleConfig, verbose: bool) -> Console {
    let mut console = Console::from_config(config);
    let outcome = console.load();
    if verbose {
        let source = match outcome.source {
            LoadSource::Nothing => "defaults",
            LoadSource::Local => "local state",
            LoadSource::Remote => "backend state",
            LoadSource::LocalNewer => "local state (newer than backend)",
        };
        match outcome.saved_at.and_then(format_saved_at) {
            Some(at) => eprintln!("Loaded {source} saved {at}."),
            None => eprintln!("Loaded {source}."),
        }
    }
    console
}

fn format_saved_at(millis: i64) -> Option<String> {
    let at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()?;
    at.format(&Rfc3339).ok()
}

pub fn serve(console: Console, listen: &str) -> anyhow::Result<()> {
    let shared = Arc::new(Mutex::new(console));
    let server = start_web_server(listen, shared)?;
    println!(
        "{} {}",
        style::success("Tank farm console ready at"),
        style::accent(format!("http://{}/", server.listen))
    );
    server.join();
    Ok(())
}

pub fn show(console: &Console, section: Option<&str>) {
    let form = console.form();
    if section.is_none() || section == Some("fields") {
        for group in FieldGroup::ALL {
            println!("{}", style::accent(group.title()));
            for spec in FIELD_CATALOG.iter().filter(|spec| spec.group == group) {
                println!("  {:<32} {}", spec.key, form.text(spec.key));
            }
        }
    }
    if section.is_none() || section == Some("tanks") {
        if let Some(err) = form.assignment_error() {
            println!("{}", style::error(err.to_string()));
        } else if let Some(message) = form.gate().rejection_message() {
            println!("{}", style::warning(message));
        }
        for category in TankCategory::RENDERED {
            let tanks: Vec<_> = form
                .tanks()
                .values()
                .filter(|tank| tank.category == category)
                .collect();
            if tanks.is_empty() {
                continue;
            }
            println!("{}", style::accent(format!("{} ({})", category.heading(), tanks.len())));
            for tank in tanks {
                println!(
                    "  {:>3}  {:<16} level {:>12}  dead bottom {:>10}  buffer {:>10}",
                    tank.id,
                    tank.name,
                    format_thousands(tank.level),
                    format_thousands(tank.dead_bottom),
                    format_thousands(tank.buffer)
                );
                for line in &tank.idle_crude_lines {
                    println!("       - {} {}", line.name, format_thousands(line.volume));
                }
            }
        }
    }
    if section.is_none() || section == Some("mix") {
        print_blocks(&console.mix_blocks());
    }
}

fn split_assignment(raw: &str) -> anyhow::Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim(), value))
        .filter(|(key, _)| !key.is_empty())
        .with_context(|| format!("expected KEY=VALUE, got '{raw}'"))
}

pub fn set(console: &mut Console, assignments: &[String]) -> anyhow::Result<()> {
    let now = Instant::now();
    for raw in assignments {
        let (key, value) = split_assignment(raw)?;
        console
            .edit_field(key, value, now)
            .with_context(|| format!("setting {key}"))?;
    }
    save(console)
}

pub fn idle_add(console: &mut Console, tank: u32, crude: String, volume: f64) -> anyhow::Result<()> {
    let id = TankId::new(tank).context("tank ids start at 1")?;
    let index = console.add_idle_line(id, CrudeLine::new(crude, volume), Instant::now())?;
    println!("Added line {index} to tank {id}.");
    save(console)
}

pub fn idle_remove(console: &mut Console, tank: u32, index: usize) -> anyhow::Result<()> {
    let id = TankId::new(tank).context("tank ids start at 1")?;
    let removed = console.remove_idle_line(id, index, Instant::now())?;
    println!("Removed {} from tank {id}.", removed.name);
    save(console)
}

pub fn set_mix(console: &mut Console, rows: &[String]) -> anyhow::Result<()> {
    let mut parsed = Vec::with_capacity(rows.len());
    for raw in rows {
        let (name, percent) = split_assignment(raw)?;
        let percent = parse_number(percent)
            .with_context(|| format!("'{percent}' is not a percentage"))?;
        parsed.push(CrudeMixRow::new(name, percent));
    }
    console.set_crude_mix(parsed, Instant::now());
    print_blocks(&console.mix_blocks());
    save(console)
}

pub fn mix(console: &Console, remote: bool) -> anyhow::Result<()> {
    if !remote {
        print_blocks(&console.mix_blocks());
        return Ok(());
    }
    let response = console.api().get_crude_mix()?;
    let summary = summarize(&response.crude_mix_data, console.form().number("processingRate"));
    print_blocks(&present_mix(&summary));
    Ok(())
}

fn save(console: &Console) -> anyhow::Result<()> {
    match console.save_now() {
        SaveOutcome::Blocked(message) => bail!("not saved: {message}"),
        SaveOutcome::Persisted(receipt) => {
            if let Err(err) = &receipt.local {
                eprintln!("{}", style::warning(format!("local save failed: {err}")));
            }
            if receipt.wait_remote() == Some(false) {
                eprintln!("{}", style::warning("backend save failed; kept locally"));
            }
            println!("{}", style::success("Saved."));
            Ok(())
        }
    }
}

pub fn simulate(console: &mut Console, csv: bool, day: Option<&str>) -> anyhow::Result<()> {
    let mut blocks = console.run_simulation()?;
    if day.is_some() {
        console.select_day(day)?;
        blocks = console.results().blocks();
    }
    print_blocks(&blocks);
    if csv {
        for result in console.download_csvs()? {
            match result {
                Ok(path) => println!("{}", style::success(format!("Saved {}", path.display()))),
                Err(err) => eprintln!("{}", style::warning(err.to_string())),
            }
        }
    }
    Ok(())
}

pub fn check_inventory(console: &mut Console, remote: bool) -> anyhow::Result<()> {
    let check = console.check_inventory(remote)?;
    println!("{}", style::by_class(check.class, &check.message));
    println!("Total inventory: {} bbl", format_plain(check.total));
    Ok(())
}

pub fn export(console: &mut Console, kind: &str) -> anyhow::Result<()> {
    let outcome = console.export(ExportKind::parse(kind)?)?;
    println!("{}", style::success(outcome.message()));
    Ok(())
}

pub fn print_blocks(blocks: &[Block]) {
    for block in blocks {
        if matches!(block, Block::Warning(_)) {
            println!("{}", style::warning(block.to_text()));
        } else {
            println!("{}", block.to_text());
        }
        println!();
    }
}
