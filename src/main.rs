use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lastn::config::Config;
use lastn::models::Batch;
use lastn::util::state_store;
use lastn::util::journal;
use lastn::window::{self, Guard};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lastn", about = "Keep the last N records of a stream of batches", version = "0.1")]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(short, long, default_value = "warn", value_parser = parse_level)]
    log_level: Level,

    /// Window state file (overrides the config)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest JSON batch files, in order, into the persisted window
    Ingest {
        /// Batch files: nested arrays or {"dims": [...], "data": [...]}
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Window capacity for a new window (must match an existing one)
        #[arg(short = 'n', long)]
        capacity: Option<i64>,
    },
    /// Print the retained window
    Show {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Forget the persisted window
    Reset,
    /// Print recent ingest journal entries
    Journal {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        last: usize,
    },
    /// Print config file path and current values
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cfg = Config::load();
    match cli.command {
        Command::Ingest { files, capacity } => run_ingest(&cfg, cli.state, &files, capacity),
        Command::Show { json }              => run_show(&cfg, cli.state, json),
        Command::Reset                      => run_reset(&cfg, cli.state),
        Command::Journal { last }           => run_journal(last),
        Command::Config                     => run_print_config(&cfg),
    }
}

fn parse_level(s: &str) -> Result<Level, String> {
    s.parse::<Level>().map_err(|e| format!("{} (expected error, warn, info, debug or trace)", e))
}

fn state_path(cfg: &Config, explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(|| cfg.storage.state_path())
        .ok_or_else(|| anyhow::anyhow!("no data dir; pass --state"))
}

fn read_batch(path: &Path) -> Result<Batch<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let batch = Batch::from_json(&value).with_context(|| format!("decoding {}", path.display()))?;
    Ok(batch)
}

fn run_ingest(cfg: &Config, state: Option<PathBuf>, files: &[PathBuf], capacity: Option<i64>) -> Result<()> {
    let path = state_path(cfg, state)?;
    let mut persisted = state_store::load_or_create(&path, &cfg.window, capacity)?;

    let journal_path = if cfg.storage.journal { journal::journal_path() } else { None };
    for file in files {
        let batch = read_batch(file)?;
        let visits = if cfg.window.track_visits { Some(&mut persisted.visits) } else { None };
        let outcome = window::ingest(&mut persisted.buffer, &batch, visits, Guard::NoGuard)
            .with_context(|| format!("ingesting {}", file.display()))?;
        state_store::save(&path, &mut persisted)?;

        let source = file.display().to_string();
        if let Some(jp) = &journal_path {
            journal::append(jp, &source, &outcome, persisted.visits.get());
        }
        println!(
            "{}: {} offered, {} kept, window {}/{}, cursor {}{}",
            source,
            outcome.offered,
            outcome.copied,
            outcome.size,
            persisted.buffer.capacity(),
            outcome.cursor,
            if outcome.overflowed { " (overflow)" } else { "" },
        );
    }
    Ok(())
}

fn run_show(cfg: &Config, state: Option<PathBuf>, json: bool) -> Result<()> {
    let path = state_path(cfg, state)?;
    let persisted = match state_store::load(&path)? {
        Some(p) => p,
        None    => {
            println!("No window at {}.", path.display());
            return Ok(());
        }
    };
    let buf = &persisted.buffer;
    let shape = buf.record_shape().map(|s| s.to_string()).unwrap_or_else(|| "(unset)".to_string());

    if json {
        let records: Vec<&[f64]> = buf.records().collect();
        let out = serde_json::json!({
            "capacity":     buf.capacity(),
            "size":         buf.len(),
            "cursor":       buf.cursor(),
            "record_shape": buf.record_shape(),
            "visits":       persisted.visits.get(),
            "saved_at":     persisted.saved_at,
            "records":      records,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("State: {}", path.display());
    println!("  capacity = {}", buf.capacity());
    println!("  size     = {}", buf.len());
    println!("  cursor   = {}", buf.cursor());
    println!("  shape    = {}", shape);
    println!("  visits   = {}", persisted.visits.get());
    if let Some(ts) = &persisted.saved_at {
        println!("  saved_at = {}", ts);
    }
    println!();
    for (slot, record) in buf.records().enumerate() {
        println!("  [{:>4}] {:?}", slot, record);
    }
    Ok(())
}

fn run_reset(cfg: &Config, state: Option<PathBuf>) -> Result<()> {
    let path = state_path(cfg, state)?;
    if state_store::remove(&path)? {
        println!("Removed {}.", path.display());
    } else {
        println!("No window at {}.", path.display());
    }
    Ok(())
}

fn run_journal(n: usize) -> Result<()> {
    let entries = journal::journal_path()
        .map(|p| journal::load_recent(&p, n))
        .unwrap_or_default();
    if entries.is_empty() {
        println!("No entries in journal.");
        return Ok(());
    }
    for line in &entries {
        println!("{}", line);
    }
    Ok(())
}

fn run_print_config(cfg: &Config) -> Result<()> {
    let path = Config::config_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    let state = cfg.storage.state_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {}", path);
    println!();
    println!("[window]");
    println!("  capacity     = {}", cfg.window.capacity);
    println!("  growth_pct   = {}%", cfg.window.growth_pct);
    println!("  track_visits = {}", cfg.window.track_visits);
    println!();
    println!("[storage]");
    println!("  state_file   = {}", state);
    println!("  journal      = {}", cfg.storage.journal);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_is_parsed_up_front() {
        let cli = Cli::try_parse_from(["lastn", "--log-level", "debug", "reset"]).unwrap();
        assert_eq!(cli.log_level, Level::DEBUG);

        let cli = Cli::try_parse_from(["lastn", "config"]).unwrap();
        assert_eq!(cli.log_level, Level::WARN);

        assert!(Cli::try_parse_from(["lastn", "--log-level", "loud", "reset"]).is_err());
    }

    #[test]
    fn ingest_takes_a_capacity_override() {
        let cli = Cli::try_parse_from(["lastn", "ingest", "-n", "8", "a.json", "b.json"]).unwrap();
        match cli.command {
            Command::Ingest { files, capacity } => {
                assert_eq!(files.len(), 2);
                assert_eq!(capacity, Some(8));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
