//! Binary entry point for papertray.
//!
//! This binary provides the CLI interface for the document intake pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use papertray::config::PapertrayConfig;
use papertray::observability::{self, ConsumptionObserver, EventBus, ObservabilityConfig};
use papertray::services::Consumer;
use papertray::watcher::WatchState;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Papertray - watches a drop folder and files documents away.
#[derive(Parser)]
#[command(name = "papertray")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Watch the consumption directory until interrupted.
    Watch {
        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Print consumption events as JSON lines on stdout.
        #[arg(long)]
        events: bool,
    },

    /// Ingest one file now, skipping the stability check.
    Consume {
        /// The file to ingest.
        file: PathBuf,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let mut observability_config = ObservabilityConfig::from_config(&config, cli.verbose);
    observability_config.metrics_expose = matches!(cli.command, Commands::Watch { .. });
    let _observability = match observability::init(observability_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<PapertrayConfig> {
    let config = match path {
        Some(path) => PapertrayConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => PapertrayConfig::load_default(),
    };
    Ok(config.with_env_overrides())
}

fn run_command(command: Commands, config: &PapertrayConfig) -> Result<()> {
    match command {
        Commands::Watch { max_cycles, events } => cmd_watch(config, max_cycles, events),
        Commands::Consume { file } => cmd_consume(config, &file),
        Commands::Config { show } => {
            if show {
                print_config(config);
            } else {
                println!("Use --show to print the effective configuration");
            }
            Ok(())
        },
    }
}

fn cmd_watch(config: &PapertrayConfig, max_cycles: Option<u64>, events: bool) -> Result<()> {
    let mut consumer = Consumer::from_config(config).context("starting consumer")?;
    if events {
        let bus = EventBus::default();
        spawn_event_printer(&bus)?;
        consumer = consumer.with_observer(Arc::new(bus) as Arc<dyn ConsumptionObserver>);
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    tracing::info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        "Watching for documents"
    );

    let mut state = WatchState::default();
    let mut cycles: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match consumer.run_cycle(state.clone()) {
            Ok((_summary, next)) => state = next,
            Err(e @ papertray::Error::Configuration(_)) => {
                return Err(e).context("watch cycle aborted");
            },
            Err(e) => tracing::warn!(error = %e, "Watch cycle failed, retrying next cycle"),
        }

        cycles += 1;
        if max_cycles.is_some_and(|max| cycles >= max) {
            break;
        }
        sleep_while_running(&running, config.poll_interval);
    }

    tracing::info!(cycles, "Stopped watching");
    Ok(())
}

fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}

fn spawn_event_printer(bus: &EventBus) -> Result<()> {
    let mut receiver = bus.subscribe();
    std::thread::Builder::new()
        .name("papertray-events".to_string())
        .spawn(move || {
            loop {
                match receiver.blocking_recv() {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "Cannot serialize event"),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event printer lagged");
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .context("spawning event printer")?;
    Ok(())
}

fn cmd_consume(config: &PapertrayConfig, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    let consumer = Consumer::from_config(config).context("starting consumer")?;
    let document = consumer
        .try_consume(file)
        .with_context(|| format!("consuming {}", file.display()))?;
    println!("Stored document {} ({document})", document.id);
    Ok(())
}

fn print_config(config: &PapertrayConfig) {
    let path_or_unset = |p: Option<&PathBuf>| {
        p.map_or_else(|| "(unset)".to_string(), |p| p.display().to_string())
    };

    println!("consumption_dir = {}", path_or_unset(config.consumption_dir.as_ref()));
    println!("data_dir = {}", config.data_dir.display());
    println!("media_dir = {}", config.media_dir().display());
    println!("database_path = {}", config.database_path().display());
    println!("scratch_dir = {}", config.scratch_dir().display());
    println!("poll_interval_secs = {}", config.poll_interval.as_secs());
    println!("disposal = {}", config.disposal.as_str());
    println!(
        "passphrase = {}",
        match &config.passphrase {
            Some(p) if !p.expose_secret().is_empty() => "[REDACTED]",
            _ => "(unset)",
        }
    );
    for transform in &config.filename_transforms {
        println!(
            "filename_transform = {:?} -> {:?}",
            transform.pattern, transform.replacement
        );
    }
    println!(
        "text_backend = enabled: {}, weight: {}",
        config.text_backend.enabled, config.text_backend.weight
    );
    for backend in &config.command_backends {
        println!(
            "command_backend = {} ({}), weight: {}",
            backend.name,
            backend.extensions.join(", "),
            backend.weight
        );
    }
    println!(
        "logging = format: {}, file: {}",
        config.logging.format.as_deref().unwrap_or("pretty"),
        path_or_unset(config.logging.file.as_ref())
    );
    println!(
        "metrics = enabled: {}, port: {}",
        config.metrics.enabled, config.metrics.port
    );
}
