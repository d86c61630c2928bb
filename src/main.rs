use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rungate::config::{Config, Settings};
use rungate::document::DesiredState;
use rungate::realize::{Coordinator, RunReport, SimulatedProvider};
use rungate::resource::{get_all_kind_keys, get_kind};
use rungate::stack::{self, Stack};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Declare and realize a private Cloud Run service behind IAP
#[derive(Parser, Debug)]
#[command(name = "rungate", version = rungate::VERSION, about, long_about = None)]
struct Args {
    /// GCP project to declare resources in
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Region for regional resources
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Output format for documents and reports
    #[arg(long, value_enum, default_value = "json", global = true)]
    format: Format,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the desired-state document
    Plan,
    /// Print the realization order, one level per line
    Order,
    /// Realize the stack against the simulated provider
    Apply {
        /// Make the named resource fail (repeatable)
        #[arg(long = "fail", value_name = "NAME")]
        fail: Vec<String>,

        /// Maximum provider calls in flight per level
        #[arg(long, default_value_t = 4)]
        parallel: usize,

        /// Simulated latency per provider call, in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
    /// List known resource kinds
    Kinds,
    /// Write the effective project and region to the config file
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel, to_stderr: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    if to_stderr {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(tracing_level.to_string().to_lowercase()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    }

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("rungate started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("rungate").join("rungate.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".rungate").join("rungate.log");
    }
    PathBuf::from("rungate.log")
}

fn print<T: Serialize>(value: &T, format: Format) -> Result<()> {
    let text = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text.trim_end());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_stderr)?;

    let config = Config::load();
    let settings = Settings::from_config(&config, args.project.as_deref(), args.region.as_deref());
    tracing::info!("Using project: {}, region: {}", settings.project_id, settings.region);

    match args.command {
        Command::Plan => {
            let stack = stack::declare(&settings)?;
            stack.graph.validate()?;
            let doc = DesiredState::from_stack(&stack);
            match args.format {
                Format::Json => println!("{}", doc.to_json()?),
                Format::Yaml => print!("{}", doc.to_yaml()?),
            }
        }
        Command::Order => {
            let stack = stack::declare(&settings)?;
            for (depth, level) in stack.graph.levels()?.iter().enumerate() {
                let names: Vec<&str> = level
                    .iter()
                    .filter_map(|id| stack.graph.node(*id))
                    .map(|n| n.name())
                    .collect();
                println!("{}: {}", depth, names.join(", "));
            }
        }
        Command::Apply {
            fail,
            parallel,
            latency_ms,
        } => {
            let stack = stack::declare(&settings)?;
            let report = apply(&stack, fail, parallel, Duration::from_millis(latency_ms)).await?;

            for node in &report.nodes {
                eprintln!("{}", node.summary_line());
            }
            eprintln!("{}", report.summary());
            print(&report, args.format)?;

            if !report.is_success() {
                bail!("{} of {} resources not realized", report.nodes.len() - report.count("realized"), report.nodes.len());
            }
        }
        Command::Kinds => {
            for key in get_all_kind_keys() {
                if let Some(def) = get_kind(key) {
                    println!("{:<20} {:<32} {}", key, def.display_name, def.provider_type);
                }
            }
        }
        Command::Init => {
            let config = Config {
                project_id: Some(settings.project_id.clone()),
                region: Some(settings.region.clone()),
                ..config
            };
            config.save()?;
            match Config::config_path() {
                Some(path) => println!("Wrote {}", path.display()),
                None => println!("No config directory available; nothing written"),
            }
        }
    }

    Ok(())
}

/// Realize with Ctrl-C wired to the coordinator's cancellation signal
async fn apply(stack: &Stack, fail: Vec<String>, parallel: usize, latency: Duration) -> Result<RunReport> {
    let provider = SimulatedProvider::new(&stack.settings.project_id, &stack.settings.region)
        .with_failures(fail)
        .with_latency(latency);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight resources");
            let _ = cancel_tx.send(true);
        }
    });

    let report = Coordinator::new()
        .with_max_parallel(parallel)
        .with_cancellation(cancel_rx)
        .run(&stack.graph, &provider)
        .await?;
    Ok(report)
}
