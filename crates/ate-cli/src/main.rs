//! ate CLI entry point.
//!
//! `ate run` hosts application scripts and feeds them events read as JSON
//! lines from stdin. `ate eval` evaluates a Lua expression in a scratch
//! runtime and prints the result as JSON.

mod apps;

use anyhow::{bail, Context, Result};
use ate_event::{Event, LocalEventBus};
use ate_lua::{AteConfig, ConfigError, ConfigLoader, RuntimeManager};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// How long `run` waits for queued deliveries after stdin closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable info logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Per-call timeout in milliseconds (0 disables)
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load application directories and publish stdin events to them
    Run {
        /// App directories; defaults to every directory under `apps.dir`
        #[arg(value_name = "APP_DIR")]
        apps: Vec<PathBuf>,
    },
    /// Evaluate a Lua expression and print the JSON result
    Eval {
        /// Expression, e.g. `smath.add("0x1", "0x2")`
        expr: String,
    },
}

/// Merges file/env config via [`ConfigLoader`] and applies CLI overrides
/// as the highest-priority layer.
struct CliConfigResolver {
    project_root: PathBuf,
    debug: bool,
    timeout_ms: Option<u64>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let project_root = args.project.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            })
        });
        Self {
            project_root,
            debug: args.debug,
            timeout_ms: args.timeout_ms,
        }
    }

    fn resolve(&self) -> Result<AteConfig, ConfigError> {
        let mut config = ConfigLoader::new()
            .with_project_root(&self.project_root)
            .load()?;

        if self.debug {
            config.debug = true;
        }
        if let Some(ms) = self.timeout_ms {
            config.runtime.call_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(dir) = config.apps.dir.take() {
            config.apps.dir = Some(if dir.is_relative() {
                self.project_root.join(dir)
            } else {
                dir
            });
        }
        Ok(config)
    }
}

fn init_tracing(args: &Args, config: &AteConfig) {
    let filter = if args.debug || config.debug {
        EnvFilter::new("debug,mlua=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CliConfigResolver::from_args(&args)
        .resolve()
        .context("failed to load configuration")?;
    init_tracing(&args, &config);
    debug!(?config, "configuration resolved");

    match args.command {
        Command::Run { apps } => run(config, apps).await,
        Command::Eval { expr } => eval(config, expr).await,
    }
}

async fn run(config: AteConfig, apps: Vec<PathBuf>) -> Result<()> {
    let dirs = if apps.is_empty() {
        let Some(root) = config.apps.dir.as_deref() else {
            bail!("no app directories given and apps.dir is not configured");
        };
        apps::discover(root)?
    } else {
        apps
    };
    if dirs.is_empty() {
        bail!("no applications to run");
    }

    let bus = Arc::new(LocalEventBus::new());
    let manager = Arc::new(RuntimeManager::new(bus.clone(), config.runtime.clone()));

    let loader = Arc::clone(&manager);
    let names = tokio::task::spawn_blocking(move || apps::load(&loader, &dirs)).await??;
    info!(apps = ?names, "runtimes ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_event(&line) {
            Ok(Some(event)) => {
                let delivered = bus.publish(&event);
                debug!(source = %event.source, event_type = %event.event_type, delivered, "event published");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping malformed event line"),
        }
    }

    // Closing the bus lets every forwarding task drain its queue and exit.
    bus.close();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while has_subscriptions(&manager) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("pending deliveries did not finish before shutdown");
    }

    manager.shutdown_all();
    Ok(())
}

async fn eval(config: AteConfig, expr: String) -> Result<()> {
    let bus = Arc::new(LocalEventBus::new());
    let manager = RuntimeManager::new(bus, config.runtime);

    let value = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
        let runtime = manager.create_runtime("eval")?;
        runtime.add_script(&format!("function __ate_eval()\n  return {expr}\nend"))?;
        let value = runtime.call_function("__ate_eval", Vec::new())?;
        manager.shutdown_all();
        Ok(value)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn has_subscriptions(manager: &RuntimeManager) -> bool {
    manager
        .runtime_names()
        .iter()
        .filter_map(|name| manager.get_runtime(name))
        .any(|rt| !rt.subscription_ids().is_empty())
}

/// Parses one stdin line; blank lines and `#` comments yield `None`.
fn parse_event(line: &str) -> Result<Option<Event>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event: Event = serde_json::from_str(line).context("invalid event JSON")?;
    Ok(Some(event))
}
