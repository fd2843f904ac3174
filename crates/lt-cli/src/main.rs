//! CLI entry point for logtail.
//!
//! This binary runs the ingestion core against a JSON state file and manages
//! the per-source registry stored in it.
//!
//! # Usage
//!
//! ```bash
//! logtail [OPTIONS] <COMMAND>
//!
//! # Register a source (its id is the log file name without extension)
//! logtail register --path /srv/game/logs/server-1.log --address 127.0.0.1:27015
//!
//! # Tail every registered source under a directory
//! logtail run --watch /srv/game/logs --live-map Town
//!
//! # Show persisted offsets
//! logtail status --format json
//!
//! # Forget a source's cursor
//! logtail reset server-1
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use lt_core::{
    ApplyContext, ApplyError, Config, LineApplier, LivenessProbe, ProbeError, ServerStatus,
    SourceId, SourceWatchState, StateStore,
};
use lt_tail::{JsonFileStateStore, MemorySessionRepository, Watcher};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Restart-safe tailing of append-only game server logs.
#[derive(Parser)]
#[command(name = "logtail", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    ///
    /// Defaults are used for anything the file omits, or for everything if
    /// no file is given.
    #[arg(short, long, global = true, env = "LOGTAIL_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Path to the JSON state file (overrides `state_path` in the config).
    #[arg(long, global = true, env = "LOGTAIL_STATE")]
    state: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch log directories and ingest new lines until interrupted.
    Run {
        /// Directory (or file) to watch. May be repeated.
        #[arg(short, long = "watch", required = true)]
        watch: Vec<Utf8PathBuf>,

        /// Map the monitored servers report as currently loaded.
        ///
        /// Enables startup catch-up for sources with a query address.
        #[arg(long)]
        live_map: Option<String>,
    },

    /// Create or update the registry entry for a log file.
    ///
    /// The source id is the file name without extension, the same id file
    /// events resolve to.
    Register {
        /// Log file to tail.
        #[arg(short, long)]
        path: Utf8PathBuf,

        /// Address used for liveness queries during catch-up.
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Print the persisted state of every registered source.
    Status {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = StatusFormat::Text)]
        format: StatusFormat,
    },

    /// Reset a source's offset and creation marker.
    Reset {
        /// Source id to reset.
        id: String,
    },
}

/// Status output format.
#[derive(Clone, Copy, ValueEnum)]
enum StatusFormat {
    /// Human-readable table.
    Text,
    /// JSON array of source states.
    Json,
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Line applier that emits each line as a tracing event.
struct TracingApplier;

#[async_trait]
impl LineApplier for TracingApplier {
    async fn apply(&self, ctx: &ApplyContext, line: &str) -> Result<(), ApplyError> {
        info!(
            target: "logtail::line",
            source = %ctx.source_id,
            catchup = ctx.is_catchup(),
            "{line}"
        );
        Ok(())
    }
}

/// Liveness probe reporting a fixed map for every address.
struct StaticStatusProbe {
    map: String,
}

#[async_trait]
impl LivenessProbe for StaticStatusProbe {
    async fn query(&self, _address: &str) -> Result<ServerStatus, ProbeError> {
        Ok(ServerStatus::with_map(self.map.clone()))
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the optional config file and CLI overrides.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(state) = &cli.state {
        config.state_path.clone_from(state);
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(config: &Config) -> color_eyre::Result<JsonFileStateStore> {
    JsonFileStateStore::open(config.state_path.clone())
        .await
        .wrap_err_with(|| format!("Failed to open state file {}", config.state_path))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the watcher until Ctrl-C or SIGTERM.
async fn run_watch(
    config: Config,
    paths: &[Utf8PathBuf],
    live_map: Option<String>,
) -> color_eyre::Result<()> {
    let store = Arc::new(open_store(&config).await?);
    let registered = store.list().await?;
    if registered.is_empty() {
        warn!(state = %config.state_path, "No sources registered, nothing will be ingested");
    }

    let mut builder = Watcher::builder(
        config,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(TracingApplier),
    );
    if let Some(map) = live_map {
        builder = builder.catchup(
            Arc::new(StaticStatusProbe { map }),
            Arc::new(MemorySessionRepository::new()),
        );
    }
    let mut watcher = builder.build()?;

    watcher.on_source_active(|source| info!(source = %source, "Server is producing log output"));
    watcher.on_source_inactive(|source| info!(source = %source, "Server went quiet"));

    for path in paths {
        watcher.add_path(path)?;
    }
    watcher.start().await?;

    // Prime every registered source so first contact happens now rather
    // than at its next write.
    for state in registered.iter().filter(|s| s.path.exists()) {
        watcher.dispatch(state.path.clone())?;
    }

    wait_for_shutdown().await?;
    watcher.stop().await;
    Ok(())
}

async fn wait_for_shutdown() -> color_eyre::Result<()> {
    // Handle SIGTERM for graceful shutdown on Unix
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

/// Creates or updates a registry entry, keeping any existing cursor.
async fn run_register(
    config: &Config,
    path: Utf8PathBuf,
    address: Option<String>,
) -> color_eyre::Result<()> {
    let source = SourceId::from_path(&path)
        .ok_or_else(|| eyre!("Cannot derive a source id from {path}"))?;

    let store = open_store(config).await?;
    let mut state = store
        .load(&source)
        .await?
        .unwrap_or_else(|| SourceWatchState::new(source.clone(), path.clone()));
    state.path = path;
    if address.is_some() {
        state.query_address = address;
    }
    store.save(&state).await?;

    info!(source = %source, path = %state.path, "Source registered");
    Ok(())
}

/// Prints every registry entry.
async fn run_status(config: &Config, format: StatusFormat) -> color_eyre::Result<()> {
    let store = open_store(config).await?;
    let states = store.list().await?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match format {
        StatusFormat::Json => {
            writeln!(handle, "{}", serde_json::to_string_pretty(&states)?)?;
        }
        StatusFormat::Text => print_status_table(&mut handle, &states)?,
    }
    Ok(())
}

/// Resets a source's cursor in the state file.
async fn run_reset(config: &Config, id: String) -> color_eyre::Result<()> {
    let source = SourceId::new(id);
    let store = open_store(config).await?;
    let mut state = store
        .load(&source)
        .await?
        .ok_or_else(|| eyre!("No registry entry for source '{source}'"))?;

    let previous = state.offset;
    state.reset();
    store.save(&state).await?;

    info!(source = %source, previous_offset = previous, "Source reset");
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_status_table(out: &mut impl Write, states: &[SourceWatchState]) -> std::io::Result<()> {
    if states.is_empty() {
        return writeln!(out, "No sources registered.");
    }

    writeln!(out, "{:<20} {:>12} {:<20} {:<22} PATH", "SOURCE", "OFFSET", "CREATED", "ADDRESS")?;
    for state in states {
        let created = state
            .creation_marker
            .map_or_else(|| "-".to_owned(), |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string());
        writeln!(
            out,
            "{:<20} {:>12} {:<20} {:<22} {}",
            state.source_id,
            state.offset,
            created,
            state.query_address.as_deref().unwrap_or("-"),
            state.path
        )?;
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    let config = build_config(&cli)?;
    match cli.command {
        Commands::Run { watch, live_map } => run_watch(config, &watch, live_map).await,
        Commands::Register { path, address } => {
            run_register(&config, path, address).await
        }
        Commands::Status { format } => run_status(&config, format).await,
        Commands::Reset { id } => run_reset(&config, id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_requires_watch_path() {
        assert!(Cli::try_parse_from(["logtail", "run"]).is_err());

        let cli = Cli::try_parse_from([
            "logtail", "run", "--watch", "/srv/logs", "-w", "/srv/more", "--live-map", "Town",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { watch, live_map } => {
                assert_eq!(watch, vec!["/srv/logs", "/srv/more"]);
                assert_eq!(live_map.as_deref(), Some("Town"));
            }
            _ => unreachable!("parsed a different subcommand"),
        }
    }

    #[test]
    fn test_register_derives_id_from_path() {
        assert!(
            Cli::try_parse_from([
                "logtail", "register", "--path", "/srv/logs/a.log", "--id", "other",
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from(["logtail", "register", "-p", "/srv/logs/a.log"]).unwrap();
        match cli.command {
            Commands::Register { path, address } => {
                assert_eq!(SourceId::from_path(&path), Some(SourceId::new("a")));
                assert!(address.is_none());
            }
            _ => unreachable!("parsed a different subcommand"),
        }
    }

    #[test]
    fn test_status_table_empty() {
        let mut out = Vec::new();
        print_status_table(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No sources registered.\n");
    }

    #[test]
    fn test_status_table_rows() {
        let mut state = SourceWatchState::new(SourceId::new("server-1"), "/srv/logs/server-1.log")
            .with_query_address("127.0.0.1:27015");
        state.offset = 4096;

        let mut out = Vec::new();
        print_status_table(&mut out, &[state]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();

        assert!(text.starts_with("SOURCE"));
        assert!(row.starts_with("server-1"));
        assert!(row.contains("4096"));
        assert!(row.contains("127.0.0.1:27015"));
        assert!(row.ends_with("/srv/logs/server-1.log"));
    }
}
