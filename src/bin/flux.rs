//! Flux CLI - Command-line interface for Funnel Flux
//!
//! Commands:
//! - funnel: Funnel conversion for a step list
//! - dropoff: Last-step-reached attribution for a step list
//! - paths: Most common session paths
//! - time: Time-to-complete between two events
//! - counts: Event frequencies (or the error event count)
//! - snapshot: Compose a tenant snapshot, optionally appending it to a history file
//! - compare: Diff the two most recent snapshots in a history file

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use funnel_flux::analysis::DEFAULT_PATH_DEPTH;
use funnel_flux::snapshot::DEFAULT_HISTORY_WINDOW;
use funnel_flux::store::{parse_definitions, parse_event_array, parse_ndjson, DEFAULT_SCAN_BATCH};
use funnel_flux::{
    AnalyticsError, DropoffAttributor, EventCounter, FunnelMatcher, IntervalTimer, MemoryStore,
    PathSummarizer, SnapshotComposer, SnapshotConfig, SnapshotHistory, FLUX_VERSION, PRODUCER_NAME,
};

/// Flux - Streaming, session-scoped behavioral analytics
#[derive(Parser)]
#[command(name = "flux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Funnel, drop-off, path and timing analytics over event logs", long_about = None)]
struct Cli {
    /// Restrict analysis to one tenant (API key)
    #[arg(long, global = true, env = "FLUX_TENANT")]
    tenant: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "json-pretty")]
    output_format: OutputFormat,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where events are read from
#[derive(Args)]
struct EventInput {
    /// Event file path (use - for stdin)
    #[arg(short, long, env = "FLUX_EVENTS")]
    events: PathBuf,

    /// Input format
    #[arg(long, default_value = "ndjson")]
    input_format: InputFormat,

    /// Rows fetched per cursor batch
    #[arg(long, env = "FLUX_BATCH_SIZE", default_value_t = DEFAULT_SCAN_BATCH)]
    batch_size: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Funnel conversion for an ordered step list
    Funnel {
        #[command(flatten)]
        input: EventInput,

        /// Ordered steps, comma separated
        #[arg(long, required = true, value_delimiter = ',')]
        steps: Vec<String>,
    },

    /// Sessions attributed to the last funnel step they reached
    Dropoff {
        #[command(flatten)]
        input: EventInput,

        /// Ordered steps, comma separated
        #[arg(long, required = true, value_delimiter = ',')]
        steps: Vec<String>,
    },

    /// Most common session paths
    Paths {
        #[command(flatten)]
        input: EventInput,

        /// Events kept per path
        #[arg(long, default_value_t = DEFAULT_PATH_DEPTH)]
        max_depth: usize,
    },

    /// Time from the first start event to the first end event after it
    Time {
        #[command(flatten)]
        input: EventInput,

        /// Event opening the interval
        #[arg(long)]
        start: String,

        /// Event closing the interval
        #[arg(long)]
        end: String,
    },

    /// Event counts by name
    Counts {
        #[command(flatten)]
        input: EventInput,

        /// Only count events whose name contains "error"
        #[arg(long)]
        errors: bool,
    },

    /// Compose a snapshot of every tracked metric for --tenant
    Snapshot {
        #[command(flatten)]
        input: EventInput,

        /// Funnel definitions file (JSON array)
        #[arg(short, long, env = "FLUX_DEFINITIONS")]
        definitions: PathBuf,

        /// Snapshot configuration file (JSON)
        #[arg(long, env = "FLUX_CONFIG")]
        config: Option<PathBuf>,

        /// Analyze at most this many funnels
        #[arg(long)]
        max_funnels: Option<usize>,

        /// Skip path summarization
        #[arg(long)]
        no_paths: bool,

        /// Skip drop-off rates
        #[arg(long)]
        no_dropoffs: bool,

        /// Skip time-to-complete
        #[arg(long)]
        no_time: bool,

        /// Skip the error event count
        #[arg(long)]
        no_errors: bool,

        /// Append the snapshot to this history file (created if missing)
        #[arg(long, env = "FLUX_HISTORY")]
        history: Option<PathBuf>,

        /// Snapshots kept per tenant in the history file
        #[arg(long, default_value_t = DEFAULT_HISTORY_WINDOW)]
        history_window: usize,
    },

    /// Compare the two most recent snapshots of --tenant
    Compare {
        /// History file written by `flux snapshot --history`
        #[arg(long, env = "FLUX_HISTORY")]
        history: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr log subscriber; RUST_LOG takes precedence
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "funnel_flux=debug,flux=debug"
    } else {
        "funnel_flux=info,flux=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    let tenant = cli.tenant.as_deref();
    let format = &cli.output_format;

    match cli.command {
        Commands::Funnel { input, steps } => {
            let store = load_events(&input)?;
            emit(&FunnelMatcher::run(&store, &steps, tenant)?, format)
        }

        Commands::Dropoff { input, steps } => {
            let store = load_events(&input)?;
            emit(&DropoffAttributor::run(&store, &steps, tenant)?, format)
        }

        Commands::Paths { input, max_depth } => {
            let store = load_events(&input)?;
            emit(&PathSummarizer::run(&store, max_depth, tenant)?, format)
        }

        Commands::Time { input, start, end } => {
            let store = load_events(&input)?;
            emit(&IntervalTimer::run(&store, &start, &end, tenant)?, format)
        }

        Commands::Counts { input, errors } => {
            let store = load_events(&input)?;
            if errors {
                let error_count = EventCounter::count_errors(&store, tenant)?;
                emit(&serde_json::json!({ "error_count": error_count }), format)
            } else {
                emit(&EventCounter::count_by_name(&store, tenant)?, format)
            }
        }

        Commands::Snapshot {
            input,
            definitions,
            config,
            max_funnels,
            no_paths,
            no_dropoffs,
            no_time,
            no_errors,
            history,
            history_window,
        } => {
            let tenant = tenant.ok_or(FluxCliError::MissingTenant)?;

            let mut snapshot_config = match config {
                Some(path) => SnapshotConfig::from_json(&fs::read_to_string(path)?)?,
                None => SnapshotConfig::default(),
            };
            snapshot_config.include_paths &= !no_paths;
            snapshot_config.include_dropoffs &= !no_dropoffs;
            snapshot_config.include_time &= !no_time;
            snapshot_config.include_error_count &= !no_errors;
            if max_funnels.is_some() {
                snapshot_config.max_funnels = max_funnels;
            }

            let mut store = load_events(&input)?;
            for definition in parse_definitions(&fs::read_to_string(&definitions)?)? {
                store.add_definition(definition);
            }

            let snapshot = SnapshotComposer::new(&store, &store)
                .with_config(snapshot_config)
                .compose(tenant)?;

            if let Some(path) = history {
                let mut stored = load_history(&path, history_window)?;
                let id = stored.record(snapshot.clone()).id;
                fs::write(&path, stored.to_json()?)?;
                info!(%id, path = %path.display(), "snapshot appended to history");
            }

            emit(&snapshot, format)
        }

        Commands::Compare { history } => {
            let tenant = tenant.ok_or(FluxCliError::MissingTenant)?;
            let stored = SnapshotHistory::from_json(&fs::read_to_string(&history)?)?;
            emit(&stored.compare_latest(tenant)?, format)
        }
    }
}

fn load_events(input: &EventInput) -> Result<MemoryStore, FluxCliError> {
    let data = read_input(&input.events)?;
    let records = match input.input_format {
        InputFormat::Ndjson => parse_ndjson(&data)?,
        InputFormat::Json => parse_event_array(&data)?,
    };

    if records.is_empty() {
        return Err(FluxCliError::NoEvents);
    }

    let mut store = MemoryStore::with_batch_size(input.batch_size);
    store.ingest_records(records);
    debug!(events = store.len(), producer = PRODUCER_NAME, "events loaded");
    Ok(store)
}

fn read_input(path: &Path) -> Result<String, FluxCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Open a history file, starting an empty history when it does not exist yet
fn load_history(path: &Path, window: usize) -> Result<SnapshotHistory, FluxCliError> {
    if !path.exists() {
        return Ok(SnapshotHistory::new(window));
    }
    Ok(SnapshotHistory::from_json(&fs::read_to_string(path)?)?)
}

fn emit<T: Serialize>(value: &T, format: &OutputFormat) -> Result<(), FluxCliError> {
    let output = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{}", output);
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    NoEvents,
    MissingTenant,
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<AnalyticsError> for FluxCliError {
    fn from(e: AnalyticsError) -> Self {
        FluxCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Analytics(e) => analytics_error(e),
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FluxCliError::MissingTenant => CliError {
                code: "MISSING_TENANT".to_string(),
                message: "This command needs a tenant".to_string(),
                hint: Some("Pass --tenant or set FLUX_TENANT".to_string()),
            },
        }
    }
}

fn analytics_error(e: AnalyticsError) -> CliError {
    let (code, hint) = match &e {
        AnalyticsError::Store(_) => ("STORE_ERROR", "Check the event source and retry"),
        AnalyticsError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
        AnalyticsError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
        AnalyticsError::ParseError(_) => (
            "PARSE_ERROR",
            "Each line needs session_id, event_name and timestamp_ms",
        ),
        AnalyticsError::InvalidDefinition(_) => (
            "INVALID_DEFINITION",
            "Every funnel definition needs at least one step",
        ),
        AnalyticsError::NotEnoughHistory(_) => (
            "NOT_ENOUGH_HISTORY",
            "Run 'flux snapshot --history' at least twice first",
        ),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint.to_string()),
    }
}
