/// Version injected at compile time via RESMODEL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("RESMODEL_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use resmodel::config::Config;
use resmodel::{Arg, CacheLookup, HttpTransport, ResourceRegistry};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Run actions against declaratively defined REST resources
#[derive(Parser, Debug)]
#[command(name = "resmodel", version, about, long_about = None)]
struct Args {
    /// Resource definitions file (.json, .yaml or .yml)
    #[arg(short, long)]
    definitions: Option<PathBuf>,

    /// Base URL for relative resource templates
    #[arg(short, long)]
    base_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Resource id from the definitions file
    resource: String,

    /// Action to run (get, query, save, remove, delete or a custom one)
    action: String,

    /// Request parameter as key=value; JSON values are parsed
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// JSON request body
    #[arg(long)]
    data: Option<String>,

    /// Go through the resource cache with this key (implies `get`)
    #[arg(short, long)]
    key: Option<String>,
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

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Keep `--param` values in the params slot even when the action takes a body
fn call_args(params: Value, data: Option<Value>, has_body: bool) -> Vec<Arg> {
    match (data, has_body) {
        (Some(body), _) => vec![Arg::Value(params), Arg::Value(body)],
        (None, true) => vec![Arg::Value(params), Arg::Value(Value::Null)],
        (None, false) => vec![Arg::Value(params)],
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

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

    tracing::info!("resmodel {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("resmodel").join("resmodel.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".resmodel").join("resmodel.log");
    }
    PathBuf::from("resmodel.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let output = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn run(args: Args) -> Result<Value> {
    // CLI > config file
    let config = Config::load();
    let definitions = args
        .definitions
        .or(config.definitions.clone())
        .ok_or_else(|| anyhow!("No definitions file given. Use --definitions or set it in the config file"))?;
    let base_url = args.base_url.or(config.base_url.clone());
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or_else(|| config.timeout());

    let mut transport = HttpTransport::new(base_url.as_deref(), Some(timeout))?;
    if let Some(token) = args.token.or(config.bearer_token.clone()) {
        transport = transport.with_bearer_token(token);
    }

    let registry = ResourceRegistry::from_file(&definitions, Arc::new(transport), config.cache_policy())?;
    let resource = registry.get(&args.resource).ok_or_else(|| {
        anyhow!(
            "Unknown resource '{}'. Available: {}",
            args.resource,
            registry.ids().join(", ")
        )
    })?;

    let params = Value::Object(args.params.into_iter().collect::<Map<_, _>>());

    if let Some(key) = args.key {
        if args.action != "get" {
            bail!("--key only works with the get action");
        }
        return match resource.get(&key, params)? {
            CacheLookup::Cached(instance) => Ok(instance.to_value()),
            lookup @ CacheLookup::Fetching(_) => {
                let pending = lookup.pending().ok_or_else(|| anyhow!("Request was not started"))?;
                Ok(pending.await?.to_value())
            }
        };
    }

    let data = args
        .data
        .map(|raw| serde_json::from_str::<Value>(&raw).context("--data is not valid JSON"))
        .transpose()?;
    let has_body = resource
        .resource()
        .action(&args.action)
        .is_some_and(|a| a.has_body());

    tracing::info!("Running {}.{}", args.resource, args.action);
    let output = resource
        .resource()
        .call(&args.action, call_args(params, data, has_body))?;
    let pending = output
        .pending()
        .ok_or_else(|| anyhow!("Request was not started"))?;
    Ok(pending.await?.to_value())
}
