/*!
 * orbit-storage - storage command agent
 *
 * Serves the storage command catalogue over line-delimited JSON-RPC on
 * stdin/stdout. When endpoint and credentials are given on the command line
 * the agent connects before it starts serving.
 */

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use orbit_storage::{
    command::Dispatcher,
    config::{ConnectionConfig, LogLevel, LoggingConfig, DEFAULT_PORT},
    logging,
    protocol::s3::{
        batch::{BatchConfig, DEFAULT_MAX_CONCURRENT, MAX_CONCURRENT_LIMIT},
        S3Connector,
    },
    server::Server,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "orbit-storage")]
#[command(version, about = "Object storage command agent for S3-compatible servers", long_about = None)]
struct Cli {
    /// Storage server host name or IP (no scheme)
    #[arg(long, value_name = "HOST")]
    endpoint: Option<String>,

    /// Storage server port
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Access key
    #[arg(long, value_name = "KEY", env = "ORBIT_STORAGE_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Secret key
    #[arg(long, value_name = "SECRET", env = "ORBIT_STORAGE_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Connect over HTTPS
    #[arg(
        long,
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    use_ssl: bool,

    /// Region used for request signing
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    verbose: bool,

    /// Maximum concurrent items per batch command
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CONCURRENT, value_parser = parse_max_concurrent)]
    max_concurrent: usize,
}

impl Cli {
    /// Connection parameters, when the minimum set was supplied
    fn startup_connection(&self) -> Option<serde_json::Value> {
        let (endpoint, access_key, secret_key) = (
            self.endpoint.as_ref()?,
            self.access_key.as_ref()?,
            self.secret_key.as_ref()?,
        );

        let mut raw = json!({
            "endPoint": endpoint,
            "port": self.port,
            "useSSL": self.use_ssl,
            "accessKey": access_key,
            "secretKey": secret_key,
        });
        if let Some(region) = &self.region {
            raw["region"] = json!(region);
        }
        Some(raw)
    }

    fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            log_level: self.log_level,
            log_file: self.log_file.clone(),
            verbose: self.verbose,
        }
    }
}

fn parse_max_concurrent(s: &str) -> std::result::Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if (1..=MAX_CONCURRENT_LIMIT).contains(&value) {
        Ok(value)
    } else {
        Err(format!("must be between 1 and {}", MAX_CONCURRENT_LIMIT))
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(&cli.logging_config()) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(cli))
}

async fn serve(cli: Cli) -> Result<()> {
    let dispatcher = Dispatcher::new(Arc::new(S3Connector))
        .with_batch_config(BatchConfig::new(cli.max_concurrent));

    match cli.startup_connection() {
        Some(raw) => auto_connect(&dispatcher, &raw).await,
        None => info!("orbit-storage started (not connected)"),
    }

    let server = Server::new(dispatcher);
    server
        .serve_stdio()
        .await
        .context("Request loop failed")?;
    Ok(())
}

/// Connect from startup flags; failure is logged and serving continues
async fn auto_connect(dispatcher: &Dispatcher, raw: &serde_json::Value) {
    let config = match ConnectionConfig::from_value(raw) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid startup connection parameters");
            info!("orbit-storage started (not connected)");
            return;
        }
    };

    match dispatcher.connect(config).await {
        Ok(address) => info!(address = %address, "orbit-storage started and connected"),
        Err(e) => {
            error!(error = %e, "Automatic connect failed");
            info!("orbit-storage started (not connected)");
        }
    }
}
