// # zoneplaned - zoneplane control-plane daemon
//
// Thin integration layer around zoneplane-core. All control-plane logic
// (validation, consistency, retries) lives in the core crate.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering stores and fabrics
// 4. Running the removal reconciler
// 5. Optionally serving JSON-lines API requests on stdin
//
// ## Configuration
//
// ### Store
// - `ZONEPLANE_STORE_TYPE`: memory, file (default: memory)
// - `ZONEPLANE_STORE_PATH`: data file (required for file)
//
// ### Network fabric
// - `ZONEPLANE_FABRIC_TYPE`: static, http (default: static)
// - `ZONEPLANE_FABRIC_URL`: base URL (required for http)
// - `ZONEPLANE_FABRIC_API_TOKEN`: bearer token (required for http)
// - `ZONEPLANE_FABRIC_TIMEOUT_SECS`: per-request timeout (default: 10)
//
// ### Control plane
// - `ZONEPLANE_MAX_RETRIES`: internal retries for transient failures
// - `ZONEPLANE_RETRY_DELAY_MS`: delay between retries
// - `ZONEPLANE_RECONCILE_INTERVAL_SECS`: reconciler tick
// - `ZONEPLANE_REMOVAL_SETTLE_SECS`: delay before removals complete
// - `ZONEPLANE_STDIN_API`: `true` to read one JSON request per stdin line
// - `ZONEPLANE_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export ZONEPLANE_STORE_TYPE=file
// export ZONEPLANE_STORE_PATH=/var/lib/zoneplane/data.json
// export ZONEPLANE_STDIN_API=true
//
// echo '{"instance_id":"i1","account_id":"a1","operation":"list_zones","params":{}}' | zoneplaned
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;
use zoneplane_core::{
    ApiResponse, BackendRegistry, ControlPlane, ControlPlaneApi, ControlPlaneConfig,
    ControlPlaneEvent, FabricConfig, Reconciler, RequestContext, StoreConfig,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes, following systemd conventions
#[derive(Debug, Clone, Copy)]
enum ZoneplaneExitCode {
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ZoneplaneExitCode> for ExitCode {
    fn from(code: ZoneplaneExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings read from the environment
struct Settings {
    store_type: String,
    store_path: Option<String>,
    fabric_type: String,
    fabric_url: Option<String>,
    fabric_api_token: Option<String>,
    fabric_timeout_secs: u64,
    max_retries: Option<usize>,
    retry_delay_ms: Option<u64>,
    reconcile_interval_secs: Option<u64>,
    removal_settle_secs: Option<u64>,
    stdin_api: bool,
    log_level: String,
}

impl Settings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_type: env::var("ZONEPLANE_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: env::var("ZONEPLANE_STORE_PATH").ok(),
            fabric_type: env::var("ZONEPLANE_FABRIC_TYPE")
                .unwrap_or_else(|_| "static".to_string()),
            fabric_url: env::var("ZONEPLANE_FABRIC_URL").ok(),
            fabric_api_token: env::var("ZONEPLANE_FABRIC_API_TOKEN").ok(),
            fabric_timeout_secs: parse_var("ZONEPLANE_FABRIC_TIMEOUT_SECS")?.unwrap_or(10),
            max_retries: parse_var("ZONEPLANE_MAX_RETRIES")?,
            retry_delay_ms: parse_var("ZONEPLANE_RETRY_DELAY_MS")?,
            reconcile_interval_secs: parse_var("ZONEPLANE_RECONCILE_INTERVAL_SECS")?,
            removal_settle_secs: parse_var("ZONEPLANE_REMOVAL_SETTLE_SECS")?,
            stdin_api: env::var("ZONEPLANE_STDIN_API")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_level: env::var("ZONEPLANE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Check ranges and build the core configuration
    fn into_config(self) -> Result<ControlPlaneConfig> {
        let mut config = ControlPlaneConfig::default();

        config.store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            "file" => match self.store_path {
                Some(path) if !path.is_empty() => StoreConfig::File { path },
                _ => anyhow::bail!(
                    "ZONEPLANE_STORE_PATH is required when ZONEPLANE_STORE_TYPE=file. \
                    Set it via: export ZONEPLANE_STORE_PATH=/var/lib/zoneplane/data.json"
                ),
            },
            other => anyhow::bail!(
                "ZONEPLANE_STORE_TYPE '{}' is not supported. Supported types: memory, file",
                other
            ),
        };

        config.fabric = match self.fabric_type.as_str() {
            "static" => FabricConfig::Static,
            "http" => {
                let (Some(base_url), Some(api_token)) = (self.fabric_url, self.fabric_api_token)
                else {
                    anyhow::bail!(
                        "ZONEPLANE_FABRIC_URL and ZONEPLANE_FABRIC_API_TOKEN are required \
                        when ZONEPLANE_FABRIC_TYPE=http"
                    );
                };
                FabricConfig::Http {
                    base_url,
                    api_token,
                    timeout_secs: self.fabric_timeout_secs,
                }
            }
            other => anyhow::bail!(
                "ZONEPLANE_FABRIC_TYPE '{}' is not supported. Supported types: static, http",
                other
            ),
        };

        if let Some(max_retries) = self.max_retries {
            if max_retries > 10 {
                anyhow::bail!("ZONEPLANE_MAX_RETRIES must be between 0 and 10. Got: {}", max_retries);
            }
            config.retry.max_retries = max_retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            if !(1..=60_000).contains(&delay) {
                anyhow::bail!("ZONEPLANE_RETRY_DELAY_MS must be between 1 and 60000. Got: {}", delay);
            }
            config.retry.retry_delay_ms = delay;
        }
        if let Some(interval) = self.reconcile_interval_secs {
            if !(1..=3600).contains(&interval) {
                anyhow::bail!(
                    "ZONEPLANE_RECONCILE_INTERVAL_SECS must be between 1 and 3600. Got: {}",
                    interval
                );
            }
            config.reconciler.interval_secs = interval;
        }
        if let Some(settle) = self.removal_settle_secs {
            config.reconciler.removal_settle_secs = settle;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number. Got: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ZoneplaneExitCode::ConfigError.into();
        }
    };

    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!(
                "ZONEPLANE_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            );
            return ZoneplaneExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr; stdout carries API responses.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZoneplaneExitCode::ConfigError.into();
    }

    let stdin_api = settings.stdin_api;
    let config = match settings.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration validation error: {}", e);
            return ZoneplaneExitCode::ConfigError.into();
        }
    };

    info!("Starting zoneplaned");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZoneplaneExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, stdin_api).await {
            error!("Daemon error: {}", e);
            ZoneplaneExitCode::RuntimeError
        } else {
            ZoneplaneExitCode::CleanShutdown
        }
    });

    result.into()
}

async fn run_daemon(config: ControlPlaneConfig, stdin_api: bool) -> Result<()> {
    let registry = BackendRegistry::with_builtin()?;

    #[cfg(feature = "http-fabric")]
    {
        info!("Registering HTTP network fabric");
        zoneplane_fabric_http::register(&registry)?;
    }

    info!(
        "Store: {}, fabric: {}",
        config.store.type_name(),
        config.fabric.type_name()
    );
    let store = registry.create_store(&config.store).await?;
    let fabric = registry.create_fabric(&config.fabric)?;

    let (plane, events) = ControlPlane::new(store, fabric, config)?;
    let plane = Arc::new(plane);
    tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let reconciler = Reconciler::new(Arc::clone(&plane));
    let reconciler_task =
        tokio::spawn(async move { reconciler.run_with_shutdown(Some(shutdown_rx)).await });

    if stdin_api {
        let api = ControlPlaneApi::new(Arc::clone(&plane));
        tokio::spawn(serve_stdin(api));
        info!("Serving JSON requests on stdin");
    }

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    // The reconciler may already be gone if it failed; nothing to stop then.
    let _ = shutdown_tx.send(());
    reconciler_task.await??;

    info!("zoneplaned stopped");
    Ok(())
}

/// Log every control-plane event
async fn log_events(mut events: mpsc::Receiver<ControlPlaneEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "control-plane event");
    }
}

/// One JSON request per line in, one JSON response per line out
async fn serve_stdin(api: ControlPlaneApi) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed, API input finished");
                return;
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str(&line) {
            Ok(raw) => api.handle_json(raw).await,
            Err(e) => {
                let err = zoneplane_core::Error::validation(format!("malformed JSON: {e}"));
                ApiResponse::from_error(&err, &RequestContext::new("", ""))
            }
        };
        match serde_json::to_string(&response) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode response: {}", e),
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Fallback for non-Unix platforms (SIGINT only)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
