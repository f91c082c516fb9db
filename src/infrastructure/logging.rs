//! Logging system configuration and initialization
//!
//! - Console output on stderr (stdout is left to command output)
//! - Optional daily-rolling file output, plain or JSON
//! - `RUST_LOG` overrides the configured level and module filters

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "catalog-reconciler.log";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the filter used when `RUST_LOG` is not set.
///
/// Dependencies are held at `warn`/`info` unless the configured level is
/// `trace`; `module_filters` entries are appended last.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut directives = vec![config.level.clone()];

    if !config.level.eq_ignore_ascii_case("trace") {
        directives.extend(
            ["reqwest=info", "hyper=warn", "hyper_util=warn", "h2=warn", "tokio=info", "runtime=warn"]
                .into_iter()
                .map(str::to_string),
        );
        directives.push(format!("catalog_reconciler_lib={}", config.level));
        directives.push(format!("catalog_reconciler={}", config.level));
    }

    let mut module_filters: Vec<_> = config.module_filters.iter().collect();
    module_filters.sort();
    directives.extend(module_filters.into_iter().map(|(module, level)| format!("{module}={level}")));

    EnvFilter::try_new(directives.join(","))
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", directives.join(","), e))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        let log_dir = config.log_directory();
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        cleanup_old_logs(&log_dir, config.max_files)?;

        let (file_writer, file_guard) = non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry is poisoned"))?
            .push(file_guard);

        let file_layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
    }

    if config.console_output {
        let console_layer = fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
            .with_target(false);
        layers.push(if config.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.boxed()
        });
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized (level {}, json {})", config.level, config.json_format);
    if config.file_output {
        info!("Log directory: {:?}", config.log_directory());
    }

    Ok(())
}

/// Delete the oldest rolled log files beyond `max_files`.
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|metadata| metadata.modified()) {
            log_files.push((path, modified));
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files as usize) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}
