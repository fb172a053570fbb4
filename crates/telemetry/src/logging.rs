use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Dependencies that are noisy at `info`
const QUIET_TARGETS: [&str; 3] = ["hyper=warn", "sqlx=warn", "ort=warn"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse log format from environment variable
    pub fn from_env() -> Self {
        Self::parse(&env::var("LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => Self::default(),
        }
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log output format (pretty/compact/json)
    pub format: LogFormat,
    /// Service name (e.g., "vehicle-service")
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (dev/staging/production)
    pub environment: String,
    /// Enable span events (enter/exit/close)
    pub enable_span_events: bool,
    /// Log to file in addition to stdout
    pub log_to_file: bool,
    /// Log file directory
    pub log_dir: Option<String>,
}

impl LogConfig {
    /// Create a new log configuration with sensible defaults
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: env::var("SERVICE_VERSION").unwrap_or_else(|_| "0.1.0".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            enable_span_events: env::var("LOG_SPAN_EVENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_to_file: env::var("LOG_TO_FILE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: env::var("LOG_DIR").ok(),
        }
    }

    /// Set the log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Enable span events (enter/exit/close)
    pub fn with_span_events(mut self, enable: bool) -> Self {
        self.enable_span_events = enable;
        self
    }

    /// Enable logging to file
    pub fn with_file_logging(mut self, log_dir: impl Into<String>) -> Self {
        self.log_to_file = true;
        self.log_dir = Some(log_dir.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initialize structured logging with the given configuration.
///
/// When file logging is enabled the returned guard must be held for the
/// lifetime of the process, dropping it stops the background writer.
pub fn init_structured_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let stdout_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(config.span_events())
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(config.span_events())
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(config.span_events())
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .boxed(),
    };

    let mut guard = None;
    let file_layer = match (config.log_to_file, config.log_dir.as_deref()) {
        (true, Some(log_dir)) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .json()
                    .with_span_events(config.span_events())
                    .with_writer(non_blocking),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        environment = %config.environment,
        format = ?config.format,
        file_logging = guard.is_some(),
        "structured logging initialized"
    );

    guard
}

/// Initialize logging with simple defaults
pub fn init() {
    // No file layer without a service name, so there is no guard to keep
    let _ = init_structured_logging(LogConfig::new("unknown-service"));
}

/// Initialize logging with service name
pub fn init_with_service(service_name: impl Into<String>) -> Option<WorkerGuard> {
    init_structured_logging(LogConfig::new(service_name))
}
