//! Logging infrastructure - structured tracing through the marshaling core
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - A level filter overridable through `RUST_LOG`
//! - Span events for invocations (`invoke` span per call)
//! - Console output, optionally JSON, optionally mirrored to a file

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::{debug, Level};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the process lifetime
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path, if file output is wanted
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.is_empty() || v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // GIMARSHAL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("GIMARSHAL_LOG_LEVEL") {
            config.level = parse_level(&level);
        }

        if let Ok(path) = std::env::var("GIMARSHAL_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = env_flag("GIMARSHAL_LOG_JSON");
        config.show_spans = env_flag("GIMARSHAL_LOG_SPANS");

        config
    }

    /// Minimal logging, errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Verbose logging with span events
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("gimarshal={}", self.level.as_str().to_lowercase()))
        })
    }

    fn span_events(&self) -> FmtSpan {
        if self.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration. Later calls are no-ops.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        install(&config);
    });
}

/// Install the global subscriber; false when one is already in place
fn install(config: &LogConfig) -> bool {
    let console = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_span_events(config.span_events())
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(config.span_events())
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    let file = config.log_path.as_deref().and_then(file_layer);

    // A subscriber may already be installed by the embedding application
    match tracing_subscriber::registry()
        .with(config.filter())
        .with(console)
        .with(file)
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            debug!(event = "subscriber_not_installed", error = %err);
            false
        }
    }
}

fn file_layer<S>(path: &str) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let path = Path::new(path);
    let file_name = path.file_name()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    Some(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
    )
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}
