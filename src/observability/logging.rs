//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Change the log level at runtime (control surface `/v1/loglevel`)
//!
//! # Design Decisions
//! - The level filter sits behind a `reload` layer so it can be swapped
//!   without rebuilding the subscriber
//! - Levels are the plain names `trace`, `debug`, `info`, `warn`, `error`,
//!   `off`; per-target directives are only honored from `RUST_LOG` at
//!   startup

use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Error)]
pub enum LogLevelError {
    #[error("not a valid log level: {0:?}")]
    Invalid(String),

    #[error("failed to apply log level: {0}")]
    Reload(#[from] reload::Error),

    #[error("invalid RUST_LOG directives: {0}")]
    Directives(#[from] ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

pub type FilterLayer = reload::Layer<EnvFilter, Registry>;

/// Reads and changes the active log level.
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    current: Arc<RwLock<String>>,
}

impl std::fmt::Debug for LogLevelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLevelHandle").field("level", &self.get()).finish()
    }
}

impl LogLevelHandle {
    pub fn get(&self) -> String {
        self.current
            .read()
            .map(|level| level.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, level: &str) -> Result<(), LogLevelError> {
        let level = parse_level(level)?;
        self.handle.reload(EnvFilter::new(&level))?;

        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(from = %current, to = %level, "Log level changed");
        *current = level;
        Ok(())
    }
}

fn parse_level(level: &str) -> Result<String, LogLevelError> {
    let normalized = level.trim().to_ascii_lowercase();
    if LOG_LEVELS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(LogLevelError::Invalid(level.to_string()))
    }
}

/// A reloadable level filter and the handle that controls it.
pub fn filter_layer(level: &str) -> Result<(FilterLayer, LogLevelHandle), LogLevelError> {
    let level = parse_level(level)?;
    let (layer, handle) = reload::Layer::new(EnvFilter::new(&level));
    Ok((
        layer,
        LogLevelHandle {
            handle,
            current: Arc::new(RwLock::new(level)),
        },
    ))
}

fn directives_layer(directives: &str) -> Result<(FilterLayer, LogLevelHandle), LogLevelError> {
    let (layer, handle) = reload::Layer::new(EnvFilter::try_new(directives)?);
    Ok((
        layer,
        LogLevelHandle {
            handle,
            current: Arc::new(RwLock::new(directives.to_string())),
        },
    ))
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(level: &str) -> Result<LogLevelHandle, LogLevelError> {
    let (filter, handle) = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => directives_layer(directives.trim())?,
        _ => filter_layer(level)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()?;
    Ok(handle)
}
