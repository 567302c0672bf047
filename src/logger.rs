//! Logging initialization.
//!
//! `LoggerManager` validates the logging configuration and installs the
//! global `tracing` subscriber: a console layer in one of three formats
//! and, optionally, a systemd journald layer. `RUST_LOG` takes precedence
//! over the configured level.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_warn,
};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Errors during logger configuration or initialization.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Validation errors from the logger configuration struct.
    #[error("logger configuration validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// IO error, typically while opening the journald socket.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// No output layers were successfully configured.
    #[error("no logging layers were configured or successfully initialized")]
    NoLayersConfigured,
}

/// Builds and installs the global tracing subscriber.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Validates the configuration and prepares the manager.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Must be called once, before any
    /// tracing macro fires.
    pub fn init(&self) -> Result<(), LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let Some(console) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(self.console_layer(console));
        }

        if let Some(journald) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match tracing_journald::layer() {
                Ok(layer) => {
                    layers.push(layer.with_filter(self.filter()).boxed());
                }
                Err(e) => {
                    // Not fatal while another output exists; the journal
                    // socket is simply absent outside systemd.
                    print_warn!(
                        "journald logger '{}' unavailable: {}",
                        journald.identifier,
                        e
                    );
                }
            }
        }

        if layers.is_empty() {
            return Err(LoggerError::NoLayersConfigured);
        }

        tracing_subscriber::registry().with(layers).init();
        Ok(())
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }

    fn console_layer(&self, config: &ConsoleConfig) -> BoxedLayer {
        let base = fmt::layer()
            .with_target(config.show_target)
            .with_ansi(config.ansi_colors)
            .with_writer(io::stdout);

        match config.format {
            LogFormat::Compact => base.compact().with_filter(self.filter()).boxed(),
            LogFormat::Pretty => base.pretty().with_filter(self.filter()).boxed(),
            LogFormat::Json => base.json().with_filter(self.filter()).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::logger::JournaldConfig;

    use super::*;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = LoggerConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(
            LoggerManager::new(config),
            Err(LoggerError::Validation(_))
        ));
    }

    #[test]
    fn everything_disabled_yields_no_layers() {
        let config = LoggerConfig {
            console: None,
            journald: Some(JournaldConfig {
                enabled: false,
                identifier: "templog".into(),
            }),
            ..Default::default()
        };

        let manager = LoggerManager::new(config).unwrap();
        assert!(matches!(
            manager.init(),
            Err(LoggerError::NoLayersConfigured)
        ));
    }
}
