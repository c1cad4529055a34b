//! clamscan exporter common types and errors.
//!
//! This crate provides foundational types shared by ce-core:
//! - The process-level error taxonomy
//! - Exporter configuration loading and validation

pub mod config;
pub mod error;

pub use config::{
    load_config, ConfigError, ConfigOverrides, ExporterConfig, ListenConfig, MetricsEndpointConfig,
};
pub use error::{format_error_human, Error, ErrorCategory, Result};
