//! LVS Core - Shared error and configuration types
//!
//! This crate provides:
//! - The error type every control-plane crate returns
//! - Typed configuration lookups with defaults
//! - A safe parser for list-valued options

pub mod config;
pub mod error;

pub use config::{parse_string_list, ConfigSection, ExecutorConfig, MonitorConfig};
pub use error::{LvsError, Result};
