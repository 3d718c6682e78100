//! # Datahub Core
//!
//! Shared building blocks for the Datahub services.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Identifier and password validation
//! - Logging initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod validation;

pub use config::{AuthConfig, Config, ConfigError, LogFormat, ServerConfig};
pub use validation::{PasswordPolicy, ValidationError};
