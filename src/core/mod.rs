//! core
//!
//! Domain types, configuration and storage paths.
//!
//! # Modules
//!
//! - [`types`] - Validated module paths and the protocol's case encoding
//! - [`version`] - Version tag syntax and precedence
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Cache directory layout

pub mod config;
pub mod paths;
pub mod types;
pub mod version;
