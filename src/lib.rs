//! Modgate - A caching Go module proxy that serves modules straight from git
//!
//! Modgate speaks the Go module proxy protocol. Modules matching a configured
//! pattern are answered from a local cache of git working copies; every other
//! request is passed through to an upstream proxy.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, starts the server)
//! - [`server`] - HTTP routing, upstream passthrough and connection lifecycle
//! - [`proxy`] - The five protocol operations and their error categories
//! - [`module`] - Module discovery, version resolution and archive building
//! - [`cache`] - Repository resolution and per-root locked working copies
//! - [`core`] - Configuration, cache paths, module path types and versions
//! - [`git`] - Single interface for all Git operations
//!
//! # Correctness Invariants
//!
//! 1. A working copy is only touched while its root's lock is held
//! 2. Every operation sees the repository as of a fresh fetch
//! 3. An archive never contains files belonging to a nested module
//! 4. Requests for modules not served from source never touch the cache

pub mod cache;
pub mod cli;
pub mod core;
pub mod git;
pub mod module;
pub mod proxy;
pub mod server;

/// Identity sent on outbound discovery and git requests.
pub const CLIENT_IDENTITY: &str = concat!("modgate/", env!("CARGO_PKG_VERSION"));
