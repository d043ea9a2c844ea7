//! module
//!
//! Modules inside a repository working copy.
//!
//! # Modules
//!
//! - [`descriptor`] - `go.mod` module directive parsing
//! - [`tree`] - Module discovery and version resolution
//! - [`archive`] - Versioned module zips and descriptors
//! - [`walk`] - Directory traversal shared by the above

pub mod archive;
pub mod descriptor;
pub mod tree;
pub mod walk;

pub use archive::{build_archive, read_descriptor, ArchiveError};
pub use descriptor::DescriptorError;
pub use tree::{Module, ModuleTree, ModuleVersion, TreeError};
