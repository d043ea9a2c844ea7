//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. Cloning, fetching, checkout
//! and tag inspection all flow through [`Git`]. No other module imports
//! `git2`, and nothing shells out to the git CLI outside of tests.
//!
//! # Responsibilities
//!
//! - Clone and open cached working copies
//! - Fetch branches and tags from `origin`, pruning deleted refs
//! - Detect the remote's default branch
//! - Forced, detached checkout of a branch tip or tag
//! - Tag enumeration and tag timestamps
//!
//! # Invariants
//!
//! - A [`Git`] handle is only used while the caller holds the root's lock
//! - Working copies always have exactly one remote, `origin`

mod interface;

pub use interface::{FetchSettings, Git, GitError, ORIGIN};
