//! Inode-addressed virtual file tree for autotest scenarios, stored in SQLite.
//!
//! [`FileTree`] is the entry point. Each `(scope, scope_id)` pair owns one tree
//! with a single root directory; nodes are addressed by opaque inode strings.

pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod job;
pub mod job_manager;
pub mod naming;
pub mod node;
pub mod node_history;
pub mod node_meta;
mod schema;
pub mod snippet;
pub mod tree;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use error::{ErrorKind, FileTreeError};
pub use identity::Identity;
pub use tree::{FileTree, TreeSettings};
