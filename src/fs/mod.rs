//! Filesystem traversal helpers

pub mod walker;

pub use walker::{DirectoryWalker, WalkEntry};
