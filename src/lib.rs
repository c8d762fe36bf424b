//! Purpose: Embedded single-file JSON key-value store with deferred commits.
//! Exports: `Store`, `Scan`, `Key`, `Error`, `ErrorKind`.
//! Role: Library crate for embedding; no CLI or network surface.
//! Invariants: All engine access is serialized behind one store-wide lock.
//! Invariants: An open scan excludes every other store operation until dropped.
pub mod engine;
pub mod error;
pub mod key;
pub mod schedule;
pub mod stamp;
pub mod store;

pub use error::{Error, ErrorKind};
pub use key::Key;
pub use store::{Scan, Store};
