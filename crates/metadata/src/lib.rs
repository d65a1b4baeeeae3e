//! Session store and file registry for the hoist upload pipeline.
//!
//! This crate holds the control-plane persistence:
//! - The [`SessionStore`] contract: TTL-bounded upload session records with
//!   compare-and-swap writes
//! - The [`FileRegistry`] contract: one durable record per confirmed upload
//! - An in-memory provider for tests and single-process deployments
//! - A SQLite provider for durable deployments

pub mod error;
pub mod memory;
pub mod registry;
pub mod sqlite;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use memory::MemoryStore;
pub use registry::FileRegistry;
pub use sqlite::SqliteStore;
pub use store::SessionStore;
