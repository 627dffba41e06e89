//! Core library for bugtrack.
//!
//! This crate provides the domain models, the role registry, and the
//! database operations for bugtrack, independent of any transport layer.
//!
//! # Usage
//!
//! ```no_run
//! use bugtrack_core::db::Database;
//! use bugtrack_core::models::*;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let users = db.list_users()?;
//! # Ok::<(), bugtrack_core::error::StoreError>(())
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod roles;

// Re-export commonly used types at crate root
pub use db::Database;
pub use error::StoreError;
pub use roles::Permission;
