pub mod api;

pub use bugtrack_core::{db, error, models, roles};
