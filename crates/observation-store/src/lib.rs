//! SQLite-backed observation history for recon projects.
//!
//! Two stores live side by side. The observation log (`scan_imports`,
//! `scan_import_intents`, `host_observations`, `port_observations`) is
//! insert-only and keyed by import. The current-state projection (`hosts`,
//! `ports`) is mutable and only answers "in scope now" and "open now".

mod error;
mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use open::Db;
