//! SQLite backends for the sponsor directory and the target store.
//!
//! Targets live in a relational `employers` table. Sponsors live in a
//! document table: one JSON body per sponsor, queried with SQLite's JSON
//! functions. Both wrap [`tokio_rusqlite`] so all database access runs on a
//! dedicated thread without blocking the async runtime.

mod encode;
mod schema;
mod sponsor;
mod target;

pub mod error;

pub use error::{Error, Result};
pub use sponsor::SqliteSponsorStore;
pub use target::SqliteTargetStore;
