//! `store` crate — the persistence contract the engine depends on.
//!
//! `contract::Store` is the only interface the rest of the engine talks to.
//! Two backends satisfy it: [`file::FileStore`], a single-document
//! JSON file chosen automatically when no database is configured, and
//! (behind the `postgres` feature) [`postgres::PostgresStore`]. The engine
//! must behave identically regardless of which one is plugged in.

pub mod contract;
pub mod error;
pub mod file;
pub mod models;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use contract::{ColumnSet, Row, Store, Table, Where};
pub use error::StoreError;
pub use file::FileStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
