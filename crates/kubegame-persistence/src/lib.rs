//! kubegame-persistence: the backing store a World is persisted into.
//!
//! A [`StoreConnector`] turns a [`ConnectTarget`] (engine, host, port,
//! database, credentials) into a [`WorldStore`] handle. The only supported
//! engine is Postgres, reached through an sqlx pool. [`CachedConnector`]
//! keeps one handle per target across reconciliations and drops it when the
//! caller reports a store failure.
//!
//! # Architecture
//!
//! ```text
//! WorldReconciler
//!   └── CachedConnector (target key → Arc<dyn WorldStore>)
//!         └── PgConnector (PgPoolOptions → PgWorldStore)
//! ```
//!
//! [`memory`] provides in-process implementations of both traits for tests.

pub mod connector;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;

pub use connector::{CachedConnector, ConnectTarget, StoreConnector, StoreEngine};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConnector, MemoryWorldStore};
pub use postgres::{PgConnector, PgWorldStore};
pub use record::{InsertOutcome, WORLD_TABLE, WorldRecord, WorldStore};
