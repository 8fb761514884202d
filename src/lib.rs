//! Ordered SQL statement pipelines over a pooled connection.
//!
//! A pipeline is a slice of [`Statement`]s, each pairing a query and its
//! positional arguments with a [`Destination`] for the rows it returns.
//! [`Db::exec`] runs them in order on one connection; [`Db::exec_tx`] runs
//! them inside a transaction that commits only if every statement succeeds.
//!
//! Supported backends: SQLite, PostgreSQL, MySQL.

pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;

pub use cache::{Cache, CacheBackend, CacheError, CacheStore, MemoryStore, RedisStore};
pub use config::{AppConfig, DatabaseConfig, DatabaseType};
pub use context::{CancellationToken, ExecContext};
pub use db::{Db, DbPool, Destination, QueryParam, Statement};
pub use error::{DbError, DbResult, ErrorKind};
