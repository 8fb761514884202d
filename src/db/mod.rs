//! Database abstraction layer.
//!
//! This module provides:
//! - Connection pool management ([`Db`], [`DbPool`])
//! - Statements and their result destinations
//! - Pipeline execution, with or without a transaction
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod destination;
mod executor;
pub mod params;
pub mod pool;
pub mod statement;

pub use destination::{DbRow, Destination, DestinationKind, FromDbRow, MultiSlot, SingleSlot};
pub use params::QueryParam;
pub use pool::{Db, DbPool};
pub use statement::Statement;
