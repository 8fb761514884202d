//! Declarative macros shared by the database layer.
//!
//! `impl_db_dispatch!` expands a match over the pool backends so each arm can
//! call concrete, backend-typed code; `args!` builds a statement's positional
//! argument list from heterogeneous values.

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Build a `Vec<QueryParam>` from values convertible into [`QueryParam`].
///
/// ```
/// use db_pipeline::{args, QueryParam};
///
/// let params = args![42, "alice", None::<i64>];
/// assert_eq!(params[1], QueryParam::String("alice".to_string()));
/// assert!(params[2].is_null());
/// ```
///
/// [`QueryParam`]: crate::db::params::QueryParam
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::db::params::QueryParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::db::params::QueryParam::from($value)),+]
    };
}

pub use impl_db_dispatch;
