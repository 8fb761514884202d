//! Statement pipeline execution.
//!
//! The executor runs an ordered slice of [`Statement`]s over one database
//! handle, either a pooled connection (`run`) or a transaction (`run_in_transaction`).
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL pipelines
//! - `postgres`: PostgreSQL pipelines
//! - `sqlite`: SQLite pipelines
//!
//! Each submodule provides identical functionality adapted to the database's
//! concrete pool, connection and row types.

use crate::context::ExecContext;
use crate::db::destination::{DbRow, Destination};
use crate::db::params::bind_params;
use crate::db::statement::Statement;
use crate::error::{DbError, DbResult};
use tracing::{debug, error, warn};

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below is generated from the same template. Only the pool,
// connection and row types differ.

macro_rules! backend_executor {
    ($module:ident, $pool:ty, $conn:ty, $row:ident) => {
        pub(crate) mod $module {
            use super::*;
            use sqlx::Statement as _;

            /// Run `statements` on a single connection checked out of `pool`.
            pub async fn run(
                pool: &$pool,
                statements: &mut [Statement<'_>],
                ctx: &ExecContext,
            ) -> DbResult<()> {
                let mut conn = ctx.guard("acquire", pool.acquire()).await??;
                run_pipeline(&mut *conn, statements, ctx).await
            }

            /// Run `statements` inside one transaction.
            ///
            /// Commits when every statement succeeds, otherwise rolls back and
            /// returns the pipeline error.
            pub async fn run_in_transaction(
                pool: &$pool,
                statements: &mut [Statement<'_>],
                ctx: &ExecContext,
            ) -> DbResult<()> {
                let mut tx = ctx
                    .guard("begin", pool.begin())
                    .await?
                    .map_err(DbError::begin)?;
                debug!(statements = statements.len(), "Transaction started");

                match run_pipeline(&mut *tx, statements, ctx).await {
                    Ok(()) => {
                        tx.commit().await.map_err(DbError::commit)?;
                        debug!("Transaction committed");
                        Ok(())
                    }
                    Err(original) => {
                        warn!(error = %original, "Pipeline failed, rolling back transaction");
                        match tx.rollback().await {
                            Ok(()) => {
                                debug!("Transaction rolled back");
                                Err(original)
                            }
                            Err(e) => {
                                error!(error = %e, original = %original, "Transaction rollback failed");
                                Err(DbError::rollback(e, original))
                            }
                        }
                    }
                }
            }

            async fn run_pipeline(
                conn: &mut $conn,
                statements: &mut [Statement<'_>],
                ctx: &ExecContext,
            ) -> DbResult<()> {
                for (index, statement) in statements.iter_mut().enumerate() {
                    match execute(conn, statement, ctx).await {
                        Ok(()) => {
                            debug!(
                                index,
                                destination = %statement.destination().kind(),
                                "Statement executed"
                            );
                            statement.log_debug(index);
                        }
                        Err(err) => {
                            statement.clear_destination();
                            warn!(index, error = %err, "Statement failed");
                            return Err(DbError::statement(index, err));
                        }
                    }
                }
                Ok(())
            }

            async fn execute(
                conn: &mut $conn,
                statement: &mut Statement<'_>,
                ctx: &ExecContext,
            ) -> DbResult<()> {
                let (sql, args, destination) = statement.parts_mut();

                let prepared = ctx
                    .guard("prepare", sqlx::Executor::prepare(&mut *conn, sql))
                    .await?
                    .map_err(DbError::preparation)?;

                let targets = match prepared.parameters() {
                    Some(sqlx::Either::Left(types)) => types,
                    _ => &[],
                };
                let query = bind_params(prepared.query(), args, targets)?;

                match destination {
                    Destination::None => {
                        let result = ctx.guard("execute", query.execute(&mut *conn)).await??;
                        debug!(rows_affected = result.rows_affected(), "Statement applied");
                    }
                    Destination::One(slot) => {
                        let row = ctx
                            .guard("fetch_one", query.fetch_optional(&mut *conn))
                            .await??
                            .ok_or(DbError::NotFound)?;
                        slot.store(DbRow::$row(row)).map_err(DbError::binding)?;
                    }
                    Destination::Many(slot) => {
                        let rows = ctx.guard("fetch_all", query.fetch_all(&mut *conn)).await??;
                        debug!(rows = rows.len(), "Rows fetched");
                        slot.store(rows.into_iter().map(DbRow::$row).collect())
                            .map_err(DbError::binding)?;
                    }
                }
                Ok(())
            }
        }
    };
}

backend_executor!(mysql, sqlx::MySqlPool, sqlx::MySqlConnection, MySql);
backend_executor!(postgres, sqlx::PgPool, sqlx::PgConnection, Postgres);
backend_executor!(sqlite, sqlx::SqlitePool, sqlx::SqliteConnection, SQLite);
