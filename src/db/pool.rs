//! Connection pool management.
//!
//! [`Db`] wraps a database-specific pool (MySqlPool, PgPool, SqlitePool) to
//! keep full type support, and is the entry point for running pipelines.

use crate::config::{DatabaseConfig, DatabaseType};
use crate::context::ExecContext;
use crate::db::executor;
use crate::db::statement::Statement;
use crate::error::{DbError, DbResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::pool::PoolOptions;
use sqlx::{Database, MySqlPool, PgPool, SqlitePool};
use std::str::FromStr;
use tracing::{Instrument, debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Shared handle to a connection pool.
///
/// Cloning is cheap; every clone uses the same pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: DbPool,
}

impl Db {
    /// Validate `config` and open a pool for it.
    pub async fn open(config: &DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let pool = create_pool(config).await?;
        info!(
            driver = %config.driver,
            database = %config.db_name,
            "Database pool opened"
        );
        Ok(Self { pool })
    }

    /// Wrap an already configured pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Run `statements` in order on one pooled connection, without a transaction.
    ///
    /// Stops at the first failing statement; statements before it keep their
    /// effects and results.
    pub async fn exec(&self, ctx: &ExecContext, statements: &mut [Statement<'_>]) -> DbResult<()> {
        let run = async {
            impl_db_dispatch!(&self.pool, {
                MySql(p) => executor::mysql::run(p, statements, ctx).await,
                Postgres(p) => executor::postgres::run(p, statements, ctx).await,
                SQLite(p) => executor::sqlite::run(p, statements, ctx).await,
            })
        };
        run.instrument(ctx.span().clone()).await
    }

    /// Run `statements` in order inside a single transaction.
    ///
    /// Commits if all succeed. Otherwise rolls back and returns the error of
    /// the first failing statement, or a rollback error carrying it.
    pub async fn exec_tx(
        &self,
        ctx: &ExecContext,
        statements: &mut [Statement<'_>],
    ) -> DbResult<()> {
        let run = async {
            impl_db_dispatch!(&self.pool, {
                MySql(p) => executor::mysql::run_in_transaction(p, statements, ctx).await,
                Postgres(p) => executor::postgres::run_in_transaction(p, statements, ctx).await,
                SQLite(p) => executor::sqlite::run_in_transaction(p, statements, ctx).await,
            })
        };
        run.instrument(ctx.span().clone()).await
    }

    /// Close the pool. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        self.pool.close().await;
        debug!(driver = %self.db_type(), "Database pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Create a connection pool for the given configuration.
async fn create_pool(config: &DatabaseConfig) -> DbResult<DbPool> {
    match config.driver {
        DatabaseType::MySQL => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .username(&config.user)
                .password(&config.password)
                .database(&config.db_name)
                .charset("utf8mb4");
            if let Some(port) = config.port_or_default() {
                options = options.port(port);
            }
            if let Some(mode) = &config.ssl_mode {
                let mode = MySqlSslMode::from_str(mode)
                    .map_err(|e| DbError::config(format!("Invalid MySQL ssl_mode '{}': {}", mode, e)))?;
                options = options.ssl_mode(mode);
            }

            let pool = tune(MySqlPoolOptions::new(), config)
                .connect_with(options)
                .await
                .map_err(|e| connect_error(config.driver, e))?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::PostgreSQL => {
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .username(&config.user)
                .password(&config.password)
                .database(&config.db_name);
            if let Some(port) = config.port_or_default() {
                options = options.port(port);
            }
            if let Some(mode) = &config.ssl_mode {
                let mode = PgSslMode::from_str(mode).map_err(|e| {
                    DbError::config(format!("Invalid PostgreSQL ssl_mode '{}': {}", mode, e))
                })?;
                options = options.ssl_mode(mode);
            }

            let pool = tune(PgPoolOptions::new(), config)
                .connect_with(options)
                .await
                .map_err(|e| connect_error(config.driver, e))?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::SQLite if config.db_name == ":memory:" => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::config(format!("Invalid SQLite options: {}", e)))?;

            // Every in-memory connection is its own database: pin exactly one.
            let pool = SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .max_lifetime(None)
                .idle_timeout(None)
                .connect_with(options)
                .await
                .map_err(|e| connect_error(config.driver, e))?;
            Ok(DbPool::SQLite(pool))
        }
        DatabaseType::SQLite => {
            let options = SqliteConnectOptions::new()
                .filename(&config.db_name)
                .create_if_missing(true);

            let pool = tune(SqlitePoolOptions::new(), config)
                .connect_with(options)
                .await
                .map_err(|e| connect_error(config.driver, e))?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

/// Apply the configured pool bounds. Unset values keep the sqlx defaults.
fn tune<DB: Database>(options: PoolOptions<DB>, config: &DatabaseConfig) -> PoolOptions<DB> {
    let options = match config.max_connections() {
        Some(max) => options.max_connections(max),
        None => options,
    };
    let warm = config.warm_connections().min(options.get_max_connections());
    options
        .min_connections(warm)
        .max_lifetime(config.max_lifetime())
        .idle_timeout(config.max_idle_time())
}

fn connect_error(db_type: DatabaseType, error: sqlx::Error) -> DbError {
    let suggestion = connection_suggestion(db_type, &error);
    DbError::connection(format!("Failed to connect: {}", error), suggestion)
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", db_type);
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password settings".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check the ssl_mode setting or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL | DatabaseType::MySQL => {
            format!("Verify host, port and db_name for {}", db_type)
        }
        DatabaseType::SQLite => {
            "Verify the db_name path is writable or use ':memory:'".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_open_in_memory_sqlite() {
        let db = Db::open(&DatabaseConfig::sqlite(":memory:")).await.unwrap();
        assert_eq!(db.db_type(), DatabaseType::SQLite);
        assert!(!db.is_closed());
        db.close().await;
        assert!(db.is_closed());
        db.close().await;
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let config = DatabaseConfig::new(DatabaseType::PostgreSQL, "");
        let err = Db::open(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_ssl_mode() {
        let mut config = DatabaseConfig::new(DatabaseType::PostgreSQL, "app");
        config.ssl_mode = Some("sometimes".to_string());
        let err = Db::open(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Protocol("connection refused".to_string());
        let suggestion = connection_suggestion(DatabaseType::MySQL, &err);
        assert!(suggestion.contains("MySQL"));
    }
}
