//! db-pipeline - demo entry point.
//!
//! Loads the configuration, opens the configured database and runs a few
//! statement pipelines plus a cache round trip against it.

use clap::Parser;
use db_pipeline::config::Cli;
use db_pipeline::{AppConfig, Cache, Db, DbResult, ExecContext, Statement, args, logging};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
struct DemoItem {
    id: i64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match cli.load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Usage: db-pipeline --config <file>");
            eprintln!("       db-pipeline --consul-addr <host:port> --consul-key <key>");
            eprintln!("Override any setting with DB_PIPELINE__<SECTION>__<KEY>, e.g.");
            eprintln!("  DB_PIPELINE__DATABASE__HOST=db.internal db-pipeline");
            return Err(e.into());
        }
    };
    cli.apply(&mut config);
    logging::init(&config.log)?;

    info!(
        driver = %config.database.driver,
        "Starting db-pipeline v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Db::open(&config.database).await?;
    let result = run(&db, &config).await;
    db.close().await;

    if let Err(e) = result {
        error!(error = %e, "Demo failed");
        return Err(e.into());
    }
    info!("Demo finished");
    Ok(())
}

async fn run(db: &Db, config: &AppConfig) -> DbResult<()> {
    let ctx = ExecContext::for_request(Some("demo"), Some(concat!("db-pipeline/", env!("CARGO_PKG_VERSION"))))
        .with_timeout(Duration::from_secs(30));
    let driver = db.db_type();
    let (p1, p2) = (driver.placeholder(1), driver.placeholder(2));

    db.exec(
        &ctx,
        &mut [Statement::execute(
            "CREATE TABLE IF NOT EXISTS demo_items (id BIGINT PRIMARY KEY, name TEXT NOT NULL)",
            args![],
        )],
    )
    .await?;

    // Write a row and read it back inside one transaction.
    let mut written: Option<DemoItem> = None;
    db.exec_tx(
        &ctx,
        &mut [
            Statement::execute(format!("DELETE FROM demo_items WHERE id = {p1}"), args![1]),
            Statement::execute(
                format!("INSERT INTO demo_items (id, name) VALUES ({p1}, {p2})"),
                args![1, "widget"],
            ),
            Statement::fetch_one(
                &mut written,
                format!("SELECT id, name FROM demo_items WHERE id = {p1}"),
                args![1],
            )
            .debug(),
        ],
    )
    .await?;
    info!(item = ?written, "Transaction committed");

    let mut items: Vec<DemoItem> = Vec::new();
    db.exec(
        &ctx,
        &mut [Statement::fetch_all(
            &mut items,
            "SELECT id, name FROM demo_items ORDER BY id",
            args![],
        )],
    )
    .await?;
    info!(count = items.len(), "Items loaded");

    let cache = Cache::open(&config.cache).await?;
    cache.set("demo_items", &items, None).await?;
    let cached: Vec<DemoItem> = cache.get("demo_items").await?;
    info!(key = %cache.key("demo_items"), count = cached.len(), "Cache round trip");
    cache.close().await?;

    Ok(())
}
