#![allow(dead_code)]

use db_pipeline::{DatabaseConfig, Db, ExecContext, Statement, args};
use std::fmt;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub name: String,
}

/// Fresh SQLite database with an `accounts` table holding ids 1..=3.
///
/// Keep the `TempDir` alive for as long as the pool is used.
pub async fn seeded_db() -> (TempDir, Db) {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(&DatabaseConfig::sqlite(dir.path().join("pipeline.db")))
        .await
        .unwrap();

    db.exec(
        &ExecContext::new(),
        &mut [
            Statement::execute(
                "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
                args![],
            ),
            Statement::execute(
                "INSERT INTO accounts (id, name) VALUES (1, 'alice'), (2, 'bob'), (3, 'carol')",
                args![],
            ),
        ],
    )
    .await
    .unwrap();

    (dir, db)
}

pub async fn account_ids(db: &Db) -> Vec<i64> {
    let mut ids: Vec<(i64,)> = Vec::new();
    db.exec(
        &ExecContext::new(),
        &mut [Statement::fetch_all(
            &mut ids,
            "SELECT id FROM accounts ORDER BY id",
            args![],
        )],
    )
    .await
    .unwrap();
    ids.into_iter().map(|(id,)| id).collect()
}

#[derive(Debug, Clone, Default)]
pub struct RecordedEvent {
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl RecordedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Records every event emitted while installed.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventLog {
    /// Install as the thread's default subscriber until the guard is dropped.
    pub fn install() -> (Self, DefaultGuard) {
        let log = Self::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (log, guard)
    }

    pub fn count(&self, message: &str) -> usize {
        self.find(message).len()
    }

    /// Every recorded event with the given message, in emission order.
    pub fn find(&self, message: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    pub fn begins(&self) -> usize {
        self.count("Transaction started")
    }

    pub fn commits(&self) -> usize {
        self.count("Transaction committed")
    }

    pub fn rollbacks(&self) -> usize {
        self.count("Transaction rolled back")
    }

    pub fn executed(&self) -> usize {
        self.count("Statement executed")
    }

    pub fn failed(&self) -> usize {
        self.count("Statement failed")
    }
}

struct EventVisitor(RecordedEvent);

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.0.message = value;
        } else {
            self.0.fields.push((field.name().to_string(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor(RecordedEvent::default());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(visitor.0);
    }
}
