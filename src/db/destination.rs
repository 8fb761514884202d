//! Result destinations.
//!
//! A [`Destination`] says, up front, what a statement produces: nothing, at
//! most one record, or a sequence of records. The executor picks the fetch
//! strategy from the tag alone; it never inspects the target's runtime shape.

use sqlx::FromRow;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use std::fmt;

/// A row fetched from whichever backend the pool speaks.
pub enum DbRow {
    MySql(MySqlRow),
    Postgres(PgRow),
    SQLite(SqliteRow),
}

impl DbRow {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::MySql(_) => "mysql",
            Self::Postgres(_) => "postgres",
            Self::SQLite(_) => "sqlite",
        }
    }
}

// SqliteRow has no Debug impl.
impl fmt::Debug for DbRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DbRow").field(&self.backend()).finish()
    }
}

/// Records decodable from a row of every supported backend.
///
/// Blanket-implemented for anything deriving `sqlx::FromRow` (and for tuples
/// of decodable columns).
pub trait FromDbRow: Sized {
    fn from_db_row(row: &DbRow) -> Result<Self, sqlx::Error>;
}

impl<T> FromDbRow for T
where
    T: for<'r> FromRow<'r, MySqlRow> + for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow>,
{
    fn from_db_row(row: &DbRow) -> Result<Self, sqlx::Error> {
        match row {
            DbRow::MySql(r) => <T as FromRow<'_, MySqlRow>>::from_row(r),
            DbRow::Postgres(r) => <T as FromRow<'_, PgRow>>::from_row(r),
            DbRow::SQLite(r) => <T as FromRow<'_, SqliteRow>>::from_row(r),
        }
    }
}

/// Target for a statement that selects at most one row.
pub trait SingleSlot: Send {
    /// Decode `row` and store it; the target is untouched on error.
    fn store(&mut self, row: DbRow) -> Result<(), sqlx::Error>;
    fn reset(&mut self);
    /// Whether the target currently holds a record.
    fn is_filled(&self) -> bool;
}

/// Target for a statement that selects any number of rows.
pub trait MultiSlot: Send {
    /// Decode every row and replace the target's contents; the target is
    /// untouched on error.
    fn store(&mut self, rows: Vec<DbRow>) -> Result<(), sqlx::Error>;
    fn reset(&mut self);
    /// Number of records the target currently holds.
    fn len(&self) -> usize;
}

impl<T: FromDbRow + Send> SingleSlot for &mut Option<T> {
    fn store(&mut self, row: DbRow) -> Result<(), sqlx::Error> {
        let record = T::from_db_row(&row)?;
        **self = Some(record);
        Ok(())
    }

    fn reset(&mut self) {
        **self = None;
    }

    fn is_filled(&self) -> bool {
        self.is_some()
    }
}

impl<T: FromDbRow + Send> MultiSlot for &mut Vec<T> {
    fn store(&mut self, rows: Vec<DbRow>) -> Result<(), sqlx::Error> {
        let records = rows
            .iter()
            .map(T::from_db_row)
            .collect::<Result<Vec<_>, _>>()?;
        **self = records;
        Ok(())
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Shape of a destination, for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    None,
    One,
    Many,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::One => write!(f, "one"),
            Self::Many => write!(f, "many"),
        }
    }
}

/// Where a statement's results go.
#[derive(Default)]
pub enum Destination<'d> {
    /// Side effect only (INSERT/UPDATE/DELETE/DDL).
    #[default]
    None,
    /// At most one row; zero rows is [`DbError::NotFound`](crate::DbError::NotFound).
    One(Box<dyn SingleSlot + 'd>),
    /// Any number of rows; zero rows leaves an empty sequence.
    Many(Box<dyn MultiSlot + 'd>),
}

impl<'d> Destination<'d> {
    pub fn one<T>(target: &'d mut Option<T>) -> Self
    where
        T: FromDbRow + Send + 'd,
    {
        Self::One(Box::new(target))
    }

    pub fn many<T>(target: &'d mut Vec<T>) -> Self
    where
        T: FromDbRow + Send + 'd,
    {
        Self::Many(Box::new(target))
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Self::None => DestinationKind::None,
            Self::One(_) => DestinationKind::One,
            Self::Many(_) => DestinationKind::Many,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Records currently held by the target: 0 or 1 for `One`, the sequence
    /// length for `Many`, `None` when there is no target.
    pub fn rows(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::One(slot) => Some(usize::from(slot.is_filled())),
            Self::Many(slot) => Some(slot.len()),
        }
    }

    /// Reset the caller memory this destination points at.
    pub(crate) fn reset(&mut self) {
        match self {
            Self::None => {}
            Self::One(slot) => slot.reset(),
            Self::Many(slot) => slot.reset(),
        }
    }
}

impl fmt::Debug for Destination<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Destination").field(&self.kind()).finish()
    }
}
