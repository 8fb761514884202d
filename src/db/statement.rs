//! Statements: a query template, its positional arguments, and where the
//! results go.

use crate::db::destination::{Destination, FromDbRow};
use crate::db::params::QueryParam;
use tracing::debug;

/// A single step of a pipeline.
///
/// The destination borrows caller-owned memory for `'d`, so a statement can
/// only be executed by one pipeline at a time and the caller cannot observe
/// its target while the pipeline runs.
#[derive(Debug)]
pub struct Statement<'d> {
    destination: Destination<'d>,
    query: String,
    args: Vec<QueryParam>,
    debug: bool,
}

impl<'d> Statement<'d> {
    pub fn new(destination: Destination<'d>, query: impl Into<String>, args: Vec<QueryParam>) -> Self {
        Self {
            destination,
            query: query.into(),
            args,
            debug: false,
        }
    }

    /// Statement run for its side effect only.
    pub fn execute(query: impl Into<String>, args: Vec<QueryParam>) -> Self {
        Self::new(Destination::None, query, args)
    }

    /// Statement selecting at most one row into `target`.
    pub fn fetch_one<T>(target: &'d mut Option<T>, query: impl Into<String>, args: Vec<QueryParam>) -> Self
    where
        T: FromDbRow + Send + 'd,
    {
        Self::new(Destination::one(target), query, args)
    }

    /// Statement selecting every matching row into `target`.
    pub fn fetch_all<T>(target: &'d mut Vec<T>, query: impl Into<String>, args: Vec<QueryParam>) -> Self
    where
        T: FromDbRow + Send + 'd,
    {
        Self::new(Destination::many(target), query, args)
    }

    /// Log query, arguments and destination after each successful run.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn destination(&self) -> &Destination<'d> {
        &self.destination
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn args(&self) -> &[QueryParam] {
        &self.args
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn set_destination(&mut self, destination: Destination<'d>) -> &mut Self {
        self.destination = destination;
        self
    }

    pub fn set_query(&mut self, query: impl Into<String>) -> &mut Self {
        self.query = query.into();
        self
    }

    pub fn set_args(&mut self, args: Vec<QueryParam>) -> &mut Self {
        self.args = args;
        self
    }

    /// Reset the caller memory behind the destination and detach it.
    ///
    /// The pipeline runner calls this on a statement whose execution failed,
    /// so the caller never sees a target written by a failed step.
    pub fn clear_destination(&mut self) -> &mut Self {
        self.destination.reset();
        self.destination = Destination::None;
        self
    }

    /// Disjoint borrows used by the executor: the prepared query borrows the
    /// text and arguments while results are written through the destination.
    pub(crate) fn parts_mut(&mut self) -> (&str, &[QueryParam], &mut Destination<'d>) {
        (&self.query, &self.args, &mut self.destination)
    }

    pub(crate) fn log_debug(&self, index: usize) {
        if self.debug {
            debug!(
                index,
                query = %self.query,
                args = ?self.args,
                destination = %self.destination.kind(),
                rows = ?self.destination.rows(),
                "statement debug"
            );
        }
    }
}
