//! Per-call execution context.
//!
//! An [`ExecContext`] travels alongside every pipeline call. It carries the
//! tracing span all events of the call are recorded under, an optional
//! deadline, and an optional cancellation token.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::Span;

/// A handle for cancelling in-flight pipeline calls.
///
/// Clones share state, so a token can be cancelled from another task.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every call observing this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecContext {
    span: Span,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl ExecContext {
    /// Context recording under the caller's current span, with no deadline.
    pub fn new() -> Self {
        Self::with_span(Span::current())
    }

    /// Context recording under an explicit span.
    pub fn with_span(span: Span) -> Self {
        Self {
            span,
            deadline: None,
            cancel: None,
        }
    }

    /// Context for an inbound request, tagging every event with its metadata.
    pub fn for_request(correlation_id: Option<&str>, user_agent: Option<&str>) -> Self {
        let span = tracing::info_span!(
            "request",
            correlation_id = correlation_id.unwrap_or_default(),
            user_agent = user_agent.unwrap_or_default(),
        );
        Self::with_span(span)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run one database operation under this context's deadline and token.
    ///
    /// Not used for commit: once issued, a commit either lands or fails on
    /// its own terms.
    pub(crate) async fn guard<F>(&self, operation: &'static str, fut: F) -> DbResult<F::Output>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => timeout_at(deadline, fut)
                    .await
                    .map_err(|_| DbError::timeout(operation)),
                None => Ok(fut.await),
            }
        };

        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DbError::cancelled(operation)),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}
