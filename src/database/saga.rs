use std::future::Future;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::middleware::error::AppResult;

/// Rollback stack for multi-transaction ledger operations.
///
/// The store offers single-path atomicity only, so an operation that
/// touches several paths registers a compensating write after each
/// committed step. On success the stack is discharged with [`commit`];
/// when a later step fails, [`unwind`] runs the compensations in reverse
/// order. Compensation is best-effort: a failing compensation is logged
/// and the remaining ones still run, leaving the documented
/// partially-applied state.
///
/// [`commit`]: Saga::commit
/// [`unwind`]: Saga::unwind
pub struct Saga<'a> {
    operation: &'static str,
    compensations: Vec<(&'static str, BoxFuture<'a, AppResult<()>>)>,
}

impl<'a> Saga<'a> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            compensations: Vec::new(),
        }
    }

    /// Registers the compensation for a step that just committed. The
    /// future is not polled unless the operation later unwinds.
    pub fn on_rollback<F>(&mut self, step: &'static str, compensate: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'a,
    {
        self.compensations.push((step, Box::pin(compensate)));
    }

    /// Discharges the stack; the operation completed.
    pub fn commit(mut self) {
        self.compensations.clear();
    }

    /// Runs the registered compensations in reverse order.
    pub async fn unwind(self) {
        let operation = self.operation;
        if !self.compensations.is_empty() {
            warn!("->> {operation} failed, compensating committed steps");
        }
        for (step, compensate) in self.compensations.into_iter().rev() {
            if let Err(err) = compensate.await {
                error!("->> {operation}: compensation '{step}' failed: {err}");
            }
        }
    }
}
