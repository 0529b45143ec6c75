//! Transaction Coordinator
//!
//! The only place a transaction boundary is opened. A unit of work receives a
//! [`Queries`] bound to the open transaction and decides the outcome:
//!
//! ```text
//! BEGIN ─▶ unit_of_work(&mut queries) ─┬─ Ok  ─▶ COMMIT   ─▶ Ok(value) / commit error
//!                                      └─ Err ─▶ ROLLBACK ─▶ Err(e) / RollbackFailed
//! ```
//!
//! A unit of work that panics, or a caller that drops the returned future
//! before it completes, leaves the `sqlx::Transaction` uncommitted; it rolls
//! back when dropped and its connection goes back to the pool.

use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::error::LedgerError;
use super::queries::Queries;
use super::store::PgStore;

impl PgStore {
    /// Run `unit_of_work` inside one database transaction.
    ///
    /// ```ignore
    /// let account = store
    ///     .exec_tx(move |q| Box::pin(async move { q.add_account_balance(id, 50).await }))
    ///     .await?;
    /// ```
    pub async fn exec_tx<T, F>(&self, unit_of_work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut Queries<'_>) -> BoxFuture<'q, Result<T, LedgerError>> + Send,
    {
        let mut tx = self.pool.begin().await?;

        if let Some(timeout) = self.statement_timeout {
            sqlx::query(&set_statement_timeout(timeout))
                .execute(&mut *tx)
                .await?;
        }

        let outcome = {
            let mut queries = Queries::new(&mut tx);
            unit_of_work(&mut queries).await
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    warn!(error = %err, code = err.code(), "Transaction rolled back");
                    Err(err)
                }
                Err(rollback) => {
                    error!(
                        error = %err,
                        rollback_error = %rollback,
                        "Transaction rollback failed"
                    );
                    Err(LedgerError::RollbackFailed {
                        source: Box::new(err),
                        rollback,
                    })
                }
            },
        }
    }
}

/// `SET` takes no bind parameters. Postgres reads `0` as "no limit", so
/// sub-millisecond deadlines round up to 1ms.
fn set_statement_timeout(timeout: Duration) -> String {
    format!("SET LOCAL statement_timeout = {}", timeout.as_millis().max(1))
}
