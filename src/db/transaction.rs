/*!
 * Transaction Helper Utilities
 *
 * Every catalog mutation runs inside one `CatalogTransaction`: begin with the
 * configured isolation level, do the work against the transaction, then
 * `finish` with the outcome. An `Err` outcome rolls back every write made so
 * far, an `Ok` outcome commits.
 */

use crate::errors::ServiceError;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, IsolationLevel, TransactionTrait};
use std::ops::Deref;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Isolation requested when a transaction is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
}

impl TransactionOptions {
    pub fn serializable() -> Self {
        Self::with_isolation(IsolationLevel::Serializable)
    }

    pub fn with_isolation(isolation: IsolationLevel) -> Self {
        Self {
            isolation: Some(isolation),
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::serializable()
    }
}

/// An open database transaction tagged with the operation it serves.
///
/// Dereferences to [`DatabaseTransaction`], so it can be handed to anything
/// generic over `ConnectionTrait`.
pub struct CatalogTransaction {
    txn: DatabaseTransaction,
    operation: &'static str,
    transaction_id: Uuid,
    started: Instant,
}

impl CatalogTransaction {
    /// Opens a transaction on `db` for `operation`
    pub async fn begin(
        db: &DatabaseConnection,
        operation: &'static str,
        options: TransactionOptions,
    ) -> Result<Self, ServiceError> {
        let transaction_id = Uuid::new_v4();
        debug!(transaction_id = %transaction_id, operation, "Starting database transaction");

        let txn = db
            .begin_with_config(options.isolation, None)
            .await?;
        counter!("catalog.transaction.started", 1);

        Ok(Self {
            txn,
            operation,
            transaction_id,
            started: Instant::now(),
        })
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands the outcome back.
    ///
    /// A failed commit is reported as the error of the whole operation.
    pub async fn finish<T>(self, outcome: Result<T, ServiceError>) -> Result<T, ServiceError> {
        let Self {
            txn,
            operation,
            transaction_id,
            started,
        } = self;

        match outcome {
            Ok(value) => {
                txn.commit().await?;
                let elapsed = started.elapsed();
                histogram!("catalog.transaction.duration", elapsed.as_secs_f64());
                counter!("catalog.transaction.committed", 1);
                debug!(
                    transaction_id = %transaction_id,
                    operation,
                    "Transaction committed successfully in {:?}",
                    elapsed
                );
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(
                        transaction_id = %transaction_id,
                        operation,
                        error = %rollback_err,
                        "Rollback failed; connection drop will discard the transaction"
                    );
                }
                counter!("catalog.transaction.rolled_back", 1);
                warn!(
                    transaction_id = %transaction_id,
                    operation,
                    error = %err,
                    "Transaction rolled back after {:?}",
                    started.elapsed()
                );
                Err(err)
            }
        }
    }
}

impl Deref for CatalogTransaction {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_serializable() {
        let options = TransactionOptions::default();
        assert_eq!(options.isolation, Some(IsolationLevel::Serializable));
        assert_eq!(
            TransactionOptions::with_isolation(IsolationLevel::RepeatableRead).isolation,
            Some(IsolationLevel::RepeatableRead)
        );
    }
}
