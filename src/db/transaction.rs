//! Transaction boundaries on managed connections.
//!
//! A transaction is bound to the context's single connection. `BEGIN` switches the
//! connection out of auto-commit; `COMMIT` and `ROLLBACK` end the transaction and
//! also close the connection, so the next statement of the context starts on a
//! fresh auto-commit connection.

use crate::db::connection::{ConnectionManager, ManagedConnection, Slot, lock_slot};
use crate::error::{DbError, DbResult};
use crate::models::ContextId;
use std::sync::MutexGuard;
use tracing::{info, warn};

impl ConnectionManager {
    /// Begin a transaction on the context's connection, opening one if needed.
    pub fn begin_transaction(&self, ctx: &ContextId) -> DbResult<()> {
        self.with_connection(ctx, |driver, managed| {
            if managed.in_transaction {
                return Err(DbError::transaction_state("Transaction already active", ctx));
            }
            driver.execute_raw(managed.connection_mut()?, "BEGIN")?;
            managed.in_transaction = true;
            managed.auto_commit = false;

            info!(
                context = %ctx,
                connection_id = managed.id(),
                db_type = %managed.db_type(),
                "Transaction started"
            );
            Ok(())
        })
    }

    /// Commit the active transaction and close the connection.
    ///
    /// If `COMMIT` fails a rollback is attempted, the connection is still closed,
    /// and the commit error is returned.
    pub fn commit(&self, ctx: &ContextId) -> DbResult<()> {
        let slot = self.transaction_slot(ctx)?;
        let mut managed = self.lock_active(ctx, &slot)?;

        let result = managed
            .connection_mut()
            .and_then(|conn| self.driver().execute_raw(conn, "COMMIT"));

        match &result {
            Ok(()) => info!(
                context = %ctx,
                connection_id = managed.id(),
                "Transaction committed"
            ),
            Err(e) => {
                warn!(
                    context = %ctx,
                    connection_id = managed.id(),
                    error = %e,
                    "Commit failed, rolling back"
                );
                if let Err(rollback_err) = managed
                    .connection_mut()
                    .and_then(|conn| self.driver().execute_raw(conn, "ROLLBACK"))
                {
                    warn!(
                        context = %ctx,
                        connection_id = managed.id(),
                        error = %rollback_err,
                        "Rollback after failed commit also failed"
                    );
                }
            }
        }

        self.finish(ctx, &slot, managed);
        result
    }

    /// Roll back the active transaction and close the connection.
    ///
    /// The connection is closed even when `ROLLBACK` fails; the failure is returned
    /// after cleanup.
    pub fn rollback(&self, ctx: &ContextId) -> DbResult<()> {
        let slot = self.transaction_slot(ctx)?;
        let mut managed = self.lock_active(ctx, &slot)?;

        let result = managed
            .connection_mut()
            .and_then(|conn| self.driver().execute_raw(conn, "ROLLBACK"));

        match &result {
            Ok(()) => info!(
                context = %ctx,
                connection_id = managed.id(),
                "Transaction rolled back"
            ),
            Err(e) => warn!(
                context = %ctx,
                connection_id = managed.id(),
                error = %e,
                "Rollback failed"
            ),
        }

        self.finish(ctx, &slot, managed);
        result
    }

    fn transaction_slot(&self, ctx: &ContextId) -> DbResult<Slot> {
        self.slot(ctx)?
            .ok_or_else(|| DbError::transaction_state("No active transaction", ctx))
    }

    fn lock_active<'a>(
        &self,
        ctx: &ContextId,
        slot: &'a Slot,
    ) -> DbResult<MutexGuard<'a, ManagedConnection>> {
        let managed = lock_slot(slot)?;
        if !managed.in_transaction {
            return Err(DbError::transaction_state("No active transaction", ctx));
        }
        Ok(managed)
    }

    /// Clear the transaction, drop the slot from the map and close its connection.
    fn finish(&self, ctx: &ContextId, slot: &Slot, mut managed: MutexGuard<'_, ManagedConnection>) {
        let id = managed.id();
        let conn = managed.take();
        drop(managed);
        if let Err(e) = self.discard(ctx, slot) {
            warn!(context = %ctx, connection_id = id, error = %e, "Failed to discard connection");
        }
        self.close_quietly(ctx, id, conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::db::driver::Driver;
    use crate::models::ContextState;
    use std::sync::Arc;

    fn manager(dir: &tempfile::TempDir) -> ConnectionManager {
        let path = dir.path().join("tx.db");
        let config = DbConfig::parse(&format!("sqlite:{}?mode=rwc", path.display())).unwrap();
        ConnectionManager::new(Arc::new(Driver::new(&config).unwrap()))
    }

    #[test]
    fn test_begin_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        manager.begin_transaction(&ctx).unwrap();
        assert_eq!(manager.state(&ctx).unwrap(), ContextState::InTransaction);
        let err = manager.begin_transaction(&ctx).unwrap_err();
        assert!(matches!(err, DbError::TransactionState { .. }));
        assert!(manager.is_in_transaction(&ctx).unwrap());
    }

    #[test]
    fn test_commit_and_rollback_without_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        for _ in 0..2 {
            assert!(matches!(
                manager.commit(&ctx),
                Err(DbError::TransactionState { .. })
            ));
            assert!(matches!(
                manager.rollback(&ctx),
                Err(DbError::TransactionState { .. })
            ));
        }

        // An idle connection is not a transaction either
        manager.acquire(&ctx).unwrap();
        assert!(matches!(
            manager.commit(&ctx),
            Err(DbError::TransactionState { .. })
        ));
        assert!(manager.has_connection(&ctx).unwrap());
    }

    #[test]
    fn test_commit_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        manager.begin_transaction(&ctx).unwrap();
        manager.commit(&ctx).unwrap();
        assert_eq!(manager.state(&ctx).unwrap(), ContextState::NoConnection);
        let stats = manager.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.opened, stats.closed);
    }

    #[test]
    fn test_rollback_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        manager.begin_transaction(&ctx).unwrap();
        manager.rollback(&ctx).unwrap();
        assert!(!manager.has_connection(&ctx).unwrap());
        assert!(matches!(
            manager.rollback(&ctx),
            Err(DbError::TransactionState { .. })
        ));
    }
}
