//! Per-context connection management.
//!
//! The manager maps each `ContextId` to at most one open connection. Connections
//! are opened lazily by `acquire`, reused by every statement of the context, and
//! closed explicitly (`close`, `release`, or the end of a transaction).
//!
//! Locking: the map lock is only held for lookups and inserts. Each slot has its
//! own mutex, held for the duration of one statement on that connection.

use crate::db::driver::{DbConnection, Driver};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionInfo, ConnectionStats, ContextId, ContextState, DatabaseType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// One live connection owned by one execution context.
#[derive(Debug)]
pub struct ManagedConnection {
    conn: Option<DbConnection>,
    id: u64,
    db_type: DatabaseType,
    pub(crate) in_transaction: bool,
    pub(crate) auto_commit: bool,
    /// Set when the driver reported that the link is gone
    broken: bool,
    opened_at: DateTime<Utc>,
}

impl ManagedConnection {
    fn new(conn: DbConnection, id: u64) -> Self {
        Self {
            db_type: conn.db_type(),
            conn: Some(conn),
            id,
            in_transaction: false,
            auto_commit: true,
            broken: false,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// The driver connection; fails once the connection has been handed back for closing.
    pub(crate) fn connection_mut(&mut self) -> DbResult<&mut DbConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal(format!("Connection {} is already closed", self.id)))
    }

    pub(crate) fn take(&mut self) -> Option<DbConnection> {
        self.in_transaction = false;
        self.auto_commit = true;
        self.conn.take()
    }

    fn info(&self, context: &ContextId) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.id,
            context: context.clone(),
            database_type: self.db_type,
            in_transaction: self.in_transaction,
            auto_commit: self.auto_commit,
            opened_at: self.opened_at,
        }
    }
}

pub(crate) type Slot = Arc<Mutex<ManagedConnection>>;

pub(crate) fn lock_slot(slot: &Slot) -> DbResult<MutexGuard<'_, ManagedConnection>> {
    slot.lock()
        .map_err(|_| DbError::internal("Connection slot lock poisoned"))
}

pub struct ConnectionManager {
    driver: Arc<Driver>,
    slots: Mutex<HashMap<ContextId, Slot>>,
    next_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            driver,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    pub(crate) fn driver(&self) -> &Driver {
        &self.driver
    }

    fn slots(&self) -> DbResult<MutexGuard<'_, HashMap<ContextId, Slot>>> {
        self.slots
            .lock()
            .map_err(|_| DbError::internal("Connection map lock poisoned"))
    }

    /// Cached slot for a context, without opening anything.
    pub(crate) fn slot(&self, ctx: &ContextId) -> DbResult<Option<Slot>> {
        Ok(self.slots()?.get(ctx).cloned())
    }

    /// Remove `slot` from the map if it is still the context's current slot.
    pub(crate) fn discard(&self, ctx: &ContextId, slot: &Slot) -> DbResult<()> {
        let mut slots = self.slots()?;
        if slots.get(ctx).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(ctx);
        }
        Ok(())
    }

    /// Return the context's connection, opening one if none is cached or the cached
    /// one is broken.
    ///
    /// A broken connection that was inside a transaction is discarded and reported
    /// as a `Connection` error: the transaction is gone and must not be silently
    /// replaced by auto-commit work on a fresh connection.
    pub(crate) fn acquire(&self, ctx: &ContextId) -> DbResult<Slot> {
        if let Some(slot) = self.slot(ctx)? {
            let mut managed = lock_slot(&slot)?;
            if !managed.broken {
                drop(managed);
                return Ok(slot);
            }

            let lost_transaction = managed.in_transaction;
            let id = managed.id;
            let conn = managed.take();
            drop(managed);
            self.discard(ctx, &slot)?;
            warn!(context = %ctx, connection_id = id, "Discarding broken connection");
            self.close_quietly(ctx, id, conn);

            if lost_transaction {
                return Err(DbError::connection(
                    format!("Connection {} was lost during an active transaction", id),
                    "The transaction was rolled back by the server; begin a new one and retry",
                ));
            }
        }

        self.open(ctx)
    }

    fn open(&self, ctx: &ContextId) -> DbResult<Slot> {
        let conn = self.driver.connect()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.opened.fetch_add(1, Ordering::Relaxed);
        let slot: Slot = Arc::new(Mutex::new(ManagedConnection::new(conn, id)));

        // Re-check under the lock; another thread using the same context may have won
        let existing = {
            let mut slots = self.slots()?;
            match slots.get(ctx) {
                Some(current) => Some(Arc::clone(current)),
                None => {
                    slots.insert(ctx.clone(), Arc::clone(&slot));
                    None
                }
            }
        };

        if let Some(current) = existing {
            let conn = lock_slot(&slot)?.take();
            self.close_quietly(ctx, id, conn);
            return Ok(current);
        }

        info!(
            context = %ctx,
            connection_id = id,
            db_type = %self.driver.db_type(),
            "Opened connection"
        );
        Ok(slot)
    }

    /// Run `f` on the context's connection.
    ///
    /// Failures that leave the link unusable mark the connection broken so that the
    /// next `acquire` replaces it.
    pub(crate) fn with_connection<T>(
        &self,
        ctx: &ContextId,
        f: impl FnOnce(&Driver, &mut ManagedConnection) -> DbResult<T>,
    ) -> DbResult<T> {
        let slot = self.acquire(ctx)?;
        let mut managed = lock_slot(&slot)?;
        let result = f(&self.driver, &mut managed);
        if let Err(e) = &result {
            if e.is_connection_lost() {
                warn!(
                    context = %ctx,
                    connection_id = managed.id,
                    error = %e,
                    "Connection lost"
                );
                managed.broken = true;
            }
        }
        result
    }

    /// Close and discard the context's connection.
    ///
    /// Fails with `NoConnection` when the context holds none. An open transaction is
    /// rolled back by the server when the connection closes.
    pub fn close(&self, ctx: &ContextId) -> DbResult<()> {
        let slot = self
            .slots()?
            .remove(ctx)
            .ok_or_else(|| DbError::no_connection(ctx))?;
        let mut managed = lock_slot(&slot)?;
        if managed.in_transaction {
            warn!(
                context = %ctx,
                connection_id = managed.id,
                "Closing connection with an active transaction; it will be rolled back"
            );
        }
        let id = managed.id;
        let conn = managed.take();
        drop(managed);

        self.closed.fetch_add(1, Ordering::Relaxed);
        info!(context = %ctx, connection_id = id, "Closed connection");
        match conn {
            Some(conn) => self.driver.close(conn),
            None => Ok(()),
        }
    }

    /// Close the context's connection if it has one, logging instead of failing.
    pub fn release(&self, ctx: &ContextId) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ctx);
        let Some(slot) = slot else {
            return;
        };
        let mut managed = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if managed.in_transaction {
            warn!(
                context = %ctx,
                connection_id = managed.id,
                "Releasing connection with an active transaction; it will be rolled back"
            );
        }
        let id = managed.id;
        let conn = managed.take();
        drop(managed);
        debug!(context = %ctx, connection_id = id, "Releasing connection");
        self.close_quietly(ctx, id, conn);
    }

    /// Close a connection that is already out of the map; failures are only logged.
    pub(crate) fn close_quietly(&self, ctx: &ContextId, id: u64, conn: Option<DbConnection>) {
        let Some(conn) = conn else {
            return;
        };
        self.closed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.driver.close(conn) {
            warn!(context = %ctx, connection_id = id, error = %e, "Failed to close connection");
        }
    }

    /// Close every cached connection.
    pub fn close_all(&self) {
        let drained: Vec<(ContextId, Slot)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (ctx, slot) in drained {
            let mut managed = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let id = managed.id;
            let conn = managed.take();
            drop(managed);
            self.close_quietly(&ctx, id, conn);
        }
    }

    pub fn state(&self, ctx: &ContextId) -> DbResult<ContextState> {
        match self.slot(ctx)? {
            None => Ok(ContextState::NoConnection),
            Some(slot) => {
                if lock_slot(&slot)?.in_transaction {
                    Ok(ContextState::InTransaction)
                } else {
                    Ok(ContextState::Idle)
                }
            }
        }
    }

    pub fn is_in_transaction(&self, ctx: &ContextId) -> DbResult<bool> {
        Ok(self.state(ctx)?.is_in_transaction())
    }

    pub fn has_connection(&self, ctx: &ContextId) -> DbResult<bool> {
        Ok(self.state(ctx)?.has_connection())
    }

    /// Snapshot of the context's connection, if it holds one.
    pub fn info(&self, ctx: &ContextId) -> DbResult<Option<ConnectionInfo>> {
        match self.slot(ctx)? {
            None => Ok(None),
            Some(slot) => Ok(Some(lock_slot(&slot)?.info(ctx))),
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            live: self
                .slots
                .lock()
                .map(|slots| slots.len())
                .unwrap_or_default(),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Blocking on the driver runtime is not possible from inside another runtime
        if tokio::runtime::Handle::try_current().is_ok() {
            return;
        }
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn manager(dir: &tempfile::TempDir) -> ConnectionManager {
        let path = dir.path().join("manager.db");
        let config = DbConfig::parse(&format!("sqlite:{}?mode=rwc", path.display())).unwrap();
        ConnectionManager::new(Arc::new(Driver::new(&config).unwrap()))
    }

    #[test]
    fn test_acquire_reuses_connection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        let first = manager.acquire(&ctx).unwrap();
        let second = manager.acquire(&ctx).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.stats().opened, 1);
        assert_eq!(manager.state(&ctx).unwrap(), ContextState::Idle);
    }

    #[test]
    fn test_contexts_get_distinct_connections() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let a = ContextId::new();
        let b = ContextId::new();

        manager.acquire(&a).unwrap();
        manager.acquire(&b).unwrap();
        let id_a = manager.info(&a).unwrap().unwrap().connection_id;
        let id_b = manager.info(&b).unwrap().unwrap().connection_id;
        assert_ne!(id_a, id_b);
        assert_eq!(manager.stats().live, 2);
    }

    #[test]
    fn test_close_without_connection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        assert!(matches!(manager.close(&ctx), Err(DbError::NoConnection { .. })));
        manager.acquire(&ctx).unwrap();
        manager.close(&ctx).unwrap();
        assert!(matches!(manager.close(&ctx), Err(DbError::NoConnection { .. })));
        assert_eq!(manager.stats().closed, 1);
    }

    #[test]
    fn test_broken_connection_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        let slot = manager.acquire(&ctx).unwrap();
        let old_id = {
            let mut managed = slot.lock().unwrap();
            managed.broken = true;
            managed.id()
        };
        manager.acquire(&ctx).unwrap();
        let new_id = manager.info(&ctx).unwrap().unwrap().connection_id;
        assert_ne!(old_id, new_id);
        assert_eq!(manager.stats().live, 1);
    }

    #[test]
    fn test_broken_connection_in_transaction_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        let slot = manager.acquire(&ctx).unwrap();
        {
            let mut managed = slot.lock().unwrap();
            managed.in_transaction = true;
            managed.broken = true;
        }
        let err = manager.acquire(&ctx).unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(!manager.has_connection(&ctx).unwrap());
    }

    #[test]
    fn test_release_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let ctx = ContextId::new();

        manager.release(&ctx);
        manager.acquire(&ctx).unwrap();
        manager.release(&ctx);
        assert_eq!(manager.stats().live, 0);
        assert_eq!(manager.state(&ctx).unwrap(), ContextState::NoConnection);
    }
}
