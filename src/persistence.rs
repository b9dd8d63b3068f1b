//! Database persistence traits
//!
//! Expressing atomic transactions spanning multiple stores in a hexagonal
//! architecture is not a simple thing in any programming language. The
//! approach here: stores take an explicit connection or transaction handle,
//! and the persistence instance is the factory for both, so one transaction
//! can cover a lot update and a history append.
//!
//! Some discussion:
//!
//! * https://www.reddit.com/r/rust/comments/p9amqt/hexagonal_architecture_in_rust_1/h9ypjoo
//! * https://www.reddit.com/r/golang/comments/i1vy4s/ddd_vs_db_transactions_how_to_reconcile/
pub mod postgres;

use anyhow::{bail, Result};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;

/// An instance of a persistence (store) that can hold data
///
/// Must be cloneable and thread-safe.
pub trait Persistence: Send + Sync + Clone {
    type Connection: Connection<Self>;
    type Transaction<'a>: Transaction;

    /// Get a connection to a store
    fn get_connection(&self) -> Result<Self::Connection>;
}

/// A connection to a database/persistence
pub trait Connection<P: Persistence> {
    fn start_transaction<'a>(&'a mut self) -> Result<P::Transaction<'a>>;
}

/// A database transaction to a database/persistence
pub trait Transaction {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

/// Fake in-memory persistence.
///
/// Useful for unit-tests. The global write lock stands in for a database
/// transaction: everything inside one transaction happens under the lock,
/// which makes it atomic with respect to every other transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    lock: Arc<RwLock<()>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    type Connection = InMemoryConnection;
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(InMemoryConnection {
            lock: self.lock.clone(),
        })
    }
}

#[derive(Debug)]
pub struct InMemoryConnection {
    lock: Arc<RwLock<()>>,
}

impl Connection<InMemoryPersistence> for InMemoryConnection {
    fn start_transaction<'a>(&'a mut self) -> Result<InMemoryTransaction<'a>> {
        Ok(InMemoryTransaction {
            _lock_guard: self.lock.write(),
        })
    }
}

pub struct InMemoryTransaction<'a> {
    _lock_guard: RwLockWriteGuard<'a, ()>,
}

impl<'a> Transaction for InMemoryTransaction<'a> {
    fn commit(self) -> Result<()> {
        Ok(())
    }

    // TODO: simulating rollbacks in a general way would require the
    // `InMemory*` stores to snapshot previous values when the transaction
    // opens. The engine never relies on it: nothing is written before the
    // last fallible step.
    fn rollback(self) -> Result<()> {
        bail!("Not supported")
    }
}
