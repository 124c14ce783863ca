use super::*;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Fake in-memory persistence.
///
/// Useful for unit-tests. Transactions are fully serialized: only one
/// can be open at a time across all clones.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    lock: Arc<Mutex<()>>,
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

#[derive(Default, Debug)]
pub struct InMemoryConnection {
    lock: Arc<Mutex<()>>,
}

impl Connection<InMemoryPersistence> for InMemoryConnection {
    fn start_transaction(&mut self) -> Result<InMemoryTransaction<'_>> {
        Ok(InMemoryTransaction {
            lock_guard: self.lock.lock(),
        })
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    #[allow(unused)] // used only by Drop
    lock_guard: MutexGuard<'a, ()>,
}

impl<'a> Transaction for InMemoryTransaction<'a> {
    fn commit(self) -> Result<()> {
        Ok(())
    }
}
