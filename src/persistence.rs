//! Database persistence traits
//!
//! Stores (see [`crate::store`]) don't own connections. Callers open a
//! [`Connection`], start a [`Transaction`] on it and hand the transaction
//! to every store call that must happen atomically. Dropping a transaction
//! without committing it abandons it.
//!
//! A transaction is also the serialization point for bidding: whatever a
//! caller reads inside one can't change under it until commit.
pub mod in_memory;
pub mod postgres;

pub use self::in_memory::*;
pub use self::postgres::*;

use anyhow::Result;

/// An instance of a persistence (store) that can hold data
///
/// Must be cloneable and thread-safe.
pub trait Persistence: Send + Sync + Clone + 'static {
    type Connection: Connection<Self>;
    type Transaction<'a>: Transaction;

    /// Get a connection to a store
    fn get_connection(&self) -> Result<Self::Connection>;
}

/// A connection to a database/persistence
pub trait Connection<P: Persistence> {
    fn start_transaction(&mut self) -> Result<P::Transaction<'_>>;
}

/// A database transaction to a database/persistence
///
/// There is no explicit rollback: dropping an uncommitted transaction
/// rolls it back in PostgreSQL and just releases the lock in memory, where
/// stores only write once every check has passed.
pub trait Transaction {
    fn commit(self) -> Result<()>;
}
