use super::*;
use anyhow::Context;
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};

#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresPersistence {
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let manager = PostgresConnectionManager::new(
            database_url
                .parse()
                .context("invalid database connection string")?,
            NoTls,
        );
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .context("failed to connect to the database")?;
        Ok(Self { pool })
    }
}

impl Persistence for PostgresPersistence {
    type Connection = PostgresConnection;
    type Transaction<'a> = PostgresTransaction<'a>;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(self.pool.get()?)
    }
}

pub type PostgresConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

impl Connection<PostgresPersistence> for PostgresConnection {
    fn start_transaction(&mut self) -> Result<PostgresTransaction<'_>> {
        Ok((**self).transaction()?)
    }
}

pub type PostgresTransaction<'a> = r2d2_postgres::postgres::Transaction<'a>;

impl<'a> Transaction for PostgresTransaction<'a> {
    fn commit(self) -> Result<()> {
        Ok(r2d2_postgres::postgres::Transaction::commit(self)?)
    }
}
