use super::*;
use r2d2_postgres::PostgresConnectionManager;

type Manager = PostgresConnectionManager<r2d2_postgres::postgres::NoTls>;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: r2d2::Pool<Manager>,
}

impl PostgresPersistence {
    pub fn new(url: &str) -> Result<Self> {
        let manager =
            PostgresConnectionManager::new(url.parse()?, r2d2_postgres::postgres::NoTls);
        Ok(Self {
            pool: r2d2::Pool::new(manager)?,
        })
    }
}

impl Persistence for PostgresPersistence {
    type Connection = PostgresConnection;
    type Transaction<'a> = ::postgres::Transaction<'a>;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(self.pool.get()?)
    }
}

pub type PostgresConnection = r2d2::PooledConnection<Manager>;

impl Connection<PostgresPersistence> for PostgresConnection {
    fn start_transaction<'a>(&'a mut self) -> Result<::postgres::Transaction<'a>> {
        Ok(self.transaction()?)
    }
}

impl<'a> Transaction for ::postgres::Transaction<'a> {
    fn commit(self) -> Result<()> {
        Ok(::postgres::Transaction::commit(self)?)
    }

    fn rollback(self) -> Result<()> {
        Ok(::postgres::Transaction::rollback(self)?)
    }
}
