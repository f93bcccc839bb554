//! Connection pool wrapper, modeled on the teacher's `db::wallet_db`
//! (`full-service/src/db/wallet_db.rs`): a customized r2d2 pool plus an
//! embedded-migrations runner invoked once at process start.

use std::time::Duration;

use diesel::{
    connection::SimpleConnection,
    pg::PgConnection,
    r2d2::{ConnectionManager, CustomizeConnection, Error as R2d2Error, Pool, PooledConnection},
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type Conn = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Debug)]
pub struct ConnectionOptions {
    pub statement_timeout: Option<Duration>,
}

impl CustomizeConnection<PgConnection, R2d2Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), R2d2Error> {
        if let Some(timeout) = self.statement_timeout {
            conn.batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .map_err(R2d2Error::QueryError)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct LedgerDb {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl LedgerDb {
    pub fn new_from_url(database_url: &str, max_connections: u32) -> Result<Self, R2d2Error> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_customizer(Box::new(ConnectionOptions {
                statement_timeout: Some(Duration::from_secs(30)),
            }))
            .test_on_check_out(true)
            .build(manager)
            .map_err(R2d2Error::ConnectionError)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<ConnectionManager<PgConnection>>) -> Self {
        Self { pool }
    }

    pub fn get_conn(&self) -> Result<Conn, diesel::r2d2::PoolError> {
        self.pool.get()
    }

    /// Runs all pending migrations. Called once from `main` before the sync
    /// service or ledger service accept any work, mirroring the teacher's
    /// `run_pending_migrations` call in `src/bin/main.rs`.
    pub fn run_migrations(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.get_conn()?;
        conn.run_pending_migrations(MIGRATIONS)?;
        Ok(())
    }
}
