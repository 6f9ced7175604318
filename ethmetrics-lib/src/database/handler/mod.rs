//! Database client and table handlers.
//!
//! All tables can be further inspected in the `migrations/2026-10-17-000000_ethmetrics/up.sql` file.

pub mod metrics;

pub use metrics::MetricsHandler;
pub use metrics::UpsertOutcome;
pub use metrics::UpsertStrategy;

use crate::database::statement::Exists;
use crate::database::statement::Write;
use crate::error::Error;
use crate::error::ExecutorError;
use crate::retry::RetryPolicy;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;
use diesel::RunQueryDsl;
use log::info;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// Runs single statements against a store. Implementations must be safe to share across collectors.
pub trait Executor: Send + Sync {
    /// Returns whether the row addressed by the query exists.
    fn exists(&self, query: &Exists) -> Result<bool, ExecutorError>;

    /// Executes the statement returning the number of affected rows.
    fn execute(&self, statement: &Write) -> Result<usize, ExecutorError>;
}

impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn exists(&self, query: &Exists) -> Result<bool, ExecutorError> {
        (**self).exists(query)
    }

    fn execute(&self, statement: &Write) -> Result<usize, ExecutorError> {
        (**self).execute(statement)
    }
}

/// [`Executor`] checking out one pooled connection per statement.
#[derive(Clone)]
pub struct PgExecutor {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl Executor for PgExecutor {
    fn exists(&self, query: &Exists) -> Result<bool, ExecutorError> {
        let connection = self.pool.get()?;
        Ok(query.get_result::<bool>(&*connection)?)
    }

    fn execute(&self, statement: &Write) -> Result<usize, ExecutorError> {
        let connection = self.pool.get()?;
        Ok(statement.execute(&*connection)?)
    }
}

/// Database client, providing all table handlers.
pub struct DatabaseClient {
    executor: PgExecutor,
}

/// Maximum time the pool waits for a connection before giving up on a single attempt.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

impl DatabaseClient {
    /// Returns a new pooled database client; fails if no connection can be established right now.
    pub fn new(database_url: &str) -> Result<Self, Error> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(Error::DatabaseConnect)?;

        Ok(DatabaseClient {
            executor: PgExecutor { pool },
        })
    }

    /// Returns a new pooled database client, retrying with `policy` until the database accepts connections.
    /// Exhausting the policy is fatal.
    pub fn connect(database_url: &str, policy: &RetryPolicy) -> Result<Self, Error> {
        let start = Instant::now();

        let client = policy.retry_notify(
            || DatabaseClient::new(database_url),
            |err, delay| warn!("Database not reachable yet, retrying in {delay:?}; {err}"),
        );

        match client {
            Ok(client) => {
                info!("Connected to database after {:?}", start.elapsed());
                Ok(client)
            }

            Err(why) => Err(Error::DatabaseUnreachable(start.elapsed(), Box::new(why))),
        }
    }

    /// Returns a handler for the metric tables.
    pub fn metrics(&self, strategy: UpsertStrategy) -> MetricsHandler<PgExecutor> {
        MetricsHandler::new(self.executor.clone(), strategy)
    }
}
