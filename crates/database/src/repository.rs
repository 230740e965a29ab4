use crate::admission::AdmissionGate;
use crate::connection;
use crate::diagnostics::{ConnectionDiagnostics, ConnectionTarget};
use crate::models::NewUser;
use crate::DbError;
use async_trait::async_trait;
use sqlx::mysql::MySqlPool;

const INSERT_USER: &str = "INSERT INTO users (full_name, mobile_number) VALUES (?, ?)";

/// Persistence operations the HTTP layer depends on.
///
/// This trait lets the handlers run against the MySQL repository in production
/// and against an in-memory double in tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Writes a registration and returns the id the database assigned to it.
    async fn insert_user(&self, user: &NewUser) -> Result<u64, DbError>;

    /// Confirms the database answers a trivial query.
    async fn ping(&self) -> Result<(), DbError>;
}

/// The `DbRepository` owns the connection pool and encapsulates every SQL
/// statement the service issues.
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: MySqlPool,
    target: ConnectionTarget,
    gate: AdmissionGate,
}

impl DbRepository {
    pub fn new(pool: MySqlPool, target: ConnectionTarget, gate: AdmissionGate) -> Self {
        Self { pool, target, gate }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Verifies a connection can be established. Failures are logged with diagnostics.
    pub async fn probe(&self) -> Result<(), DbError> {
        connection::probe(&self.pool, &self.target).await
    }

    /// Idempotently creates the `users` table.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        connection::ensure_schema(&self.pool).await
    }

    /// Describes a driver failure against this repository's server.
    pub fn diagnose(&self, error: &sqlx::Error) -> ConnectionDiagnostics {
        ConnectionDiagnostics::new(error, &self.target)
    }

    /// Logs a failed request with full diagnostics and hands the error back.
    fn report(&self, error: DbError) -> DbError {
        if let DbError::Query(e) = &error {
            self.diagnose(e).log();
        }
        error
    }

    /// Closes the pool, waiting for checked-out connections to come back first.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(db = %self.target, "Database pool closed.");
    }
}

#[async_trait]
impl UserStore for DbRepository {
    async fn insert_user(&self, user: &NewUser) -> Result<u64, DbError> {
        let _admission = self.gate.enter()?;
        // The connection goes back to the pool when `conn` drops, on every path.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| self.report(e.into()))?;

        let result = sqlx::query(INSERT_USER)
            .bind(&user.full_name)
            .bind(&user.mobile_number)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.report(e.into()))?;

        Ok(result.last_insert_id())
    }

    async fn ping(&self) -> Result<(), DbError> {
        let _admission = self.gate.enter()?;
        connection::healthcheck(&self.pool)
            .await
            .map_err(|e| self.report(e))
    }
}
