use crate::admission::AdmissionGate;
use crate::diagnostics::{ConnectionDiagnostics, ConnectionTarget};
use crate::error::DbError;
use crate::repository::DbRepository;
use configuration::{DatabaseSettings, TlsMode};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};

/// The only table this service owns. Safe to run on every start.
pub const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
      id INT AUTO_INCREMENT PRIMARY KEY,
      full_name VARCHAR(255) NOT NULL,
      mobile_number VARCHAR(15) NOT NULL,
      created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// Builds the connection pool described by `settings`.
///
/// Credentials are decoded here and nowhere else. The pool is created lazily, so this
/// succeeds even while the database is unreachable. Call [`DbRepository::probe`] to find
/// out whether it actually is.
pub fn connect(settings: &DatabaseSettings) -> Result<DbRepository, DbError> {
    let credentials = settings.credentials()?;
    let target = ConnectionTarget {
        host: credentials.host.clone(),
        port: settings.port,
        user: credentials.user.clone(),
        database: credentials.database.clone(),
    };

    tracing::info!(
        host = %target.host,
        user = %target.user,
        database = %target.database,
        "Attempting database connection."
    );

    let connect_options = MySqlConnectOptions::new()
        .host(&credentials.host)
        .port(settings.port)
        .username(&credentials.user)
        .password(&credentials.password)
        .database(&credentials.database)
        .ssl_mode(ssl_mode(settings.tls));

    let pool = pool_options(settings).connect_lazy_with(connect_options);
    let gate = AdmissionGate::new(settings.max_connections, settings.max_waiting);

    Ok(DbRepository::new(pool, target, gate))
}

fn pool_options(settings: &DatabaseSettings) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout())
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                match sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
                    .fetch_one(&mut *conn)
                    .await
                {
                    Ok(thread_id) => {
                        tracing::info!(thread_id, "DB connection established.")
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "DB connection established; thread id unavailable.")
                    }
                }
                Ok(())
            })
        })
}

fn ssl_mode(mode: TlsMode) -> MySqlSslMode {
    match mode {
        TlsMode::Disabled => MySqlSslMode::Disabled,
        TlsMode::Preferred => MySqlSslMode::Preferred,
        TlsMode::Required => MySqlSslMode::Required,
        TlsMode::VerifyCa => MySqlSslMode::VerifyCa,
        TlsMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
    }
}

/// Checks a connection out of the pool and hands it straight back.
///
/// Failures are logged with full diagnostics before being returned.
pub async fn probe(pool: &MySqlPool, target: &ConnectionTarget) -> Result<(), DbError> {
    match pool.acquire().await {
        Ok(conn) => {
            drop(conn);
            tracing::info!(db = %target, "Database connected successfully!");
            Ok(())
        }
        Err(e) => {
            ConnectionDiagnostics::new(&e, target).log();
            Err(e.into())
        }
    }
}

/// Creates the `users` table if it does not exist yet.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    sqlx::query(CREATE_USERS_TABLE).execute(&mut *conn).await?;
    Ok(())
}

/// Runs `SELECT 1` on a pooled connection.
pub async fn healthcheck(pool: &MySqlPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT 1").execute(&mut *conn).await?;
    Ok(())
}
