use sqlx::mysql::MySqlDatabaseError;
use std::fmt;

/// The server a pool points at, as shown in logs. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Everything an operator needs to tell why the database could not be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDiagnostics {
    pub message: String,
    /// Symbolic error kind, e.g. `ConnectionRefused` or `PoolTimedOut`.
    pub code: Option<String>,
    pub sql_state: Option<String>,
    /// MySQL server error number.
    pub errno: Option<u16>,
    /// True when the failure is at the transport level rather than a rejected statement.
    pub fatal: bool,
    pub host: String,
    pub user: String,
    pub database: String,
}

impl ConnectionDiagnostics {
    pub fn new(error: &sqlx::Error, target: &ConnectionTarget) -> Self {
        let (code, sql_state, errno, fatal) = match error {
            sqlx::Error::Database(db_err) => match db_err.try_downcast_ref::<MySqlDatabaseError>() {
                Some(mysql) => (
                    Some(format!("{:?}", db_err.kind())),
                    mysql.code().map(str::to_string),
                    Some(mysql.number()),
                    false,
                ),
                None => (
                    Some(format!("{:?}", db_err.kind())),
                    db_err.code().map(|c| c.into_owned()),
                    None,
                    false,
                ),
            },
            sqlx::Error::Io(io_err) => (Some(format!("{:?}", io_err.kind())), None, None, true),
            sqlx::Error::Tls(_) => (Some("Tls".to_string()), None, None, true),
            sqlx::Error::Protocol(_) => (Some("Protocol".to_string()), None, None, true),
            sqlx::Error::PoolTimedOut => (Some("PoolTimedOut".to_string()), None, None, false),
            sqlx::Error::PoolClosed => (Some("PoolClosed".to_string()), None, None, true),
            _ => (None, None, None, false),
        };

        Self {
            message: error.to_string(),
            code,
            sql_state,
            errno,
            fatal,
            host: target.host.clone(),
            user: target.user.clone(),
            database: target.database.clone(),
        }
    }

    pub fn log(&self) {
        tracing::error!(
            reason = %self.message,
            code = ?self.code,
            state = ?self.sql_state,
            errno = ?self.errno,
            fatal = self.fatal,
            host = %self.host,
            user = %self.user,
            database = %self.database,
            "Database connection error."
        );
    }
}
