use serde::Deserialize;
use std::time::Duration;

/// The longest acquire timeout accepted, in seconds. An unset timeout waits this long.
///
/// The pool adds the timeout to the current instant, so it has to stay representable.
pub const MAX_ACQUIRE_TIMEOUT_SECS: u64 = 60 * 60 * 24 * 365;

/// The root configuration structure for the entire service.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Connection parameters for the MySQL pool.
///
/// `host`, `user`, `password` and `name` are held exactly as they were supplied,
/// i.e. still encoded. Call [`DatabaseSettings::credentials`] to obtain usable values.
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub credential_encoding: CredentialEncoding,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on connections open at the same time.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a caller may wait for a connection, including retries against an
    /// unreachable server. `None` waits without a deadline.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    /// How many callers may queue for a connection once all are checked out.
    /// `None` leaves the queue unbounded.
    #[serde(default)]
    pub max_waiting: Option<usize>,
    #[serde(default)]
    pub tls: TlsMode,
}

// The encoded secrets are only base64, so they must stay out of the logs too.
impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("credential_encoding", &self.credential_encoding)
            .field("port", &self.port)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("max_waiting", &self.max_waiting)
            .field("tls", &self.tls)
            .finish()
    }
}

impl DatabaseSettings {
    /// The deadline handed to the pool for every checkout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(MAX_ACQUIRE_TIMEOUT_SECS)
                .min(MAX_ACQUIRE_TIMEOUT_SECS),
        )
    }
}

/// How the credential fields are encoded in the configuration sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialEncoding {
    /// Standard base64, the format the deployment `.env` files use.
    #[default]
    Base64,
    Plain,
}

/// Transport security for connections to the database server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    Disabled,
    /// Encrypt when the server offers it. The server certificate is not validated.
    Preferred,
    /// Always encrypt. The server certificate is not validated.
    #[default]
    Required,
    VerifyCa,
    VerifyIdentity,
}

/// Settings for the HTTP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Mounts `GET /api/healthcheck` when true.
    #[serde(default = "default_true")]
    pub expose_healthcheck: bool,
    #[serde(default)]
    pub cors: CorsMode,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// Which cross-origin policy the router applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum CorsMode {
    /// Any origin; GET, POST, PUT and DELETE; `Content-Type` and `Authorization`; no credentials.
    #[default]
    Explicit,
    /// Mirror whatever the caller asks for.
    Permissive,
}

/// Controls the one-time actions performed before traffic is served.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapSettings {
    /// Abort startup when the `users` table cannot be created.
    #[serde(default)]
    pub schema_failure_fatal: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

// --- Default Implementations ---
// These allow whole sections to be omitted from config.toml.

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            expose_healthcheck: true,
            cors: CorsMode::default(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

fn default_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_body_limit() -> usize {
    100 * 1024
}

fn default_filter() -> String {
    "info".to_string()
}
