//! # Registrar Configuration Crate
//!
//! Loads the layered service settings and decodes the database credentials.
//!
//! Sources, lowest precedence first:
//!
//! 1. serde defaults on the settings structs;
//! 2. a TOML file (`config.toml` in the working directory unless a path is given);
//! 3. `REGISTRAR__<SECTION>__<KEY>` environment variables;
//! 4. the deployment variables `DB_HOST`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`.

use config::{Environment, File, FileFormat, Map};
use std::path::Path;

// Declare the modules that make up this crate.
pub mod credentials;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use credentials::Credentials;
pub use error::ConfigError;
pub use logging::{init_tracing, install_panic_hook};
pub use settings::{
    BootstrapSettings, CorsMode, CredentialEncoding, DatabaseSettings, LoggingSettings,
    ServerSettings, Settings, TlsMode, MAX_ACQUIRE_TIMEOUT_SECS,
};

const ENV_PREFIX: &str = "REGISTRAR";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// The unprefixed variables the deployment environment already provides.
const DEPLOYMENT_VARS: [(&str, &str); 4] = [
    ("DB_HOST", "database.host"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_NAME", "database.name"),
];

/// Loads the service configuration.
///
/// With `path` the file must exist. Without it, `config.toml` is read if present.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let env: Map<String, String> = std::env::vars().collect();
    match path {
        Some(path) => assemble(File::from(path).required(true), env),
        None => assemble(
            File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
            env,
        ),
    }
}

/// Builds the settings from an explicit file source and environment map.
fn assemble<S>(file: S, env: Map<String, String>) -> Result<Settings, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let mut builder = config::Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(env.clone())),
    );

    for (var, key) in DEPLOYMENT_VARS {
        builder = builder.set_override_option(key, env.get(var).cloned())?;
    }

    let settings = builder.build()?.try_deserialize::<Settings>()?;

    if settings.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }

    if let Some(secs) = settings.database.acquire_timeout_secs {
        if secs == 0 || secs > MAX_ACQUIRE_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "database.acquire_timeout_secs must be between 1 and {MAX_ACQUIRE_TIMEOUT_SECS}, got {secs}"
            )));
        }
    }

    Ok(settings)
}
