use crate::error::ConfigError;
use crate::settings::{CredentialEncoding, DatabaseSettings};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::fmt;

/// Standard alphabet, padding optional. The deployment tooling is not consistent
/// about trailing `=`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded, ready-to-use database credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl DatabaseSettings {
    /// Decodes every credential field according to `credential_encoding`.
    ///
    /// The encoding is an obfuscation step for the environment files, nothing more.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let encoding = self.credential_encoding;
        let credentials = Credentials {
            host: decode_field("database.host", &self.host, encoding)?,
            user: decode_field("database.user", &self.user, encoding)?,
            password: decode_field("database.password", &self.password, encoding)?,
            database: decode_field("database.name", &self.name, encoding)?,
        };

        for (field, value) in [
            ("database.host", &credentials.host),
            ("database.user", &credentials.user),
            ("database.name", &credentials.database),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must not be empty"
                )));
            }
        }

        Ok(credentials)
    }
}

fn decode_field(
    field: &'static str,
    raw: &str,
    encoding: CredentialEncoding,
) -> Result<String, ConfigError> {
    match encoding {
        CredentialEncoding::Plain => Ok(raw.to_string()),
        CredentialEncoding::Base64 => {
            let bytes = LENIENT_BASE64
                .decode(raw.trim())
                .map_err(|e| ConfigError::Decode {
                    field,
                    reason: e.to_string(),
                })?;
            String::from_utf8(bytes).map_err(|e| ConfigError::Decode {
                field,
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TlsMode;
    use rstest::rstest;

    fn settings(host: &str, user: &str, password: &str, name: &str) -> DatabaseSettings {
        DatabaseSettings {
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            credential_encoding: CredentialEncoding::Base64,
            port: 3306,
            max_connections: 10,
            acquire_timeout_secs: None,
            max_waiting: None,
            tls: TlsMode::Preferred,
        }
    }

    #[test]
    fn decodes_base64_fields() {
        // localhost / app / s3cret / signup
        let db = settings("bG9jYWxob3N0", "YXBw", "czNjcmV0", "c2lnbnVw");

        let credentials = db.credentials().unwrap();

        assert_eq!(credentials.host, "localhost");
        assert_eq!(credentials.user, "app");
        assert_eq!(credentials.password, "s3cret");
        assert_eq!(credentials.database, "signup");
    }

    #[rstest]
    #[case::padded("YXBwMQ==")]
    #[case::unpadded("YXBwMQ")]
    #[case::trailing_newline("YXBwMQ==\n")]
    fn padding_and_whitespace_are_tolerated(#[case] encoded: &str) {
        let db = settings("bG9jYWxob3N0", encoded, "", "c2lnbnVw");

        assert_eq!(db.credentials().unwrap().user, "app1");
    }

    #[test]
    fn plain_encoding_passes_values_through() {
        let mut db = settings("db.internal", "app", "pw", "signup");
        db.credential_encoding = CredentialEncoding::Plain;

        let credentials = db.credentials().unwrap();

        assert_eq!(credentials.host, "db.internal");
        assert_eq!(credentials.password, "pw");
    }

    #[test]
    fn invalid_base64_names_the_field() {
        let db = settings("bG9jYWxob3N0", "YXBw", "not base64!", "c2lnbnVw");

        match db.credentials() {
            Err(ConfigError::Decode { field, .. }) => assert_eq!(field, "database.password"),
            other => panic!("expected a decode error, got {other:?}"),
        }
    }

    #[test]
    fn empty_host_is_rejected() {
        let db = settings("", "YXBw", "", "c2lnbnVw");

        assert!(matches!(
            db.credentials(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let db = settings("bG9jYWxob3N0", "YXBw", "czNjcmV0", "c2lnbnVw");
        let credentials = db.credentials().unwrap();

        let rendered = format!("{credentials:?}");

        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("localhost"));
    }
}
