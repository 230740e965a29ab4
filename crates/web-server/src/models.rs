use database::NewUser;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// The body of `POST /register`.
///
/// Both fields are optional at the serde level so that a missing field is reported
/// as a validation failure rather than a parse failure. Unknown fields, `id` included,
/// are ignored.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(required, length(min = 1))]
    pub full_name: Option<String>,

    #[validate(required, length(min = 1))]
    pub mobile_number: Option<String>,
}

impl RegisterRequest {
    /// Checks presence of both fields and turns the request into a row to insert.
    pub fn into_new_user(self) -> Option<NewUser> {
        self.validate().ok()?;
        Some(NewUser {
            full_name: self.full_name?,
            mobile_number: self.mobile_number?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: u64,
}

impl RegisterResponse {
    pub fn created(user_id: u64) -> Self {
        Self {
            message: "Registration successful",
            user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            error: Some(error),
        }
    }
}
