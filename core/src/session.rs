// Authenticated session
//
// Built once from the login response and handed explicitly to every API call.
// Logout consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin", alias = "ADMIN")]
    Admin,
    #[serde(rename = "caregiver", alias = "CAREGIVER")]
    Caregiver,
    #[serde(rename = "dependent", alias = "DEPENDENT")]
    Dependent,
}

/// Body of `POST /login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /login`
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl Session {
    pub fn new(token: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let email = email.into();
        Self {
            token: token.into(),
            full_name: email.clone(),
            email,
            role,
        }
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl From<LoginResponse> for Session {
    fn from(resp: LoginResponse) -> Self {
        Self {
            token: resp.access_token,
            email: resp.email,
            full_name: resp.full_name,
            role: resp.role,
        }
    }
}

// Token stays out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .finish()
    }
}
