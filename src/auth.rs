//! Shared-secret access gate.

use axum::http::{header, HeaderMap};

use crate::error::{ApiError, ApiResult};
use crate::models::LoginResponse;

/// Header the web client sends the credential in.
pub const TOKEN_HEADER: &str = "token";

#[derive(Clone)]
pub struct AccessGate {
    secret_key: String,
    login_password: String,
}

impl AccessGate {
    pub fn new(secret_key: impl Into<String>, login_password: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            login_password: login_password.into(),
        }
    }

    /// Exchange the passphrase for the credential. A wrong passphrase is a
    /// plain `success: false`, not an error, so the client can prompt again.
    pub fn login(&self, passphrase: &str) -> LoginResponse {
        if constant_time_eq(passphrase.as_bytes(), self.login_password.as_bytes()) {
            LoginResponse {
                success: true,
                credential: Some(self.secret_key.clone()),
            }
        } else {
            tracing::warn!("Rejected login attempt");
            LoginResponse {
                success: false,
                credential: None,
            }
        }
    }

    pub fn authorize(&self, credential: Option<&str>) -> ApiResult<()> {
        match credential {
            Some(c) if constant_time_eq(c.as_bytes(), self.secret_key.as_bytes()) => Ok(()),
            _ => Err(ApiError::unauthorized("Access forbidden")),
        }
    }
}

/// The credential from `token: <c>` or `Authorization: Bearer <c>`.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
