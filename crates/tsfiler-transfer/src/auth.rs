//! Session login
//!
//! Exchanges email/password for a bearer token. The token is held as a
//! `SecretString` from the moment it leaves the response body.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use tsfiler_core::{TsfilerError, TsfilerResult};

use crate::client::ServiceClient;

/// Account credentials for the login exchange.
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Log in and return the session token.
///
/// A `{error}` body, a body without a token, or a 400/401/403 status all
/// fail with `Authentication`.
pub async fn login(client: &ServiceClient, creds: &Credentials) -> TsfilerResult<SecretString> {
    debug!(email = %creds.email, "authenticating");
    let resp = client
        .authenticate(&creds.email, creds.password.expose_secret())
        .await?;

    if let Some(error) = resp.error {
        return Err(TsfilerError::Authentication(error));
    }
    match resp.token {
        Some(token) if !token.is_empty() => {
            info!(email = %creds.email, "authenticated");
            Ok(SecretString::from(token))
        }
        _ => Err(TsfilerError::Authentication(
            "login response carried no token".into(),
        )),
    }
}
