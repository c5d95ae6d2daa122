//! OAuth2 client-credentials wire types and the cached grant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CredentialError;

pub const CLIENT_CREDENTIALS_GRANT_TYPE: &str = "client_credentials";

/// Body POSTed to the token endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialsRequest {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub grant_type: String,
}

impl CredentialsRequest {
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: audience.into(),
            grant_type: CLIENT_CREDENTIALS_GRANT_TYPE.to_owned(),
        }
    }
}

/// Token endpoint response. `expires_in` is in seconds.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: i64,
}

/// A fetched access token together with the moment it was issued.
#[derive(Debug, Clone)]
pub struct Grant {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub expires_in: Duration,
    expires_at: DateTime<Utc>,
}

impl Grant {
    /// Build a grant from a token response received at `issued_at`.
    ///
    /// # Errors
    ///
    /// [`CredentialError::MalformedResponse`] when `expires_in` is negative
    /// or too large to place on the calendar.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, CredentialError> {
        let lifetime = (response.expires_in >= 0)
            .then(|| Duration::try_seconds(response.expires_in))
            .flatten();
        let expires_at = lifetime.and_then(|d| issued_at.checked_add_signed(d));

        let (Some(expires_in), Some(expires_at)) = (lifetime, expires_at) else {
            return Err(CredentialError::MalformedResponse(format!(
                "expires_in out of range: {}",
                response.expires_in
            )));
        };

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            scope: response.scope,
            issued_at,
            expires_in,
            expires_at,
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A grant is expired from `issued_at + expires_in` onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}
