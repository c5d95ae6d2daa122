pub mod cache;
pub mod clock;
pub mod grant;

pub use cache::AccessTokenCache;
pub use clock::{Clock, SystemClock};
pub use grant::{CredentialsRequest, Grant};

use reqwest::StatusCode;
use thiserror::Error;

/// Failures while obtaining an access token.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("missing credentials: {0}")]
    Missing(String),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Exchange { status: StatusCode, body: String },

    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}
