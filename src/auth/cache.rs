use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::clock::Clock;
use super::grant::{CredentialsRequest, Grant, TokenResponse};
use super::CredentialError;

/// Holds at most one OAuth2 grant and renews it when it has expired.
///
/// The grant slot stays locked for the duration of a renewal, so callers
/// arriving while a token is being fetched wait for that fetch instead of
/// starting their own.
pub struct AccessTokenCache {
    http: Client,
    token_url: String,
    credentials: CredentialsRequest,
    clock: Arc<dyn Clock>,
    grant: Mutex<Option<Grant>>,
}

impl AccessTokenCache {
    pub fn new(
        http: Client,
        token_url: impl Into<String>,
        credentials: CredentialsRequest,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            clock,
            grant: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new grant first if none is
    /// held or the held one has expired.
    ///
    /// # Errors
    ///
    /// Returns the renewal failure. A previously held grant is kept in that
    /// case, and the next call tries to renew again.
    pub async fn get_access_token(&self) -> Result<String, CredentialError> {
        let mut slot = self.grant.lock().await;
        let now = self.clock.now();

        match slot.as_ref() {
            Some(grant) if !grant.is_expired_at(now) => {
                return Ok(grant.access_token.clone());
            }
            Some(grant) => debug!(expired_at = %grant.expires_at(), "access token expired"),
            None => debug!("no access token held yet"),
        }

        let grant = self.renew().await?;
        let token = grant.access_token.clone();
        *slot = Some(grant);
        Ok(token)
    }

    /// Token of the currently held grant, expired or not.
    pub async fn cached_token(&self) -> Option<String> {
        self.grant
            .lock()
            .await
            .as_ref()
            .map(|g| g.access_token.clone())
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.grant.lock().await.as_ref().map(Grant::expires_at)
    }

    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn renew(&self) -> Result<Grant, CredentialError> {
        let response = self
            .http
            .post(&self.token_url)
            .json(&self.credentials)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Exchange { status, body });
        }

        let body = response.bytes().await?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(CredentialError::MalformedResponse(
                "empty access_token".to_owned(),
            ));
        }

        let grant = Grant::from_response(token, self.clock.now())?;
        info!(expires_at = %grant.expires_at(), scope = %grant.scope, "access token renewed");
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::clock::ManualClock;

    const TOKEN_PATH: &str = "/oauth/token/";

    fn credentials() -> CredentialsRequest {
        CredentialsRequest::client_credentials("client", "secret", "https://api.test/")
    }

    fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "token_type": "Bearer",
            "scope": "collect:data",
            "expires_in": expires_in,
        })
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn cache_for(server: &MockServer, clock: Arc<ManualClock>) -> AccessTokenCache {
        AccessTokenCache::new(
            Client::new(),
            format!("{}{}", server.uri(), TOKEN_PATH),
            credentials(),
            clock,
        )
    }

    #[tokio::test]
    async fn first_call_renews_once_then_serves_cached_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_json(serde_json::to_value(credentials()).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first", 10)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::at(start()));
        let cache = cache_for(&server, clock.clone());

        assert_eq!(cache.cached_token().await, None);
        assert_eq!(cache.get_access_token().await.unwrap(), "first");

        clock.advance(Duration::seconds(9));
        assert_eq!(cache.get_access_token().await.unwrap(), "first");
        assert_eq!(
            cache.expires_at().await,
            Some(start() + Duration::seconds(10))
        );
    }

    #[tokio::test]
    async fn renews_once_expiry_is_reached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first", 10)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("second", 10)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::at(start()));
        let cache = cache_for(&server, clock.clone());

        assert_eq!(cache.get_access_token().await.unwrap(), "first");

        clock.advance(Duration::seconds(10));
        assert_eq!(cache.get_access_token().await.unwrap(), "second");
        assert_eq!(cache.get_access_token().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn failed_renewal_keeps_previous_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first", 10)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::at(start()));
        let cache = cache_for(&server, clock.clone());
        cache.get_access_token().await.unwrap();

        clock.advance(Duration::seconds(30));
        let err = cache.get_access_token().await.unwrap_err();
        match err {
            CredentialError::Exchange { status, body } => {
                assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(cache.cached_token().await.as_deref(), Some("first"));
        // still expired, so the next call goes back to the endpoint
        assert!(cache.get_access_token().await.is_err());
    }

    #[tokio::test]
    async fn malformed_token_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(ManualClock::at(start())));
        let err = cache.get_access_token().await.unwrap_err();

        assert!(matches!(err, CredentialError::MalformedResponse(_)));
        assert_eq!(cache.cached_token().await, None);
    }

    #[tokio::test]
    async fn huge_expires_in_fails_renewal_instead_of_panicking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", i64::MAX)))
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(ManualClock::at(start())));
        let err = cache.get_access_token().await.unwrap_err();

        assert!(matches!(err, CredentialError::MalformedResponse(_)));
        assert_eq!(cache.cached_token().await, None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let cache = AccessTokenCache::new(
            Client::new(),
            "http://127.0.0.1:1/oauth/token/",
            credentials(),
            Arc::new(ManualClock::at(start())),
        );

        let err = cache.get_access_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Transport(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared", 60))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(cache_for(&server, Arc::new(ManualClock::at(start()))));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_access_token().await }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "shared");
        }
    }
}
