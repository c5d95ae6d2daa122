use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};

use super::graphql::{GraphqlRequest, GraphqlResponse};

/// Why a submission did not go through.
///
/// Everything except [`SubmissionError::Remote`] is a transport-level
/// failure; `Remote` means the API understood the request and rejected it.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed response envelope: {reason}, body: {body}")]
    MalformedResponse { reason: String, body: String },

    #[error("graphql error: {0}")]
    Remote(String),
}

impl SubmissionError {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Thin wrapper around a shared `reqwest::Client` that performs one
/// authenticated query/variables exchange per call.
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    http: Client,
}

impl SubmissionClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// POST `request` to `endpoint` with a bearer `token`.
    ///
    /// # Errors
    ///
    /// Connection failures, non-2xx statuses and undecodable bodies map to
    /// the transport variants; a decoded envelope with any entry in `errors`
    /// maps to [`SubmissionError::Remote`] with the first message.
    #[instrument(skip(self, request, token))]
    pub async fn submit(
        &self,
        endpoint: &str,
        request: &GraphqlRequest,
        token: &str,
    ) -> Result<GraphqlResponse, SubmissionError> {
        let response = self
            .http
            .post(endpoint)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(SubmissionError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let envelope: GraphqlResponse =
            serde_json::from_slice(&body).map_err(|e| SubmissionError::MalformedResponse {
                reason: e.to_string(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })?;

        if let Some(first) = envelope.errors.first() {
            return Err(SubmissionError::Remote(first.message.clone()));
        }

        debug!(%status, "submission accepted");
        Ok(envelope)
    }
}
