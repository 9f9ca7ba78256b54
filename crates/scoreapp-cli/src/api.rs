//! Snapshot and race control API client
//!
//! Thin reqwest wrapper around the backend's JSON REST endpoints. Every
//! failure is normalized into an [`ApiError`] so callers only ever deal with
//! `{code, message, status}`:
//!
//! - no response at all: `fetch_failed`
//! - empty body on an unsuccessful response: `unknown_error`
//! - body that is not JSON: `parse_error`
//! - unsuccessful response: the server's `{code, message}` when present

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scoreapp_core::{ApiError, Crossing, CrossingId, CrossingTeam, FullRace, Race, RaceId};

use crate::cli::RaceAction;
use crate::config::ApiConfig;
use crate::error::{CliError, Result};

const APPLICATION_JSON: &str = "application/json";

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `POST /crossings/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossingUpdate {
    pub ignored: bool,
    pub team: CrossingTeam,
    pub interrupted: bool,
}

/// Error body the backend sends with unsuccessful responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RaceApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RaceApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CliError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.rest_url.clone(),
            token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_races(&self) -> ApiResult<Vec<Race>> {
        let races = self.execute(self.get("/races"), false).await?;
        Ok(races.unwrap_or_default())
    }

    /// Fetch one race with its crossings; `None` when the backend does not know it
    pub async fn find_race(&self, id: RaceId) -> ApiResult<Option<FullRace>> {
        self.execute(self.get(&format!("/races/{}", id)), true).await
    }

    pub async fn set_race_state(&self, id: RaceId, action: RaceAction) -> ApiResult<FullRace> {
        let path = format!("/races/{}/{}", id, action.as_path());
        required(self.execute(self.post(&path), false).await?)
    }

    pub async fn update_crossing(
        &self,
        id: CrossingId,
        update: CrossingUpdate,
    ) -> ApiResult<Crossing> {
        let path = format!("/crossings/{}", id);
        let request = self.post(&path).json(&update);
        required(self.execute(request, false).await?)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, APPLICATION_JSON)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(ACCEPT, APPLICATION_JSON);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        not_found_as_none: bool,
    ) -> ApiResult<Option<T>> {
        let response = request.send().await.map_err(|e| {
            warn!("Request failed: {}", e);
            ApiError::fetch_failed(format!(
                "The request failed. Possibly due to a network error: {}",
                e
            ))
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::fetch_failed(format!("Failed to read response body: {}", e)))?;

        debug!("{} {} ({} bytes)", status.as_u16(), url, body.len());
        interpret_response(status, content_type.as_deref(), &body, not_found_as_none)
    }
}

fn required<T>(value: Option<T>) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::new(ApiError::UNKNOWN_ERROR, "Response body is empty", None))
}

// ----------------------------------------------------------------------------
// Response Interpretation
// ----------------------------------------------------------------------------

/// Map a received response onto a value, absence, or a normalized error
pub fn interpret_response<T: DeserializeOwned>(
    status: StatusCode,
    content_type: Option<&str>,
    body: &str,
    not_found_as_none: bool,
) -> ApiResult<Option<T>> {
    let code = status.as_u16();

    if body.trim().is_empty() {
        if !status.is_success() {
            return Err(ApiError::unknown(code));
        }
        return Ok(None);
    }

    if not_found_as_none && status == StatusCode::NOT_FOUND {
        // Still has to be JSON, like every other body
        serde_json::from_str::<serde_json::Value>(body)
            .map_err(|e| parse_error(&e, content_type, code))?;
        return Ok(None);
    }

    if !status.is_success() {
        let error: ErrorBody = serde_json::from_str::<serde_json::Value>(body)
            .map_err(|e| parse_error(&e, content_type, code))
            .map(|value| serde_json::from_value(value).unwrap_or_default())?;
        return Err(ApiError::new(
            error.code.unwrap_or_else(|| ApiError::UNKNOWN_ERROR.to_string()),
            error
                .message
                .unwrap_or_else(|| format!("Response status is {}", code)),
            Some(code),
        ));
    }

    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| parse_error(&e, content_type, code))
}

fn parse_error(err: &serde_json::Error, content_type: Option<&str>, status: u16) -> ApiError {
    ApiError::parse_error(
        format!(
            "An error occurred while parsing JSON: {}. Content-Type: {}",
            err,
            content_type.unwrap_or("none")
        ),
        status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreapp_core::RaceState;

    const RACE: &str = r#"{
        "id": 4, "updatedAt": 100, "type": "time_trial", "state": "running",
        "teamABarrierId": 1, "crossings": []
    }"#;

    #[test]
    fn test_success_decodes_body() {
        let race: Option<FullRace> =
            interpret_response(StatusCode::OK, Some(APPLICATION_JSON), RACE, true).unwrap();
        let race = race.unwrap();
        assert_eq!(race.id, 4);
        assert_eq!(race.state, RaceState::Running);
    }

    #[test]
    fn test_not_found_becomes_none_when_requested() {
        let body = r#"{"message":"race with id 4 not found"}"#;
        let race: Option<FullRace> =
            interpret_response(StatusCode::NOT_FOUND, None, body, true).unwrap();
        assert!(race.is_none());

        let err = interpret_response::<FullRace>(StatusCode::NOT_FOUND, None, body, false)
            .unwrap_err();
        assert_eq!(err.code, ApiError::UNKNOWN_ERROR);
        assert_eq!(err.message, "race with id 4 not found");
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn test_server_error_code_is_kept() {
        let body = r#"{"code":"invalid_state","message":"race already finished"}"#;
        let err = interpret_response::<FullRace>(StatusCode::BAD_REQUEST, None, body, false)
            .unwrap_err();
        assert_eq!(err.code, "invalid_state");
        assert_eq!(err.message, "race already finished");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_empty_body() {
        let err =
            interpret_response::<FullRace>(StatusCode::UNAUTHORIZED, None, "", false).unwrap_err();
        assert_eq!(err, ApiError::unknown(401));

        let value: Option<FullRace> =
            interpret_response(StatusCode::NO_CONTENT, None, "", false).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_non_json_body_is_a_parse_error() {
        let err = interpret_response::<FullRace>(
            StatusCode::BAD_GATEWAY,
            Some("text/html"),
            "<html>bad gateway</html>",
            false,
        )
        .unwrap_err();
        assert_eq!(err.code, ApiError::PARSE_ERROR);
        assert_eq!(err.status, Some(502));
        assert!(err.message.contains("text/html"));
    }

    #[test]
    fn test_error_body_without_fields() {
        let err = interpret_response::<FullRace>(StatusCode::INTERNAL_SERVER_ERROR, None, "[]", false)
            .unwrap_err();
        assert_eq!(err, ApiError::unknown(500));
    }

    #[test]
    fn test_crossing_update_body() {
        let update = CrossingUpdate {
            ignored: true,
            team: CrossingTeam::B,
            interrupted: false,
        };
        let value = serde_json::to_value(update).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"ignored": true, "team": 2, "interrupted": false})
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fetch_failed() {
        let api = RaceApi::new(&ApiConfig {
            rest_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 2_000,
            ..ApiConfig::default()
        })
        .unwrap();
        let err = api.find_race(1).await.unwrap_err();
        assert_eq!(err.code, ApiError::FETCH_FAILED);
        assert_eq!(err.status, None);
    }
}
