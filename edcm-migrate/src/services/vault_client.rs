//! Vault CDMS REST client
//!
//! `reqwest` implementation of [`EdcApi`]. Write actions post JSON bodies of
//! the form `{"study_name": ..., "<list key>": [...]}`; authentication posts
//! form fields and returns a session id used verbatim as the
//! `Authorization` header.

use super::edc_client::{
    ActionResponse, AuthResponse, EdcApi, EdcError, EventDateEntry, EventScope, FormEntry,
    FormItemsEntry, FormListResponse, ItemGroupEntry, ResponseStatus, SessionToken,
    INVALID_SESSION_ERROR,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("edcm-migrate/", env!("CARGO_PKG_VERSION"));

/// Minimum spacing between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the interval
    async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Vault CDMS API client
pub struct VaultClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl VaultClient {
    /// Create a client for `host` and `api_version`
    ///
    /// `host` is normally a bare DNS name; a value already starting with
    /// `http://` or `https://` is used as the origin unchanged.
    pub fn new(
        host: &str,
        api_version: &str,
        timeout: Duration,
        min_request_interval: Duration,
    ) -> Result<Self, EdcError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EdcError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url(host, api_version),
            rate_limiter: RateLimiter::new(min_request_interval),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_action<T: Serialize + ?Sized>(
        &self,
        token: &SessionToken,
        path: &str,
        study: &str,
        list_key: &str,
        entries: &T,
    ) -> Result<ActionResponse, EdcError> {
        self.rate_limiter.wait().await;

        let mut body = Map::new();
        body.insert("study_name".to_string(), Value::String(study.to_string()));
        body.insert(
            list_key.to_string(),
            serde_json::to_value(entries).map_err(|e| EdcError::Parse(e.to_string()))?,
        );
        let url = self.url(path);
        tracing::debug!(url = %url, "POST");

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .header("Authorization", token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| EdcError::Network(e.to_string()))?;

        let action: ActionResponse = decode(response).await?;
        if action.is_invalid_session() {
            return Err(EdcError::SessionExpired(action.error_summary()));
        }
        Ok(action)
    }
}

fn base_url(host: &str, api_version: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let origin = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    format!("{}/api/{}", origin, api_version.trim())
}

/// Map HTTP status and decode the JSON body
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, EdcError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        let error_text = response.text().await.unwrap_or_default();
        return Err(EdcError::SessionExpired(error_text));
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(EdcError::Api(status.as_u16(), error_text));
    }

    let text = response
        .text()
        .await
        .map_err(|e| EdcError::Network(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| EdcError::Parse(e.to_string()))
}

#[async_trait::async_trait]
impl EdcApi for VaultClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionToken, EdcError> {
        self.rate_limiter.wait().await;

        let url = self.url("/auth");
        tracing::debug!(url = %url, username = %username, "Authenticating");

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| EdcError::Network(e.to_string()))?;

        let auth: AuthResponse = match decode(response).await {
            Err(EdcError::SessionExpired(text)) => return Err(EdcError::Authentication(text)),
            other => other?,
        };

        match auth.session_id {
            Some(session_id) if auth.response_status == ResponseStatus::Success => {
                tracing::info!("Authentication successful");
                Ok(SessionToken::new(session_id))
            }
            _ => {
                let reason = auth
                    .errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(EdcError::Authentication(if reason.is_empty() {
                    "no session id in response".to_string()
                } else {
                    reason
                }))
            }
        }
    }

    async fn set_event_date(
        &self,
        token: &SessionToken,
        study: &str,
        entry: &EventDateEntry,
    ) -> Result<ActionResponse, EdcError> {
        self.post_action(
            token,
            "/app/cdm/events/actions/setdate",
            study,
            "events",
            std::slice::from_ref(entry),
        )
        .await
    }

    async fn trigger_forms(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.post_action(token, "/app/cdm/forms", study, "forms", forms)
            .await
    }

    async fn get_forms(
        &self,
        token: &SessionToken,
        study: &str,
        scope: &EventScope,
    ) -> Result<Vec<String>, EdcError> {
        self.rate_limiter.wait().await;

        let url = self.url("/app/cdm/forms");
        tracing::debug!(url = %url, subject = %scope.subject, event = %scope.event_name, "GET forms");

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .header("Authorization", token.as_str())
            .query(&[
                ("study_name", study),
                ("study_country", scope.study_country.as_str()),
                ("site", scope.site.as_str()),
                ("subject", scope.subject.as_str()),
                ("eventgroup_name", scope.eventgroup_name.as_str()),
                ("event_name", scope.event_name.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EdcError::Network(e.to_string()))?;

        let listing: FormListResponse = decode(response).await?;
        if listing.response_status == ResponseStatus::Failure {
            let summary = listing
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            if listing
                .errors
                .iter()
                .any(|e| e.error_type.as_deref() == Some(INVALID_SESSION_ERROR))
            {
                return Err(EdcError::SessionExpired(summary));
            }
            return Err(EdcError::Api(200, summary));
        }

        Ok(listing.form_names())
    }

    async fn post_items(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormItemsEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.post_action(token, "/app/cdm/items", study, "forms", forms)
            .await
    }

    async fn submit_forms(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.post_action(token, "/app/cdm/forms/actions/submit", study, "forms", forms)
            .await
    }

    async fn create_item_group(
        &self,
        token: &SessionToken,
        study: &str,
        entry: &ItemGroupEntry,
    ) -> Result<ActionResponse, EdcError> {
        self.post_action(
            token,
            "/app/cdm/itemgroups",
            study,
            "itemgroups",
            std::slice::from_ref(entry),
        )
        .await
    }
}
