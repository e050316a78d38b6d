//! Target EDC client seam
//!
//! [`EdcApi`] mirrors the target's case-data REST surface one method per
//! call. The engine only talks to this trait, so runs can be driven against
//! the real [`VaultClient`](super::vault_client::VaultClient) or a scripted
//! fake.
//!
//! Response types are decoded defensively: every field is optional or
//! defaulted, and unknown status strings decode to
//! [`ResponseStatus::Unknown`] instead of failing the whole response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error type returned for a session that the target no longer accepts
pub const INVALID_SESSION_ERROR: &str = "INVALID_SESSION_ID";

/// Target client errors
#[derive(Debug, Clone, Error)]
pub enum EdcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Session credential returned by authentication
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

// ============================================================================
// Request types
// ============================================================================

/// Location of one event for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventScope {
    pub study_country: String,
    pub site: String,
    pub subject: String,
    pub eventgroup_name: String,
    pub event_name: String,
}

/// Set-event-date entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDateEntry {
    #[serde(flatten)]
    pub scope: EventScope,
    /// ISO `YYYY-MM-DD`
    pub date: String,
}

/// A form under an event (trigger and submit calls)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormEntry {
    #[serde(flatten)]
    pub scope: EventScope,
    pub form_name: String,
}

/// One item value within a form payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemEntry {
    pub itemgroup_name: String,
    pub item_name: String,
    pub value: String,
}

/// Items for one form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormItemsEntry {
    #[serde(flatten)]
    pub scope: EventScope,
    pub form_name: String,
    pub items: Vec<ItemEntry>,
}

/// Item group instance to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemGroupEntry {
    #[serde(flatten)]
    pub scope: EventScope,
    pub form_name: String,
    pub itemgroup_name: String,
}

// ============================================================================
// Response types
// ============================================================================

/// `responseStatus` values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failure,
    Warning,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Request-level error entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiErrorEntry {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
}

impl fmt::Display for ApiErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error_type.as_deref().unwrap_or("N/A"),
            self.message.as_deref().unwrap_or("N/A")
        )
    }
}

/// Per-item result of an item post
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemResult {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<Value>,
    pub subject: Option<String>,
    pub eventgroup_name: Option<String>,
    pub event_name: Option<String>,
    pub form_name: Option<String>,
    pub itemgroup_name: Option<String>,
    pub item_name: Option<String>,
    pub value: Option<Value>,
}

/// Per-event result of a set-event-date call
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EventResult {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<Value>,
    pub subject: Option<String>,
    pub eventgroup_name: Option<String>,
    pub event_name: Option<String>,
    pub date: Option<String>,
}

/// Per-form result of trigger and submit calls
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormResult {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<Value>,
    pub subject: Option<String>,
    pub eventgroup_name: Option<String>,
    pub event_name: Option<String>,
    pub form_name: Option<String>,
}

/// Response body for every write action
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActionResponse {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    #[serde(rename = "responseMessage")]
    pub response_message: Option<String>,
    pub errors: Vec<ApiErrorEntry>,
    pub items: Vec<ItemResult>,
    pub events: Vec<EventResult>,
    pub forms: Vec<FormResult>,
}

impl ActionResponse {
    /// Response with `SUCCESS` status and no per-entry results
    pub fn success() -> Self {
        Self {
            response_status: ResponseStatus::Success,
            ..Self::default()
        }
    }

    /// True when the target rejected the session token
    pub fn is_invalid_session(&self) -> bool {
        self.response_status == ResponseStatus::Failure
            && self
                .errors
                .iter()
                .any(|e| e.error_type.as_deref() == Some(INVALID_SESSION_ERROR))
    }

    /// True for a request-level failure carrying no per-entry results
    pub fn is_request_failure(&self) -> bool {
        self.response_status == ResponseStatus::Failure
            && self.items.is_empty()
            && self.events.is_empty()
            && self.forms.is_empty()
    }

    /// Request-level errors joined for logging
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return self
                .response_message
                .clone()
                .unwrap_or_else(|| "N/A".to_string());
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Authentication response body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub errors: Vec<ApiErrorEntry>,
}

/// One entry of a form listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormListing {
    pub form_name: Option<String>,
}

/// Get-forms response body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormListResponse {
    #[serde(rename = "responseStatus")]
    pub response_status: ResponseStatus,
    pub errors: Vec<ApiErrorEntry>,
    pub forms: Vec<FormListing>,
}

impl FormListResponse {
    /// Distinct form names in listing order
    pub fn form_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.forms.iter().filter_map(|f| f.form_name.as_ref()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Render an `errorMessage` / `value` field for a log line
pub fn display_value(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ============================================================================
// Client trait
// ============================================================================

/// Target case-data REST surface
///
/// Every call after [`authenticate`](EdcApi::authenticate) carries the
/// session token and the study name. Scoped entries carry country, site,
/// subject, event group and event.
#[async_trait::async_trait]
pub trait EdcApi: Send + Sync {
    /// Exchange username/password for a session token
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<SessionToken, EdcError>;

    /// Set the effective date of one event
    async fn set_event_date(
        &self,
        token: &SessionToken,
        study: &str,
        entry: &EventDateEntry,
    ) -> Result<ActionResponse, EdcError>;

    /// Explicitly create forms the target would not spawn by itself
    async fn trigger_forms(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError>;

    /// Current form names under an event
    async fn get_forms(
        &self,
        token: &SessionToken,
        study: &str,
        scope: &EventScope,
    ) -> Result<Vec<String>, EdcError>;

    /// Write item values for one or more forms
    async fn post_items(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormItemsEntry],
    ) -> Result<ActionResponse, EdcError>;

    /// Submit (finalize) forms
    async fn submit_forms(
        &self,
        token: &SessionToken,
        study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError>;

    /// Instantiate an item group within a form
    async fn create_item_group(
        &self,
        token: &SessionToken,
        study: &str,
        entry: &ItemGroupEntry,
    ) -> Result<ActionResponse, EdcError>;
}
