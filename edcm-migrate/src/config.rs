//! Run configuration for edcm-migrate
//!
//! Target connection settings arrive from the command line, the environment
//! (through clap's `env` support) and the TOML file. This module merges them
//! and decides whether the run has enough to talk to the target at all.

use edcm_common::config::{EngineSection, TargetSection};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// API version used when none is configured anywhere
pub const DEFAULT_API_VERSION: &str = "v23.2";

const DEFAULT_MAX_POLLS: u32 = 10;
const MIN_MAX_POLLS: u32 = 2;
const DEFAULT_POLL_BACKOFF_MS: u64 = 500;
const DEFAULT_POLL_BACKOFF_MAX_MS: u64 = 5000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Target connection settings as configured (possibly incomplete)
#[derive(Clone, Default)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub api_version: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl TargetConfig {
    /// Fill unset fields from the TOML `[target]` table
    ///
    /// Blank values count as unset.
    pub fn merged_with(self, section: &TargetSection) -> Self {
        fn pick(primary: Option<String>, fallback: &Option<String>) -> Option<String> {
            non_blank(primary).or_else(|| non_blank(fallback.clone()))
        }

        Self {
            host: pick(self.host, &section.host),
            api_version: pick(self.api_version, &section.api_version),
            username: pick(self.username, &section.username),
            password: pick(self.password, &section.password),
        }
    }

    /// Apply [`DEFAULT_API_VERSION`] when no version was configured
    pub fn with_default_api_version(mut self) -> Self {
        if non_blank(self.api_version.clone()).is_none() {
            self.api_version = Some(DEFAULT_API_VERSION.to_string());
        }
        self
    }

    /// Names of required keys that are absent or blank
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if non_blank(self.host.clone()).is_none() {
            missing.push("host");
        }
        if non_blank(self.api_version.clone()).is_none() {
            missing.push("api_version");
        }
        if non_blank(self.username.clone()).is_none() {
            missing.push("username");
        }
        if non_blank(self.password.clone()).is_none() {
            missing.push("password");
        }
        missing
    }

    /// Validate into [`Credentials`], or return the missing key names
    pub fn validate(&self) -> Result<Credentials, Vec<&'static str>> {
        let missing = self.missing_keys();
        if !missing.is_empty() {
            return Err(missing);
        }

        // All four are present and non-blank past this point
        let field = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        Ok(Credentials {
            host: field(&self.host),
            api_version: field(&self.api_version),
            username: field(&self.username),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Complete target connection settings
#[derive(Clone)]
pub struct Credentials {
    pub host: String,
    pub api_version: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Study/site/country identifiers carried by every target call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyContext {
    pub study_name: String,
    pub study_country: String,
    pub site: String,
}

/// Synchronization engine tuning
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum form-discovery polls per event
    pub max_polls: u32,
    /// Delay before the second poll
    pub poll_backoff: Duration,
    /// Ceiling for the doubling poll delay
    pub poll_backoff_max: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Minimum spacing between requests (zero disables throttling)
    pub min_request_interval: Duration,
    /// Create repeating item groups before their first item post
    pub precreate_repeating_item_groups: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_MAX_POLLS,
            poll_backoff: Duration::from_millis(DEFAULT_POLL_BACKOFF_MS),
            poll_backoff_max: Duration::from_millis(DEFAULT_POLL_BACKOFF_MAX_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            min_request_interval: Duration::ZERO,
            precreate_repeating_item_groups: false,
        }
    }
}

impl EngineSettings {
    /// Built-in defaults overridden by the TOML `[engine]` table
    pub fn from_section(section: &EngineSection) -> Self {
        let defaults = Self::default();
        let settings = Self {
            max_polls: section.max_polls.unwrap_or(defaults.max_polls),
            poll_backoff: section
                .poll_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_backoff),
            poll_backoff_max: section
                .poll_backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_backoff_max),
            request_timeout: section
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            min_request_interval: section
                .min_request_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_request_interval),
            precreate_repeating_item_groups: section
                .precreate_repeating_item_groups
                .unwrap_or(defaults.precreate_repeating_item_groups),
        };
        settings.sanitized()
    }

    /// Clamp values that would make discovery meaningless
    ///
    /// Stability needs two polls, so fewer than two can never converge.
    pub fn sanitized(mut self) -> Self {
        if self.max_polls < MIN_MAX_POLLS {
            warn!(
                configured = self.max_polls,
                using = MIN_MAX_POLLS,
                "max_polls too small for stability detection"
            );
            self.max_polls = MIN_MAX_POLLS;
        }
        if self.poll_backoff_max < self.poll_backoff {
            self.poll_backoff_max = self.poll_backoff;
        }
        self
    }

    /// Delay to use after `current`: doubled, capped at `poll_backoff_max`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.poll_backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> TargetConfig {
        TargetConfig {
            host: Some("acme.veevavault.com".to_string()),
            api_version: Some("v24.1".to_string()),
            username: Some("migrator".to_string()),
            password: Some("secret".to_string()),
        }
    }

    #[test]
    fn test_complete_config_validates() {
        let creds = full().validate().unwrap();
        assert_eq!(creds.host, "acme.veevavault.com");
        assert_eq!(creds.api_version, "v24.1");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_missing_password_reported() {
        let config = TargetConfig {
            password: None,
            ..full()
        };
        assert_eq!(config.validate().unwrap_err(), vec!["password"]);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = TargetConfig {
            host: Some("   ".to_string()),
            username: Some(String::new()),
            ..full()
        };
        assert_eq!(config.missing_keys(), vec!["host", "username"]);
    }

    #[test]
    fn test_merge_prefers_primary_and_falls_back_to_toml() {
        let cli = TargetConfig {
            host: Some("cli-host".to_string()),
            username: Some(" ".to_string()),
            ..TargetConfig::default()
        };
        let section = TargetSection {
            host: Some("toml-host".to_string()),
            api_version: None,
            username: Some("toml-user".to_string()),
            password: Some("toml-pass".to_string()),
        };

        let merged = cli.merged_with(&section);
        assert_eq!(merged.host.as_deref(), Some("cli-host"));
        assert_eq!(merged.username.as_deref(), Some("toml-user"));
        assert_eq!(merged.password.as_deref(), Some("toml-pass"));
        assert!(merged.api_version.is_none());
        assert_eq!(
            merged.with_default_api_version().api_version.as_deref(),
            Some(DEFAULT_API_VERSION)
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = full().validate().unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_engine_section_overrides_defaults() {
        let section = EngineSection {
            max_polls: Some(4),
            poll_backoff_ms: Some(0),
            ..EngineSection::default()
        };
        let settings = EngineSettings::from_section(&section);
        assert_eq!(settings.max_polls, 4);
        assert_eq!(settings.poll_backoff, Duration::ZERO);
        assert_eq!(settings.poll_backoff_max, Duration::from_millis(5000));
        assert!(!settings.precreate_repeating_item_groups);
    }

    #[test]
    fn test_max_polls_clamped() {
        let section = EngineSection {
            max_polls: Some(1),
            ..EngineSection::default()
        };
        assert_eq!(EngineSettings::from_section(&section).max_polls, 2);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let settings = EngineSettings::default();
        let first = settings.poll_backoff;
        let second = settings.next_backoff(first);
        assert_eq!(second, Duration::from_millis(1000));
        assert_eq!(
            settings.next_backoff(Duration::from_millis(4000)),
            Duration::from_millis(5000)
        );
    }
}
