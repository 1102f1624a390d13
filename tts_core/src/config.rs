// Session configuration and endpoint resolution

use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SessionError;

/// Voice used when the caller does not pick one.
pub const DEFAULT_VOICE: &str = "af_sky";

/// Title of the settings section that holds the synthesis endpoint.
pub const TTS_SETTINGS_SECTION: &str = "Text-To-Speech";

/// What to do when the stream closes in the middle of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Log and record the truncation, finish the session normally.
    #[default]
    Drop,
    /// Fail the session.
    Fail,
}

impl FromStr for TruncationPolicy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(TruncationPolicy::Drop),
            "fail" => Ok(TruncationPolicy::Fail),
            other => Err(SessionError::Configuration(format!(
                "unknown truncation policy: {other}. Expected drop or fail"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Option<String>,
    pub voice: String,
    pub truncation: TruncationPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            voice: DEFAULT_VOICE.to_string(),
            truncation: TruncationPolicy::Drop,
        }
    }
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_truncation_policy(mut self, policy: TruncationPolicy) -> Self {
        self.truncation = policy;
        self
    }

    /// The endpoint as a URL. Fails when it is missing or unparsable.
    pub fn endpoint_url(&self) -> Result<Url, SessionError> {
        match self.endpoint.as_deref() {
            Some(raw) => normalize_endpoint(raw),
            None => Err(SessionError::Configuration(
                "TTS endpoint is not configured".to_string(),
            )),
        }
    }
}

/// Parse an endpoint as stored in settings. Bare `host:port` values get an
/// `http://` scheme and trailing slashes are removed.
pub fn normalize_endpoint(raw: &str) -> Result<Url, SessionError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SessionError::Configuration(
            "TTS endpoint is empty".to_string(),
        ));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| SessionError::Configuration(format!("invalid TTS endpoint {raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::Configuration(format!(
            "unsupported TTS endpoint scheme: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

#[derive(Deserialize)]
struct SettingsEnvelope {
    settings: Settings,
}

#[derive(Deserialize)]
struct Settings {
    #[serde(default)]
    sections: Vec<SettingsSection>,
}

#[derive(Deserialize)]
struct SettingsSection {
    title: String,
    #[serde(default)]
    fields: Vec<SettingsField>,
}

#[derive(Deserialize)]
struct SettingsField {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    value: serde_json::Value,
}

/// Pick the synthesis endpoint out of a settings document.
pub fn endpoint_from_settings(body: &str) -> Result<String, SessionError> {
    let envelope: SettingsEnvelope = serde_json::from_str(body)
        .map_err(|e| SessionError::Configuration(format!("malformed settings: {e}")))?;
    let section = envelope
        .settings
        .sections
        .into_iter()
        .find(|s| s.title == TTS_SETTINGS_SECTION)
        .ok_or_else(|| {
            SessionError::Configuration("Text-To-Speech settings are missing".to_string())
        })?;

    let mut fields = section.fields;
    let index = fields
        .iter()
        .position(|f| f.id.as_deref() == Some("tts_url"))
        .unwrap_or(0);
    if fields.is_empty() {
        return Err(SessionError::Configuration(
            "Text-To-Speech settings have no fields".to_string(),
        ));
    }
    match fields.swap_remove(index).value {
        serde_json::Value::String(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(SessionError::Configuration(
            "Text-To-Speech endpoint is not set".to_string(),
        )),
    }
}

/// Fetch the endpoint from a settings service (`GET {settings_url}/settings_get`).
pub async fn fetch_endpoint(
    client: &reqwest::Client,
    settings_url: &str,
) -> Result<String, SessionError> {
    let base = normalize_endpoint(settings_url)?;
    let url = format!("{}/settings_get", base.as_str().trim_end_matches('/'));
    debug!("Fetching TTS settings from {url}");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SessionError::Transport(format!("failed to fetch settings: {e}")))?;
    if !response.status().is_success() {
        return Err(SessionError::Configuration(format!(
            "failed to fetch settings: {}",
            response.status()
        )));
    }
    let body = response
        .text()
        .await
        .map_err(|e| SessionError::Transport(format!("failed to read settings: {e}")))?;

    let endpoint = endpoint_from_settings(&body)?;
    info!("TTS endpoint resolved from settings: {endpoint}");
    Ok(endpoint)
}
