// Configuration for the command-line client

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use tts_core::{SessionConfig, TruncationPolicy, DEFAULT_VOICE};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Option<String>,
    pub settings_url: Option<String>,
    pub voice: String,
    pub output: Option<PathBuf>,
    pub idle_timeout_secs: Option<u64>,
    pub truncation: TruncationPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            settings_url: None,
            voice: DEFAULT_VOICE.to_string(),
            output: None,
            idle_timeout_secs: None,
            truncation: TruncationPolicy::Drop,
        }
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `TTS_TRUNCATION`; an unknown value keeps the default and is reported.
fn truncation_policy(value: Option<&str>) -> TruncationPolicy {
    match value.map(str::parse::<TruncationPolicy>) {
        None => TruncationPolicy::default(),
        Some(Ok(policy)) => policy,
        Some(Err(e)) => {
            warn!("Ignoring TTS_TRUNCATION: {e}");
            TruncationPolicy::default()
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let endpoint = non_empty("TTS_URL");
        let settings_url = non_empty("TTS_SETTINGS_URL");

        let voice = non_empty("TTS_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let output = non_empty("TTS_OUTPUT").map(PathBuf::from);

        let idle_timeout_secs = std::env::var("TTS_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0);

        let truncation = truncation_policy(non_empty("TTS_TRUNCATION").as_deref());

        Self {
            endpoint,
            settings_url,
            voice,
            output,
            idle_timeout_secs,
            truncation,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Session configuration once the endpoint is known.
    pub fn session_config(&self, endpoint: Option<String>) -> SessionConfig {
        SessionConfig {
            endpoint,
            voice: self.voice.clone(),
            truncation: self.truncation,
        }
    }
}
