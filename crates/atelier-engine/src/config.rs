use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use atelier_contracts::events::EventWriter;
use atelier_contracts::storage::{DurableStorage, FileStorage};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.0-generate-001";
pub const DEFAULT_DATA_DIR: &str = "atelier-data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Dryrun,
    Gemini,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dryrun => "dryrun",
            Self::Gemini => "gemini",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dryrun" => Ok(Self::Dryrun),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown backend '{other}' (expected dryrun or gemini)")),
        }
    }
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub video_model: String,
    pub request_timeout: Duration,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("video_model", &self.video_model)
            .field("request_timeout", &self.request_timeout)
            .field("transport_retries", &self.transport_retries)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub events_path: Option<PathBuf>,
    pub storage_quota_bytes: Option<u64>,
    pub gemini: GeminiConfig,
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every setting through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| non_empty(lookup(key));

        let backend = get("ATELIER_BACKEND")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let data_dir = get("ATELIER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let events_path = get("ATELIER_EVENTS_PATH").map(PathBuf::from);
        let storage_quota_bytes = get("ATELIER_STORAGE_QUOTA_BYTES").and_then(|raw| raw.parse().ok());

        let gemini = GeminiConfig {
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            api_base: get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            image_model: get("ATELIER_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            text_model: get("ATELIER_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            video_model: get("ATELIER_VIDEO_MODEL").unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            request_timeout: Duration::from_secs_f64(clamped(
                get("ATELIER_REQUEST_TIMEOUT_S"),
                90.0,
                15.0,
                300.0,
            )),
            transport_retries: clamped(get("ATELIER_TRANSPORT_RETRIES"), 2.0, 0.0, 4.0).round()
                as usize,
            retry_backoff: Duration::from_millis(1200),
            poll_interval: Duration::from_secs(10),
            max_polls: 60,
        };

        Self {
            backend,
            data_dir,
            events_path,
            storage_quota_bytes,
            gemini,
        }
    }

    pub fn open_storage(&self) -> Arc<dyn DurableStorage> {
        Arc::new(FileStorage::new(&self.data_dir).with_quota(self.storage_quota_bytes))
    }

    pub fn event_writer(&self, session_id: impl Into<String>) -> EventWriter {
        let path = self
            .events_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("events.jsonl"));
        EventWriter::new(path, session_id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clamped(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = StudioConfig::from_lookup(|_| None);
        assert_eq!(config.backend, BackendKind::Dryrun);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.gemini.api_key, None);
        assert_eq!(config.gemini.api_base, DEFAULT_GEMINI_API_BASE);
        assert_eq!(config.gemini.request_timeout, Duration::from_secs(90));
        assert_eq!(config.gemini.transport_retries, 2);
        assert_eq!(config.storage_quota_bytes, None);
    }

    #[test]
    fn env_values_are_trimmed_clamped_and_fall_back() {
        let config = StudioConfig::from_lookup(lookup(&[
            ("ATELIER_BACKEND", " Gemini "),
            ("GEMINI_API_KEY", "   "),
            ("GOOGLE_API_KEY", "g-key"),
            ("GEMINI_API_BASE", "http://localhost:9000/v1/"),
            ("ATELIER_REQUEST_TIMEOUT_S", "5"),
            ("ATELIER_TRANSPORT_RETRIES", "nope"),
            ("ATELIER_STORAGE_QUOTA_BYTES", "4096"),
            ("ATELIER_DATA_DIR", "/tmp/atelier"),
        ]));
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.gemini.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.gemini.api_base, "http://localhost:9000/v1");
        assert_eq!(config.gemini.request_timeout, Duration::from_secs(15));
        assert_eq!(config.gemini.transport_retries, 2);
        assert_eq!(config.storage_quota_bytes, Some(4096));
        assert_eq!(
            config.event_writer("s").path(),
            Some(PathBuf::from("/tmp/atelier/events.jsonl").as_path())
        );
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let config = StudioConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "secret-value")]));
        let rendered = format!("{:?}", config.gemini);
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
