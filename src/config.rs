use crate::store::SyncConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `api_url`.
pub const API_URL_ENV: &str = "SDLC_API_URL";
/// Overrides `ws_url`.
pub const WS_URL_ENV: &str = "SDLC_WS_URL";

/// Monitor configuration, loaded from YAML. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Base URL of the workflow REST API
    pub api_url: String,
    /// Root URL for push channels. Derived from `api_url` when unset.
    pub ws_url: Option<String>,
    pub poll_interval_ms: u64,
    pub ping_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Stage shown right after a successful start
    pub first_stage: String,
    /// Placeholder progress shown right after a successful start
    pub start_progress: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_url: None,
            poll_interval_ms: 2000,
            ping_interval_secs: 30,
            request_timeout_secs: 30,
            first_stage: sync.first_stage,
            start_progress: sync.start_progress,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given (it must exist), else `fallback` if it exists,
    /// else the defaults.
    pub fn load_or_default(explicit: Option<&Path>, fallback: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match fallback {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Applies `SDLC_API_URL` / `SDLC_WS_URL` from the process environment.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(url) = lookup(WS_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.ws_url = Some(url.trim().to_string());
        }
        self
    }

    /// Command-line override; wins over the file and the environment.
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !has_scheme(&self.api_url, &["http://", "https://"]) {
            bail!(
                "api_url must start with http:// or https://, got '{}'",
                self.api_url
            );
        }
        if let Some(ws_url) = &self.ws_url {
            if !has_scheme(ws_url, &["ws://", "wss://"]) {
                bail!("ws_url must start with ws:// or wss://, got '{}'", ws_url);
            }
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.ping_interval_secs == 0 {
            bail!("ping_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if !self.start_progress.is_finite() {
            bail!("start_progress must be a finite number");
        }
        Ok(())
    }

    /// Push channel root: `ws_url`, or `api_url` with its scheme swapped.
    pub fn ws_root(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.trim_end_matches('/').to_string();
        }
        let api = self.api_url.trim_end_matches('/');
        if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            api.to_string()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            first_stage: self.first_stage.clone(),
            start_progress: self.start_progress,
        }
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    let lower = url.to_ascii_lowercase();
    schemes
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_validates() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_root(), "ws://localhost:8000");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync_config(), SyncConfig::default());
    }

    #[test]
    fn test_yaml_parsing_partial() {
        let yaml = r#"
api_url: https://sdlc.example.com/
poll_interval_ms: 500
"#;
        let config: MonitorConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.ping_interval_secs, 30);
        assert_eq!(config.ws_root(), "wss://sdlc.example.com");
        assert_eq!(
            config.sync_config().poll_interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "api_url: http://localhost:8000\npoll_intervall_ms: 10\n";
        let result: Result<MonitorConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let config = MonitorConfig {
            ws_url: Some("ws://push.internal:9000/".to_string()),
            ..MonitorConfig::default()
        };
        assert_eq!(config.ws_root(), "ws://push.internal:9000");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            MonitorConfig {
                api_url: "localhost:8000".to_string(),
                ..MonitorConfig::default()
            },
            MonitorConfig {
                ws_url: Some("http://localhost:8000".to_string()),
                ..MonitorConfig::default()
            },
            MonitorConfig {
                poll_interval_ms: 0,
                ..MonitorConfig::default()
            },
            MonitorConfig {
                ping_interval_secs: 0,
                ..MonitorConfig::default()
            },
            MonitorConfig {
                request_timeout_secs: 0,
                ..MonitorConfig::default()
            },
            MonitorConfig {
                start_progress: f64::NAN,
                ..MonitorConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_overrides_precedence() {
        let env: HashMap<&str, &str> = [
            (API_URL_ENV, "http://from-env:8000"),
            (WS_URL_ENV, "ws://push-from-env:8001"),
        ]
        .into_iter()
        .collect();

        let config = MonitorConfig::default()
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_url, "http://from-env:8000");
        assert_eq!(config.ws_root(), "ws://push-from-env:8001");

        let config = config.with_api_url(Some("http://from-cli:8000".to_string()));
        assert_eq!(config.api_url, "http://from-cli:8000");
        assert_eq!(config.ws_root(), "ws://push-from-env:8001");
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let config = MonitorConfig::default().apply_overrides_from(|_| Some("  ".to_string()));
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    #[serial]
    fn test_process_env_overrides() {
        std::env::set_var(API_URL_ENV, "https://remote.example.com");
        let config = MonitorConfig::default().apply_env_overrides();
        std::env::remove_var(API_URL_ENV);

        assert_eq!(config.api_url, "https://remote.example.com");
        assert_eq!(config.ws_root(), "wss://remote.example.com");
    }

    #[test]
    fn test_load_or_default() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yaml");
        let present = dir.path().join("config.yaml");
        std::fs::write(&present, "request_timeout_secs: 5\n").unwrap();

        let config = MonitorConfig::load_or_default(None, Some(&missing)).unwrap();
        assert_eq!(config, MonitorConfig::default());

        let config = MonitorConfig::load_or_default(None, Some(&present)).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));

        assert!(MonitorConfig::load_or_default(Some(&missing), Some(&present)).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "poll_interval_ms: 0\n").unwrap();

        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }
}
