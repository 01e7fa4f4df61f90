use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CAMERA_URL: &str = "stub://webcam";
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_IN_FLIGHT: usize = 2;
const DEFAULT_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Deserialize, Default)]
struct FaceguardConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    history: Option<HistoryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    sample_interval_ms: Option<u64>,
    max_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FaceguardConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub camera: CameraSettings,
    pub history_limit: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub sample_interval: Duration,
    pub max_in_flight: usize,
}

impl Default for FaceguardConfig {
    fn default() -> Self {
        Self::from_file(FaceguardConfigFile::default())
    }
}

impl FaceguardConfig {
    /// File named by `FACEGUARD_CONFIG` (optional), then `FACEGUARD_*`
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let cfg = Self::load_unvalidated()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like `load` but leaves validation to the caller, so command-line
    /// overrides can be layered on first.
    pub fn load_unvalidated() -> Result<Self> {
        let config_path = std::env::var("FACEGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: FaceguardConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            api_url: api.url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            request_timeout: Duration::from_secs(
                api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            camera: CameraSettings {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                sample_interval: Duration::from_millis(
                    camera
                        .sample_interval_ms
                        .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
                ),
                max_in_flight: camera.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            },
            history_limit: file
                .history
                .and_then(|history| history.limit)
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("FACEGUARD_API_URL") {
            self.api_url = url;
        }
        if let Some(secs) = env_parse::<u64>("FACEGUARD_REQUEST_TIMEOUT_SECS", "seconds")? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = env_string("FACEGUARD_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(ms) = env_parse::<u64>("FACEGUARD_SAMPLE_INTERVAL_MS", "milliseconds")? {
            self.camera.sample_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("FACEGUARD_MAX_IN_FLIGHT", "requests")? {
            self.camera.max_in_flight = n;
        }
        if let Some(limit) = env_parse::<u32>("FACEGUARD_HISTORY_LIMIT", "entries")? {
            self.history_limit = limit;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.api_url)
            .map_err(|e| anyhow!("api url '{}' is invalid: {}", self.api_url, e))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(anyhow!(
                "api url must use http or https (got '{}')",
                api.scheme()
            ));
        }
        let camera = url::Url::parse(&self.camera.url)
            .map_err(|e| anyhow!("camera url '{}' is invalid: {}", self.camera.url, e))?;
        if !matches!(camera.scheme(), "stub" | "http" | "https") {
            return Err(anyhow!(
                "camera url must use stub, http or https (got '{}')",
                camera.scheme()
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        if self.camera.sample_interval.is_zero() {
            return Err(anyhow!("sample interval must be greater than zero"));
        }
        if self.camera.max_in_flight == 0 {
            return Err(anyhow!("max_in_flight must be at least 1"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FaceguardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, unit: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be an integer number of {}", key, unit)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FaceguardConfig::default();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.camera.sample_interval, Duration::from_secs(1));
        assert_eq!(cfg.camera.max_in_flight, 2);
        assert_eq!(cfg.history_limit, 100);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_interval_and_bad_scheme() {
        let mut cfg = FaceguardConfig::default();
        cfg.camera.sample_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = FaceguardConfig::default();
        cfg.api_url = "ftp://example.com".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = FaceguardConfig::default();
        cfg.camera.max_in_flight = 0;
        assert!(cfg.validate().is_err());
    }
}
