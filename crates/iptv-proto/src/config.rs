use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;
use super::protocol::Credentials;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub epg: EpgConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Content panel login.  Only used to build stream and EPG URLs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PanelConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl PanelConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.base_url, &self.username, &self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    /// Simultaneous now/next requests against the panel.
    #[serde(default = "default_epg_concurrency")]
    pub concurrency: usize,
    /// Freshness window; also the background refresh period.
    #[serde(default = "default_epg_refresh_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_epg_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Thresholds of the adaptive quality controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Trailing window in which stalls count towards a step-down.
    #[serde(default = "default_stall_window_secs")]
    pub stall_window_secs: u64,
    /// How long stall timestamps are retained at all.
    #[serde(default = "default_stall_retention_secs")]
    pub stall_retention_secs: u64,
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: usize,
    #[serde(default = "default_drop_ratio_limit")]
    pub drop_ratio_limit: f64,
    #[serde(default = "default_low_buffer_secs")]
    pub low_buffer_secs: f64,
    #[serde(default = "default_step_up_after_secs")]
    pub step_up_after_secs: u64,
    #[serde(default = "default_quality_notice_millis")]
    pub notice_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Explicit mpv path; falls back to beside-exe and PATH lookup.
    #[serde(default)]
    pub mpv_binary: Option<PathBuf>,
    /// Hand the stream to mpv once inline retries are exhausted.
    #[serde(default)]
    pub fallback_on_failure: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
}

/// Where the daemon reads its channel list from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_channels_toml")]
    pub channels_toml: PathBuf,
    /// Extended M3U file path or http(s) URL, used when the TOML is missing.
    #[serde(default)]
    pub m3u: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            concurrency: default_epg_concurrency(),
            refresh_interval_secs: default_epg_refresh_secs(),
            request_timeout_secs: default_epg_timeout_secs(),
        }
    }
}

impl EpgConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            stall_window_secs: default_stall_window_secs(),
            stall_retention_secs: default_stall_retention_secs(),
            stall_threshold: default_stall_threshold(),
            drop_ratio_limit: default_drop_ratio_limit(),
            low_buffer_secs: default_low_buffer_secs(),
            step_up_after_secs: default_step_up_after_secs(),
            notice_millis: default_quality_notice_millis(),
        }
    }
}

impl QualityConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mpv_binary: None,
            fallback_on_failure: false,
            max_retries: default_max_retries(),
            retry_delay_millis: default_retry_delay_millis(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            channels_toml: default_channels_toml(),
            m3u: None,
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_epg_concurrency() -> usize {
    6
}

fn default_epg_refresh_secs() -> u64 {
    10 * 60
}

fn default_epg_timeout_secs() -> u64 {
    20
}

fn default_tick_millis() -> u64 {
    1500
}

fn default_stall_window_secs() -> u64 {
    8
}

fn default_stall_retention_secs() -> u64 {
    10
}

fn default_stall_threshold() -> usize {
    3
}

fn default_drop_ratio_limit() -> f64 {
    0.08
}

fn default_low_buffer_secs() -> f64 {
    2.0
}

fn default_step_up_after_secs() -> u64 {
    20
}

fn default_quality_notice_millis() -> u64 {
    2500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_millis() -> u64 {
    2000
}

fn default_channels_toml() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(portable) = platform::beside_exe("channels.toml") {
            return portable;
        }
    }

    platform::config_dir().join("channels.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.epg.concurrency, 6);
        assert_eq!(config.epg.refresh_interval(), Duration::from_secs(600));
        assert_eq!(config.quality.tick(), Duration::from_millis(1500));
        assert_eq!(config.quality.stall_threshold, 3);
        assert!(!config.player.fallback_on_failure);
        assert!(config
            .catalog
            .channels_toml
            .ends_with("iptv-live/channels.toml"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            base_url = "panel.example:8080/"
            username = "demo"
            password = "secret"

            [quality]
            step_up_after_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.quality.step_up_after_secs, 30);
        assert_eq!(config.quality.tick_millis, 1500);
        assert_eq!(config.epg.concurrency, 6);
        let creds = config.panel.credentials();
        assert_eq!(creds.base_url, "http://panel.example:8080");
        assert!(creds.is_complete());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.player.fallback_on_failure = true;
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.player.fallback_on_failure);
        assert_eq!(loaded.http.bind_address, "127.0.0.1");
    }
}
