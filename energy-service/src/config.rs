use serde::Deserialize;
use std::{fs, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    #[serde(default = "default_tariff_base_url")]
    pub base_url: String,
    #[serde(default = "default_product_code")]
    pub product_code: String,
    #[serde(default = "default_region_code")]
    pub region_code: String,
    #[serde(default = "default_rate_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl TariffConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            base_url: default_tariff_base_url(),
            product_code: default_product_code(),
            region_code: default_region_code(),
            page_size: default_rate_page_size(),
            page_timeout_ms: default_page_timeout_ms(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_bind_addr")]
    pub http_bind_addr: String,
    /// IANA zone whose civil midnights delimit the reporting days.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_channels")]
    pub channels: Vec<i32>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl StatsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            http_bind_addr: default_stats_bind_addr(),
            timezone: default_timezone(),
            channels: default_channels(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSourceConfig {
    pub http_bind_addr: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl SinkConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub source: HttpSourceConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    pub energy_readings: PipelineConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ENERGY_CONFIG").unwrap_or_else(|_| "energy-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_tariff_base_url() -> String {
    "https://api.octopus.energy/v1".to_string()
}

fn default_product_code() -> String {
    "AGILE-24-10-01".to_string()
}

fn default_region_code() -> String {
    "C".to_string()
}

fn default_rate_page_size() -> u32 {
    1500
}

fn default_page_timeout_ms() -> u64 {
    10_000
}

fn default_max_pages() -> usize {
    100
}

fn default_stats_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_channels() -> Vec<i32> {
    vec![0, 1]
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}
