use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::domain::service::BusinessCalendar;

/// Application configuration for the traffic accounting server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub accounting: AccountingConfig,
    #[serde(default)]
    pub quota_cache: QuotaCacheConfig,
    #[serde(default)]
    pub task_queue: TaskQueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// DatabaseConfig はバッチレイヤーとシステムオブレコードの接続設定（URL形式）。
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

/// RedisConfig はスピードレイヤーとクォータキャッシュの接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_traffic_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

fn default_traffic_key_prefix() -> String {
    "traffic:".to_string()
}

/// AccountingConfig は集計処理の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    /// IANA タイムゾーン名。暦月と業務日の境界に使う。
    #[serde(default = "default_business_timezone")]
    pub business_timezone: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// スピードレイヤーのポイント保持時間。cutover（前日0時）より古い分を残すため 48 以上にする。
    #[serde(default = "default_speed_layer_ttl_hours")]
    pub speed_layer_ttl_hours: u64,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            business_timezone: default_business_timezone(),
            read_timeout_ms: default_read_timeout_ms(),
            speed_layer_ttl_hours: default_speed_layer_ttl_hours(),
        }
    }
}

fn default_business_timezone() -> String {
    "UTC".to_string()
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_speed_layer_ttl_hours() -> u64 {
    72
}

/// AccountingSettings は AccountingConfig を検証済みの値に変換したもの。
#[derive(Debug, Clone, Copy)]
pub struct AccountingSettings {
    pub calendar: BusinessCalendar,
    pub read_timeout: Duration,
    pub speed_layer_ttl: Duration,
}

impl AccountingConfig {
    pub fn settings(&self) -> anyhow::Result<AccountingSettings> {
        let tz: Tz = self
            .business_timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid business_timezone '{}': {}", self.business_timezone, e))?;
        if self.read_timeout_ms == 0 {
            anyhow::bail!("accounting.read_timeout_ms must be greater than 0");
        }
        if self.speed_layer_ttl_hours < 48 {
            anyhow::bail!(
                "accounting.speed_layer_ttl_hours must be at least 48, got {}",
                self.speed_layer_ttl_hours
            );
        }
        Ok(AccountingSettings {
            calendar: BusinessCalendar::new(tz),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            speed_layer_ttl: Duration::from_secs(self.speed_layer_ttl_hours * 3600),
        })
    }
}

/// QuotaCacheConfig はクォータスナップショットのキャッシュ設定。
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaCacheConfig {
    #[serde(default = "default_quota_key_prefix")]
    pub key_prefix: String,
    /// 0 の場合は期間終了時刻で失効させる。
    #[serde(default)]
    pub ttl_secs: u64,
}

impl Default for QuotaCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_quota_key_prefix(),
            ttl_secs: 0,
        }
    }
}

fn default_quota_key_prefix() -> String {
    "quota:".to_string()
}

/// TaskQueueConfig はサブスクリプションイベント用ワーカープールの設定。
#[derive(Debug, Clone, Deserialize)]
pub struct TaskQueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// ワーカー1つあたりのキュー長。
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" の場合はプレーンテキスト、それ以外は JSON。
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
