use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment value that turns on dev-only behavior like the echo callback.
pub const DEV_ENVIRONMENT: &str = "dev";

/// Top-level configuration for a probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Wall-clock bound for the run in seconds; 0 means no deadline.
    #[serde(default)]
    pub run_duration_secs: u64,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub reporter: ReporterConfig,
    #[serde(default)]
    pub librd_stats: LibrdStatsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Comma-separated bootstrap addresses, shared with the consumer.
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// -1 produces until the deadline or a signal stops the run.
    #[serde(default = "default_total_messages")]
    pub total_messages: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    /// Pause after each send, for paced load.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default = "default_required_acks")]
    pub request_required_acks: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Empty gets a generated group id so parallel runs stay isolated.
    #[serde(default)]
    pub group_id: String,
    #[serde(default = "default_offset_reset")]
    pub offset_reset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Seconds between progress reports; 0 disables periodic emission.
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub statsd: StatsdConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsdConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_statsd_host")]
    pub host: String,
    #[serde(default = "default_statsd_port")]
    pub port: u16,
    #[serde(default = "default_statsd_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrdStatsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_librd_interval_ms")]
    pub interval_ms: u64,
    /// Tag attached to every extracted statistic.
    #[serde(default)]
    pub cluster_name: String,
}

/// Passed opaquely to the broker client; empty protocol means plaintext.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub ca_location: String,
    #[serde(default)]
    pub certificate_location: String,
    #[serde(default)]
    pub key_location: String,
    #[serde(default)]
    pub key_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: Option<String>,
    /// Bind address for the debug endpoint; unset disables it.
    pub debug_bind: Option<String>,
}

impl Config {
    /// Load configuration from a path resolved via KAFPROBE_CONFIG or
    /// defaults to `config/kafprobe.toml`.
    pub fn load_from_env() -> Result<Self> {
        let path = env_config_path();
        let mut cfg = Self::load(&path)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    /// Validate schema-level invariants before starting a run.
    pub fn validate(&self) -> Result<()> {
        if !self.producer.enabled && !self.consumer.enabled {
            bail!("both producer and consumer are disabled, nothing to run");
        }
        if self.producer.brokers.is_empty() {
            bail!("producer.brokers must be non-empty");
        }
        if self.producer.topic.is_empty() {
            bail!("producer.topic must be non-empty");
        }
        if self.producer.enabled {
            if self.producer.concurrency == 0 {
                bail!("producer.concurrency must be > 0");
            }
            if self.producer.queue_capacity == 0 {
                bail!("producer.queue_capacity must be > 0");
            }
            if self.producer.total_messages < -1 {
                bail!("producer.total_messages must be -1 (unbounded) or >= 0");
            }
            if self.producer.total_messages == -1 && self.run_duration_secs == 0 {
                bail!("unbounded production needs run_duration_secs > 0 or a signal to stop");
            }
        }
        if self.consumer.enabled && self.consumer.offset_reset.is_empty() {
            bail!("consumer.offset_reset must be non-empty");
        }
        if self.reporter.statsd.enabled {
            if self.reporter.statsd.host.is_empty() {
                bail!("reporter.statsd.host must be non-empty");
            }
            if self.reporter.statsd.port == 0 {
                bail!("reporter.statsd.port must be > 0");
            }
        }
        if self.librd_stats.enabled && self.librd_stats.interval_ms == 0 {
            bail!("librd_stats.interval_ms must be > 0");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(brokers) = std::env::var("KAFPROBE_BROKERS") {
            self.producer.brokers = brokers;
        }
        if let Ok(topic) = std::env::var("KAFPROBE_TOPIC") {
            self.producer.topic = topic;
        }
        if let Ok(total) = std::env::var("KAFPROBE_TOTAL_MESSAGES") {
            self.producer.total_messages = total
                .parse()
                .context("KAFPROBE_TOTAL_MESSAGES must be an integer")?;
        }
        if let Ok(concurrency) = std::env::var("KAFPROBE_CONCURRENCY") {
            self.producer.concurrency = concurrency
                .parse()
                .context("KAFPROBE_CONCURRENCY must be an integer")?;
        }
        if let Ok(group_id) = std::env::var("KAFPROBE_GROUP_ID") {
            self.consumer.group_id = group_id;
        }
        if let Ok(duration) = std::env::var("KAFPROBE_RUN_DURATION_SECS") {
            self.run_duration_secs = duration
                .parse()
                .context("KAFPROBE_RUN_DURATION_SECS must be an integer")?;
        }
        if let Ok(level) = std::env::var("KAFPROBE_LOG_LEVEL") {
            self.telemetry.log_level = Some(level);
        }
        Ok(())
    }

    pub fn run_duration(&self) -> Option<Duration> {
        (self.run_duration_secs > 0).then(|| Duration::from_secs(self.run_duration_secs))
    }

    pub fn is_dev(&self) -> bool {
        self.environment == DEV_ENVIRONMENT
    }
}

impl ProducerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl ReporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("KAFPROBE_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from("config/kafprobe.toml")
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}

fn default_environment() -> String {
    "production".into()
}

fn default_enabled() -> bool {
    true
}

fn default_brokers() -> String {
    "localhost:9092".into()
}

fn default_topic() -> String {
    "kafprobe".into()
}

fn default_total_messages() -> i64 {
    10_000
}

fn default_concurrency() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    1_000
}

fn default_flush_timeout_ms() -> u64 {
    2_000
}

fn default_payload_size() -> usize {
    100
}

fn default_required_acks() -> i32 {
    -1
}

fn default_offset_reset() -> String {
    "earliest".into()
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_statsd_host() -> String {
    "127.0.0.1".into()
}

fn default_statsd_port() -> u16 {
    8_125
}

fn default_statsd_prefix() -> String {
    "kafprobe".into()
}

fn default_librd_interval_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            run_duration_secs: 0,
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
            reporter: ReporterConfig::default(),
            librd_stats: LibrdStatsConfig::default(),
            security: SecurityConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            brokers: default_brokers(),
            topic: default_topic(),
            total_messages: default_total_messages(),
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            flush_timeout_ms: default_flush_timeout_ms(),
            delay_ms: 0,
            payload_size: default_payload_size(),
            request_required_acks: default_required_acks(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            group_id: String::new(),
            offset_reset: default_offset_reset(),
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval_secs(),
            statsd: StatsdConfig::default(),
        }
    }
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_statsd_host(),
            port: default_statsd_port(),
            prefix: default_statsd_prefix(),
        }
    }
}

impl Default for LibrdStatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_librd_interval_ms(),
            cluster_name: String::new(),
        }
    }
}
