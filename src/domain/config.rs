//! # Configuration
//!
//! Manages the loading and parsing of the dispatcher's configuration file (`config.yaml`).
//! Defines the structs for collaborator endpoints, pacing, business hours and message templates.

use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

use crate::strings::prompts;

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub policy: FailurePolicyConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub test_customer: TestCustomerConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the gates cannot honour.
    pub fn validate(&self) -> Result<()> {
        let customers = &self.services.customers;
        match (&customers.url, &customers.file) {
            (Some(_), Some(_)) => bail!("services.customers: set either `url` or `file`, not both"),
            (None, None) => bail!("services.customers: one of `url` or `file` is required"),
            _ => {}
        }

        if self.pacing.jitter_min_secs > self.pacing.jitter_max_secs {
            bail!(
                "pacing: jitter_min_secs ({}) exceeds jitter_max_secs ({})",
                self.pacing.jitter_min_secs,
                self.pacing.jitter_max_secs
            );
        }

        let hours = &self.business_hours;
        if hours.end_hour > 24 || hours.start_hour >= hours.end_hour {
            bail!(
                "business_hours: expected 0 <= start_hour < end_hour <= 24, got [{}, {})",
                hours.start_hour,
                hours.end_hour
            );
        }
        if let Some(days) = &hours.days
            && days.is_empty()
        {
            bail!("business_hours.days: list must not be empty");
        }

        if self.policy.on_failure == FailurePolicy::RetryLater && self.policy.max_retries == 0 {
            tracing::warn!("policy: retry_later with max_retries = 0 behaves like record");
        }

        Ok(())
    }
}

/// Configuration for the external collaborators.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub customers: CustomerSourceConfig,
    pub generator: GeneratorConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CustomerSourceConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>, // e.g. "OPENAI_API_KEY"
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            model: String::new(),
            api_key: None,
            api_key_env: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub url: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: None,
            file: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Outbound pacing: one send per `interval_secs`, plus a random jitter.
#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_jitter_min")]
    pub jitter_min_secs: u64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            jitter_min_secs: default_jitter_min(),
            jitter_max_secs: default_jitter_max(),
        }
    }
}

/// Recipient-local sending window, `[start_hour, end_hour)`.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessHoursConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    #[serde(
        default = "default_timezone",
        deserialize_with = "deserialize_utc_offset"
    )]
    pub timezone: FixedOffset,
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
    /// Explicit allowed days; takes precedence over `weekdays_only`.
    #[serde(default)]
    pub days: Option<Vec<Weekday>>,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            timezone: default_timezone(),
            weekdays_only: true,
            days: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessageConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            template: default_template(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Track the recipient as failed and move on.
    #[default]
    Record,
    /// Track the attempt as failed and requeue the recipient at the tail.
    RetryLater,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FailurePolicyConfig {
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for FailurePolicyConfig {
    fn default() -> Self {
        Self {
            on_failure: FailurePolicy::Record,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default)]
    pub status_log: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: default_checkpoint_path(),
            status_log: None,
        }
    }
}

/// Synthetic recipient used by the `test` entry point.
#[derive(Debug, Deserialize, Clone)]
pub struct TestCustomerConfig {
    #[serde(default = "default_test_id")]
    pub id: String,
    #[serde(default = "default_test_name")]
    pub name: String,
    #[serde(default = "default_test_context")]
    pub context: String,
}

impl Default for TestCustomerConfig {
    fn default() -> Self {
        Self {
            id: default_test_id(),
            name: default_test_name(),
            context: default_test_context(),
        }
    }
}

/// Parses a fixed UTC offset: `+08:00`, `-0530`, `UTC+8`, `GMT-3`, `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let s = raw.trim();
    let s = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s);
    if s.is_empty() || s == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.as_bytes()[0] {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if rest.len() == 4 {
        (rest.get(..2)?.parse::<i32>().ok()?, rest.get(2..)?.parse::<i32>().ok()?)
    } else {
        (rest.parse::<i32>().ok()?, 0)
    };

    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn deserialize_utc_offset<'de, D>(deserializer: D) -> Result<FixedOffset, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_offset(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid UTC offset: {raw}")))
}

fn default_timeout() -> u64 {
    30
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_provider() -> String {
    "workflow".to_string()
}
fn default_platform() -> String {
    "whatsapp".to_string()
}
fn default_interval() -> u64 {
    10
}
fn default_jitter_min() -> u64 {
    1
}
fn default_jitter_max() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_start_hour() -> u32 {
    9
}
fn default_end_hour() -> u32 {
    18
}
fn default_timezone() -> FixedOffset {
    // UTC+8
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
}
fn default_label() -> String {
    "Industry".to_string()
}
fn default_template() -> String {
    prompts::DEFAULT_MESSAGE_TEMPLATE.to_string()
}
fn default_system_prompt() -> String {
    prompts::DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}
fn default_max_retries() -> u32 {
    2
}
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/progress.json")
}
fn default_test_id() -> String {
    "85290897701@c.us".to_string()
}
fn default_test_name() -> String {
    "Test User".to_string()
}
fn default_test_context() -> String {
    "Testing the system functionality".to_string()
}
