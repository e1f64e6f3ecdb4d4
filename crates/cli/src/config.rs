//! Configuration loading and management

use anyhow::{Context, Result, bail};
use echopost_domain::{
    BotSettings,
    rate_limit::RateLimitConfig,
    usecases::{RateLimitPolicy, RunLoopConfig},
    validator::ValidatorConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known flat environment variables and the keys they override
const FLAT_ENV_OVERRIDES: [(&str, &str); 6] = [
    ("SOURCE_HANDLE", "bot.source_handle"),
    ("DESTINATION_HANDLE", "bot.destination_handle"),
    ("CHAR_LIMIT", "bot.char_limit"),
    ("BSKY_HOST_URL", "bot.host_url"),
    ("OLLAMA_MODEL", "bot.model"),
    ("OLLAMA_HOST", "llm.base_url"),
];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub validator: ValidatorSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub source_handle: String,

    #[serde(default)]
    pub destination_handle: String,

    #[serde(default = "default_source_password_env")]
    pub source_password_env: String,

    #[serde(default = "default_destination_password_env")]
    pub destination_password_env: String,

    #[serde(default = "default_char_limit")]
    pub char_limit: usize,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_host_url")]
    pub host_url: String,

    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// ollama or stub
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_min_sleep")]
    pub min_sleep_secs: u64,

    #[serde(default = "default_max_sleep")]
    pub max_sleep_secs: u64,

    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_hourly_budget")]
    pub hourly_budget: u32,

    #[serde(default = "default_daily_budget")]
    pub daily_budget: u32,

    #[serde(default = "default_points_per_publish")]
    pub points_per_publish: u32,

    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// skip or wait
    #[serde(default = "default_policy")]
    pub policy: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorSection {
    pub min_length: Option<usize>,
    pub max_exclamations: Option<usize>,
    pub max_questions: Option<usize>,
    pub max_punctuation_ratio: Option<f64>,
    pub max_urls: Option<usize>,
    #[serde(default)]
    pub extra_spam_keywords: Vec<String>,
    #[serde(default)]
    pub extra_harmful_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON-lines log file; empty disables the file sink
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

// Default value functions
fn default_source_password_env() -> String {
    "SRC_APP_PASS".to_string()
}

fn default_destination_password_env() -> String {
    "DST_APP_PASS".to_string()
}

fn default_char_limit() -> usize {
    280
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_host_url() -> String {
    "https://bsky.social".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f64 {
    0.8
}

fn default_max_output_tokens() -> u32 {
    200
}

fn default_timeout() -> u64 {
    120
}

fn default_llm_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_min_sleep() -> u64 {
    30 * 60
}

fn default_max_sleep() -> u64 {
    3 * 60 * 60
}

fn default_max_posts() -> usize {
    100
}

fn default_max_samples() -> usize {
    20
}

fn default_hourly_budget() -> u32 {
    5000
}

fn default_daily_budget() -> u32 {
    35000
}

fn default_points_per_publish() -> u32 {
    3
}

fn default_safety_margin() -> f64 {
    0.05
}

fn default_policy() -> String {
    "skip".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log/echopost.log")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            source_handle: String::new(),
            destination_handle: String::new(),
            source_password_env: default_source_password_env(),
            destination_password_env: default_destination_password_env(),
            char_limit: default_char_limit(),
            model: default_model(),
            host_url: default_host_url(),
            dry_run: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_ollama_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout(),
            retries: default_llm_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_sleep_secs: default_min_sleep(),
            max_sleep_secs: default_max_sleep(),
            max_posts: default_max_posts(),
            max_samples: default_max_samples(),
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            hourly_budget: default_hourly_budget(),
            daily_budget: default_daily_budget(),
            points_per_publish: default_points_per_publish(),
            safety_margin: default_safety_margin(),
            policy: default_policy(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Load configuration, resolving flat variables through `env`
    pub fn load_with_env<F>(config_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./echopost.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("ECHOPOST")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in FLAT_ENV_OVERRIDES {
            let value = env(var).filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Invalid value in {}", var))?;
        }

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject configurations the bot cannot run with
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        if self.bot.source_handle.trim().is_empty() {
            bail!("Source handle is not set (SOURCE_HANDLE or [bot] source_handle)");
        }
        if !dry_run && self.bot.destination_handle.trim().is_empty() {
            bail!("Destination handle is not set (DESTINATION_HANDLE or [bot] destination_handle)");
        }
        if self.bot.char_limit == 0 {
            bail!("Character limit must be greater than zero");
        }
        if self.schedule.min_sleep_secs > self.schedule.max_sleep_secs {
            bail!(
                "Invalid schedule: min_sleep_secs {} exceeds max_sleep_secs {}",
                self.schedule.min_sleep_secs,
                self.schedule.max_sleep_secs
            );
        }
        self.rate_limit_policy()?;
        self.rate_limit_config()
            .validate()
            .context("Invalid [rate_limit] section")?;
        match self.llm.provider.as_str() {
            "ollama" | "stub" => Ok(()),
            other => bail!("Unknown LLM provider: {}", other),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            hourly_budget: self.rate_limit.hourly_budget,
            daily_budget: self.rate_limit.daily_budget,
            points_per_publish: self.rate_limit.points_per_publish,
            safety_margin: self.rate_limit.safety_margin,
        }
    }

    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy> {
        match self.rate_limit.policy.trim() {
            "skip" => Ok(RateLimitPolicy::Skip),
            "wait" => Ok(RateLimitPolicy::Wait),
            other => bail!("Invalid rate limit policy: {}", other),
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        let mut config = ValidatorConfig::default();
        let section = &self.validator;

        if let Some(v) = section.min_length {
            config.min_length = v;
        }
        if let Some(v) = section.max_exclamations {
            config.max_exclamations = v;
        }
        if let Some(v) = section.max_questions {
            config.max_questions = v;
        }
        if let Some(v) = section.max_punctuation_ratio {
            config.max_punctuation_ratio = v;
        }
        if let Some(v) = section.max_urls {
            config.max_urls = v;
        }
        config
            .spam_keywords
            .extend(section.extra_spam_keywords.iter().cloned());
        config
            .harmful_keywords
            .extend(section.extra_harmful_keywords.iter().cloned());
        config
    }

    /// Settings handed to the run loop; `dry_run` is the resolved flag
    pub fn run_loop_config(&self, dry_run: bool) -> Result<RunLoopConfig> {
        Ok(RunLoopConfig {
            settings: BotSettings {
                source_handle: self.bot.source_handle.trim().to_string(),
                destination_handle: self.bot.destination_handle.trim().to_string(),
                char_limit: self.bot.char_limit,
                model_name: self.bot.model.clone(),
                dry_run,
                host_url: self.bot.host_url.clone(),
            },
            max_posts: self.schedule.max_posts,
            max_samples: self.schedule.max_samples,
            generation_retries: self.llm.retries,
            generation_backoff: Duration::from_millis(self.llm.retry_backoff_ms),
            min_sleep: Duration::from_secs(self.schedule.min_sleep_secs),
            max_sleep: Duration::from_secs(self.schedule.max_sleep_secs),
            rate_limit: self.rate_limit_config(),
            rate_limit_policy: self.rate_limit_policy()?,
            validator: self.validator_config(),
        })
    }
}
