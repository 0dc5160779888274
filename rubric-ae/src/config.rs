//! Configuration resolution for rubric-ae
//!
//! Priority: command line (including the clap `env` fallbacks) → `RUBRIC_*`
//! environment variables → TOML file → compiled defaults.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::assessment::{ProviderSettings, RetryPolicy};
use crate::broadcast::DEFAULT_SUBSCRIBER_BUFFER;
use rubric_common::config::{default_data_dir, env_override};
use rubric_common::time::millis_to_duration;
use rubric_common::Result;

pub const DEFAULT_PORT: u16 = 5731;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRY_COUNT: u32 = 1;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// `rubric-ae.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub server: ServerSection,
    pub provider: ProviderSection,
    pub assessment: AssessmentSection,
    pub cache: CacheSection,
    pub broadcast: BroadcastSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssessmentSection {
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub fallback_seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub default_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BroadcastSection {
    pub subscriber_buffer: Option<usize>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub log_level: String,
    /// `None` runs every assessment through the fallback generator
    pub provider: Option<ProviderSettings>,
    pub retry: RetryPolicy,
    pub fallback_seed: Option<u64>,
    pub cache_ttl: Duration,
    pub subscriber_buffer: usize,
}

impl EngineConfig {
    /// Merge the configuration tiers
    ///
    /// # Errors
    /// [`rubric_common::Error::Config`] when an environment variable is set
    /// but does not parse.
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let port = cli.port.or(toml.server.port).unwrap_or(DEFAULT_PORT);
        let database_path = cli
            .database
            .or_else(|| toml.server.database.clone())
            .unwrap_or_else(|| default_data_dir().join("rubric.db"));

        let timeout_ms = env_override::<u64>("RUBRIC_PROVIDER_TIMEOUT_MS")?
            .or(toml.provider.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let retry = RetryPolicy {
            timeout: millis_to_duration(timeout_ms),
            max_retries: env_override::<u32>("RUBRIC_RETRY_COUNT")?
                .or(toml.assessment.retry_count)
                .unwrap_or(DEFAULT_RETRY_COUNT),
            retry_delay: millis_to_duration(
                env_override::<u64>("RUBRIC_RETRY_DELAY_MS")?
                    .or(toml.assessment.retry_delay_ms)
                    .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
        };

        let cache_ttl = Duration::from_secs(
            env_override::<u64>("RUBRIC_CACHE_TTL_SECS")?
                .or(toml.cache.default_ttl_secs)
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );

        Ok(Self {
            port,
            database_path,
            log_level: toml.logging.level.clone(),
            provider: resolve_provider(&toml.provider)?,
            retry,
            fallback_seed: env_override::<u64>("RUBRIC_FALLBACK_SEED")?
                .or(toml.assessment.fallback_seed),
            cache_ttl,
            subscriber_buffer: env_override::<usize>("RUBRIC_SUBSCRIBER_BUFFER")?
                .or(toml.broadcast.subscriber_buffer)
                .unwrap_or(DEFAULT_SUBSCRIBER_BUFFER),
        })
    }
}

fn resolve_provider(section: &ProviderSection) -> Result<Option<ProviderSettings>> {
    let endpoint = env_override::<String>("RUBRIC_PROVIDER_ENDPOINT")?
        .or_else(|| non_blank(&section.endpoint));
    let api_key = env_override::<String>("RUBRIC_PROVIDER_API_KEY")?
        .or_else(|| non_blank(&section.api_key));
    let model = env_override::<String>("RUBRIC_PROVIDER_MODEL")?
        .or_else(|| non_blank(&section.model))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    match (endpoint, api_key) {
        (Some(endpoint), Some(api_key)) => {
            info!(endpoint = %endpoint, model = %model, "Assessment provider configured");
            Ok(Some(ProviderSettings::new(endpoint, api_key, model)))
        }
        (Some(_), None) => {
            warn!("Provider endpoint set without an API key; using fallback assessments");
            Ok(None)
        }
        _ => {
            info!("No assessment provider configured; using fallback assessments");
            Ok(None)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
