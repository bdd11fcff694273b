//! Configuration loading and representation.
//!
//! Everything comes from environment variables, read once at startup.
//! [`Settings::from_lookup`] takes any key lookup so tests never touch the
//! process environment.

use std::time::Duration;

use pathforge_ai::{ProviderConfig, ProviderEndpoint};
use pathforge_core::AiProvider;

use crate::jobs::RetentionPolicy;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_QUEUE_NAME: &str = "learning-paths";
pub const DEFAULT_RESULT_TTL_SECS: u64 = 500;
pub const DEFAULT_FAILURE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl HttpSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// `None` disables the durable lane.
    pub redis_url: Option<String>,
    pub name: String,
    pub result_ttl: Duration,
    pub failure_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub http: HttpSettings,
    pub queue: QueueSettings,
    pub retention: RetentionPolicy,
    pub execution_timeout: Option<Duration>,
    pub providers: ProviderConfig,
    pub frontend_origin: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let http = HttpSettings {
            host: env.text("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.parse("PORT")?.unwrap_or(DEFAULT_PORT),
        };

        let queue = QueueSettings {
            redis_url: redis_url(&env)?,
            name: env.text("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            result_ttl: Duration::from_secs(env.parse("RESULT_TTL_SECS")?.unwrap_or(DEFAULT_RESULT_TTL_SECS)),
            failure_ttl: Duration::from_secs(env.parse("FAILURE_TTL_SECS")?.unwrap_or(DEFAULT_FAILURE_TTL_SECS)),
        };

        let retention = RetentionPolicy {
            max_entries: env.parse::<usize>("JOB_STORE_MAX_ENTRIES")?.filter(|n| *n > 0),
            ttl: env.parse::<u64>("JOB_STORE_TTL_SECS")?.filter(|s| *s > 0).map(Duration::from_secs),
        };

        let execution_timeout = env
            .parse::<u64>("EXECUTION_TIMEOUT_SECS")?
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        Ok(Self {
            http,
            queue,
            retention,
            execution_timeout,
            providers: providers(&env)?,
            frontend_origin: env
                .text("FRONTEND_ORIGIN")
                .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGIN.to_string()),
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn text(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(key)
            .map(|raw| raw.parse::<T>().map_err(|e| ConfigError::new(key, &raw, e.to_string())))
            .transpose()
    }

    fn flag(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.text(key) {
            None => Ok(false),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::new(key, &raw, "expected a boolean")),
            },
        }
    }
}

fn redis_url<F>(env: &Env<'_, F>) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env.text("REDIS_URL") {
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(ConfigError::new("REDIS_URL", &url, "expected a redis:// or rediss:// URL"));
        }
        return Ok(Some(url));
    }

    let Some(host) = env.text("REDIS_HOST") else {
        return Ok(None);
    };
    let port: u16 = env.parse("REDIS_PORT")?.unwrap_or(6379);
    let db: u32 = env.parse("REDIS_DB")?.unwrap_or(0);
    Ok(Some(format!("redis://{host}:{port}/{db}")))
}

fn providers<F>(env: &Env<'_, F>) -> Result<ProviderConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ProviderConfig {
        dev_mode: env.flag("DEV_MODE")?,
        ..ProviderConfig::default()
    };

    if let Some(raw) = env.text("DEFAULT_PROVIDER") {
        config.default_provider = raw
            .parse::<AiProvider>()
            .map_err(|e| ConfigError::new("DEFAULT_PROVIDER", &raw, e.to_string()))?;
    }

    for (provider, key_var, model_var) in [
        (AiProvider::OpenRouter, "OPENROUTER_API_KEY", "OPENROUTER_FREE_MODEL"),
        (AiProvider::OpenAi, "OPENAI_API_KEY", "OPENAI_MODEL"),
        (AiProvider::DeepSeek, "DEEPSEEK_API_KEY", "DEEPSEEK_MODEL"),
    ] {
        let endpoint: &mut ProviderEndpoint = config.endpoint_mut(provider);
        endpoint.api_key = env.text(key_var);
        if let Some(model) = env.text(model_var) {
            endpoint.default_model = model;
        }
    }

    Ok(config)
}
