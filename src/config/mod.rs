use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_AUTO_REJECT_THRESHOLD: f64 = 0.9;
pub const DEFAULT_MANUAL_REVIEW_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub redis_url: String,
    pub queue_endpoint: String,
    pub queue_region: String,
    pub queue_name: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub admin_token: Option<String>,
    pub worker_batch_size: i32,
    pub stats_cache_ttl_seconds: u64,
    pub moderation: ModerationConfig,
    pub classifier: ClassifierConfig,
}

/// Policy knobs consumed by the decision engine.
#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub enabled: bool,
    pub auto_reject_threshold: f64,
    pub manual_review_threshold: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_reject_threshold: DEFAULT_AUTO_REJECT_THRESHOLD,
            manual_review_threshold: DEFAULT_MANUAL_REVIEW_THRESHOLD,
        }
    }
}

impl ModerationConfig {
    pub fn validate(&self) -> Result<()> {
        let manual = self.manual_review_threshold;
        let auto = self.auto_reject_threshold;
        if !(0.0..=1.0).contains(&manual) {
            return Err(anyhow!("invalid MANUAL_REVIEW_THRESHOLD: must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&auto) {
            return Err(anyhow!("invalid AUTO_REJECT_THRESHOLD: must be within [0, 1]"));
        }
        if manual >= auto {
            return Err(anyhow!(
                "invalid thresholds: MANUAL_REVIEW_THRESHOLD ({}) must be below AUTO_REJECT_THRESHOLD ({})",
                manual,
                auto
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let moderation = ModerationConfig {
            enabled: env_or_parse("MODERATION_ENABLED", "true")?,
            auto_reject_threshold: env_or_parse("AUTO_REJECT_THRESHOLD", "0.9")?,
            manual_review_threshold: env_or_parse("MANUAL_REVIEW_THRESHOLD", "0.5")?,
        };
        moderation.validate()?;

        let classifier = ClassifierConfig {
            base_url: env_or("CLASSIFIER_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("CLASSIFIER_MODEL", "gpt-4o-mini"),
            api_key: env_or_err("CLASSIFIER_API_KEY")?,
            timeout_seconds: env_or_parse("CLASSIFIER_TIMEOUT_SECONDS", "30")?,
        };

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            queue_endpoint: env_or_err("QUEUE_ENDPOINT")?,
            queue_region: env_or("QUEUE_REGION", "fr-par"),
            queue_name: env_or_err("QUEUE_NAME")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            worker_batch_size: env_or_parse("WORKER_BATCH_SIZE", "5")?,
            stats_cache_ttl_seconds: env_or_parse("STATS_CACHE_TTL_SECONDS", "15")?,
            moderation,
            classifier,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        assert!(ModerationConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = ModerationConfig {
            enabled: true,
            auto_reject_threshold: 0.5,
            manual_review_threshold: 0.9,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_thresholds_are_rejected() {
        let config = ModerationConfig {
            enabled: true,
            auto_reject_threshold: 0.7,
            manual_review_threshold: 0.7,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let config = ModerationConfig {
            enabled: true,
            auto_reject_threshold: 1.2,
            manual_review_threshold: 0.5,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("AUTO_REJECT_THRESHOLD"));
    }
}
