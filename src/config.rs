use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub mod merchants;

/// Upper bound on `PAYMENT_REQUEST_TTL_SECS` (one week).
pub const MAX_PAYMENT_REQUEST_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    /// Public base URL the payment network posts callbacks to.
    pub base_url: String,
    pub mpesa_api_url: String,
    pub mpesa_short_code: String,
    pub classifier_url: Option<String>,
    pub text_generator_url: Option<String>,
    pub collaborator_timeout_ms: u64,
    pub payment_request_ttl_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            base_url: env::var("BASE_URL").context("BASE_URL is not set")?,
            mpesa_api_url: env::var("MPESA_API_URL").context("MPESA_API_URL is not set")?,
            mpesa_short_code: env::var("MPESA_SHORT_CODE").unwrap_or_else(|_| "174379".to_string()),
            classifier_url: env::var("CLASSIFIER_URL").ok().filter(|v| !v.is_empty()),
            text_generator_url: env::var("TEXT_GENERATOR_URL").ok().filter(|v| !v.is_empty()),
            collaborator_timeout_ms: parse_u64("COLLABORATOR_TIMEOUT_MS", 3000)?,
            payment_request_ttl_secs: parse_u64("PAYMENT_REQUEST_TTL_SECS", 900)?,
            expiry_sweep_interval_secs: parse_u64("EXPIRY_SWEEP_INTERVAL_SECS", 60)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        url::Url::parse(&self.base_url).context("BASE_URL is not a valid URL")?;
        url::Url::parse(&self.mpesa_api_url).context("MPESA_API_URL is not a valid URL")?;
        for (name, value) in [
            ("CLASSIFIER_URL", &self.classifier_url),
            ("TEXT_GENERATOR_URL", &self.text_generator_url),
        ] {
            if let Some(value) = value {
                url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
            }
        }
        if self.collaborator_timeout_ms == 0 {
            anyhow::bail!("COLLABORATOR_TIMEOUT_MS must be greater than 0");
        }
        if self.payment_request_ttl_secs == 0 || self.payment_request_ttl_secs > MAX_PAYMENT_REQUEST_TTL_SECS {
            anyhow::bail!(
                "PAYMENT_REQUEST_TTL_SECS must be between 1 and {}",
                MAX_PAYMENT_REQUEST_TTL_SECS
            );
        }
        if self.expiry_sweep_interval_secs == 0 {
            anyhow::bail!("EXPIRY_SWEEP_INTERVAL_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn payment_request_ttl(&self) -> chrono::Duration {
        // Clamped so unvalidated values cannot overflow the conversion.
        let secs = self.payment_request_ttl_secs.min(MAX_PAYMENT_REQUEST_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

fn parse_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer", name)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_port: 3000,
        database_url: None,
        base_url: "https://pesa.example.com".to_string(),
        mpesa_api_url: "https://sandbox.safaricom.co.ke".to_string(),
        mpesa_short_code: "174379".to_string(),
        classifier_url: None,
        text_generator_url: None,
        collaborator_timeout_ms: 3000,
        payment_request_ttl_secs: 900,
        expiry_sweep_interval_secs: 60,
        cors_allowed_origins: None,
        log_format: LogFormat::Text,
    }
}
