//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use study_companion_core::domain::DuplicationPolicy;
use tracing::Level;

/// The Gemini endpoint that speaks the OpenAI chat completions protocol.
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_CONVERT_API_URL: &str = "https://v2.convertapi.com/convert/pdf/to/txt";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub generation_model: String,
    pub convert_api_key: String,
    pub convert_api_url: String,
    pub external_call_timeout: Duration,
    pub duplication_policy: DuplicationPolicy,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required =
            |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- External Services ---
        // The Gemini key wins; an OpenAI key works with an OpenAI base url.
        let llm_api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
        let llm_base_url = var_or("LLM_BASE_URL", DEFAULT_LLM_BASE_URL);
        let generation_model = var_or("GENERATION_MODEL", "gemini-2.0-flash-exp");
        let convert_api_key = required("CONVERT_API_KEY")?;
        let convert_api_url = var_or("CONVERT_API_URL", DEFAULT_CONVERT_API_URL);

        let timeout_str = var_or("EXTERNAL_CALL_TIMEOUT_SECS", "60");
        let external_call_timeout = match timeout_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "EXTERNAL_CALL_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                ))
            }
        };

        // --- Product Settings ---
        let policy_str = var_or("DUPLICATION_POLICY", "metadata_only");
        let duplication_policy = match policy_str.to_lowercase().as_str() {
            "metadata_only" => DuplicationPolicy::MetadataOnly,
            "with_artifacts" => DuplicationPolicy::WithArtifacts,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "DUPLICATION_POLICY".to_string(),
                    format!("'{}' is not metadata_only or with_artifacts", policy_str),
                ))
            }
        };

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");
        let max_upload_str = var_or("MAX_UPLOAD_BYTES", "26214400");
        let max_upload_bytes = max_upload_str.parse::<usize>().map_err(|e| {
            ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
        })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            llm_api_key,
            llm_base_url,
            generation_model,
            convert_api_key,
            convert_api_url,
            external_call_timeout,
            duplication_policy,
            cors_origin,
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/study"),
        ("GEMINI_API_KEY", "g-key"),
        ("CONVERT_API_KEY", "c-key"),
    ];

    #[test]
    fn defaults_fill_everything_optional() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.llm_base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(config.generation_model, "gemini-2.0-flash-exp");
        assert_eq!(config.external_call_timeout, Duration::from_secs(60));
        assert_eq!(config.duplication_policy, DuplicationPolicy::MetadataOnly);
    }

    #[test]
    fn openai_key_is_a_fallback() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/study"),
            ("OPENAI_API_KEY", "o-key"),
            ("CONVERT_API_KEY", "c-key"),
        ]))
        .unwrap();
        assert_eq!(config.llm_api_key, "o-key");
    }

    #[test]
    fn missing_convert_key_is_reported() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "CONVERT_API_KEY"));
    }

    #[test]
    fn bad_policy_and_timeout_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DUPLICATION_POLICY", "everything"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(ref v, _)) if v == "DUPLICATION_POLICY"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EXTERNAL_CALL_TIMEOUT_SECS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(ref v, _)) if v == "EXTERNAL_CALL_TIMEOUT_SECS"
        ));
    }
}
