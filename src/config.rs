use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use shuttle_runtime::SecretStore;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_LOCAL_STORE_DIR: &str = "./local-sessions";
const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub workos_api_key: String,
    pub workos_client_id: String,
    pub jwt_secret: String,
    pub client_url: String,
    pub local_store_dir: PathBuf,
    pub completion_timeout: Duration,
}

impl AppConfig {
    pub fn new(secret_store: &SecretStore) -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| secret_store.get(key))
    }

    /// Builds the config from any key lookup; required keys fail with the key's name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} not found", key));

        let database_url = required("DATABASE_URL")?;
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let workos_api_key = required("WORKOS_API_KEY")?;
        let workos_client_id = required("WORKOS_CLIENT_ID")?;
        let jwt_secret = required("JWT_SECRET")?;
        let client_url = required("CLIENT_URL")?;

        let gemini_api_base =
            lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());
        let gemini_model =
            lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let local_store_dir = PathBuf::from(
            lookup("LOCAL_STORE_DIR").unwrap_or_else(|| DEFAULT_LOCAL_STORE_DIR.to_string()),
        );

        let completion_timeout = match lookup("COMPLETION_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("COMPLETION_TIMEOUT_SECS is not a number: {}", e))?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
        };

        Ok(AppConfig {
            database_url,
            gemini_api_key,
            gemini_api_base,
            gemini_model,
            workos_api_key,
            workos_client_id,
            jwt_secret,
            client_url: client_url.trim_end_matches('/').to_string(),
            local_store_dir,
            completion_timeout,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn test_secrets() -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/sokuresu".to_string()),
            ("GEMINI_API_KEY", "gemini-key".to_string()),
            ("WORKOS_API_KEY", "workos-key".to_string()),
            ("WORKOS_CLIENT_ID", "client_123".to_string()),
            ("JWT_SECRET", "test-secret".to_string()),
            ("CLIENT_URL", "https://sokuresu.example/".to_string()),
        ])
    }

    pub(crate) fn test_config() -> AppConfig {
        let secrets = test_secrets();
        AppConfig::from_lookup(|key| secrets.get(key).cloned()).unwrap()
    }

    #[test]
    fn defaults_apply_for_optional_keys() {
        let config = test_config();
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.gemini_api_base, DEFAULT_GEMINI_API_BASE);
        assert_eq!(config.completion_timeout, Duration::from_secs(30));
        assert_eq!(config.local_store_dir, PathBuf::from(DEFAULT_LOCAL_STORE_DIR));
        assert_eq!(config.client_url, "https://sokuresu.example");
    }

    #[test]
    fn missing_required_key_is_named() {
        let mut secrets = test_secrets();
        secrets.remove("JWT_SECRET");
        let err = AppConfig::from_lookup(|key| secrets.get(key).cloned()).unwrap_err();
        assert_eq!(err.to_string(), "JWT_SECRET not found");
    }

    #[test]
    fn timeout_override_must_be_numeric() {
        let mut secrets = test_secrets();
        secrets.insert("COMPLETION_TIMEOUT_SECS", "soon".to_string());
        assert!(AppConfig::from_lookup(|key| secrets.get(key).cloned()).is_err());

        secrets.insert("COMPLETION_TIMEOUT_SECS", "5".to_string());
        let config = AppConfig::from_lookup(|key| secrets.get(key).cloned()).unwrap();
        assert_eq!(config.completion_timeout, Duration::from_secs(5));
    }
}
