use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shared credential for `x-api-key`. `None` leaves the gate open.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                endpoint: study_extract::llm::DEFAULT_ENDPOINT.to_string(),
                model: study_extract::llm::DEFAULT_MODEL.to_string(),
                request_timeout_secs: study_extract::llm::DEFAULT_TIMEOUT.as_secs(),
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0:8000".to_string(),
                api_key: None,
                cors_origins: vec![
                    "http://localhost:8080".to_string(),
                    "http://localhost:8081".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            log_format: LogFormat::Pretty,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(endpoint) = get("OLLAMA_API_URL") {
            config.llm.endpoint = endpoint;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            config.llm.model = model;
        }
        if let Some(secs) = get("LLM_TIMEOUT_SECS") {
            config.llm.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("LLM_TIMEOUT_SECS is not a number: {}", secs))?;
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        config.server.api_key = get("BACKEND_API_KEY");
        if let Some(origins) = get("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => bail!("LOG_FORMAT must be 'json' or 'pretty', got '{}'", other),
            };
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.llm.request_timeout_secs == 0 {
            bail!("LLM_TIMEOUT_SECS must be greater than zero");
        }
        if !self.llm.endpoint.starts_with("http://") && !self.llm.endpoint.starts_with("https://") {
            bail!("OLLAMA_API_URL must be an http(s) URL, got '{}'", self.llm.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.llm.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(config.llm.model, "llama3:8b");
        assert_eq!(config.llm.timeout(), Duration::from_secs(120));
        assert!(config.server.api_key.is_none());
        assert_eq!(config.server.cors_origins.len(), 3);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[
            ("OLLAMA_MODEL", "mistral"),
            ("LLM_TIMEOUT_SECS", "30"),
            ("BACKEND_API_KEY", "secret"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.request_timeout_secs, 30);
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_blank_api_key_leaves_gate_open() {
        let config = load(&[("BACKEND_API_KEY", "  ")]).unwrap();
        assert!(config.server.api_key.is_none());
    }

    #[test]
    fn test_bad_timeout_rejected() {
        assert!(load(&[("LLM_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("LLM_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        assert!(load(&[("OLLAMA_API_URL", "localhost:11434")]).is_err());
    }
}
