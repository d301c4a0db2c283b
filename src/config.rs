//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. the YAML file (`config.yaml` unless `--config` says otherwise)
//! 3. `ADEA_*` environment variables, nested with `__` (`ADEA_SERVER__PORT=8080`)
//! 4. the plain variables deployments already set: `OPENAI_API_KEY`,
//!    `SLACK_BOT_TOKEN`, `HOST`, `PORT`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub openai: OpenAiConfig,
    pub auth: AuthConfig,
    pub anomaly: AnomalyConfig,
    pub slack: SlackConfig,
    /// File the interactive chat appends every query to.
    pub query_log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Falls back to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    /// Password accepted by `/login`. Login is refused while unset.
    pub password: Option<String>,
    /// Static bearer key for machine clients.
    pub api_key: Option<String>,
    pub token_ttl_secs: u64,
    /// Requests per minute per client IP. Unlimited when unset.
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: None,
            api_key: None,
            token_ttl_secs: 900,
            rate_limit_per_minute: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnomalyConfig {
    pub contamination: f64,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    pub training_window: u32,
    pub detection_window: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            trees: 100,
            sample_size: 256,
            seed: 42,
            training_window: 1000,
            detection_window: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlackConfig {
    pub token: Option<String>,
    pub base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://slack.com/api".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `config.yaml`) layered with the environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(path)
            .extract()
            .with_context(|| format!("Invalid configuration (file: {})", path.display()))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("ADEA_").split("__"))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "openai.api_key".into()))
            .merge(Env::raw().only(&["SLACK_BOT_TOKEN"]).map(|_| "slack.token".into()))
            .merge(Env::raw().only(&["HOST"]).map(|_| "server.host".into()))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn query_log_path(&self) -> PathBuf {
        self.query_log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("query_logs.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_the_container_contract() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.openai.model, "gpt-4");
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.anomaly.contamination, 0.1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(Some(Path::new("nope.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
server:
  port: 8080
openai:
  api_key: from-file
  model: gpt-4o
cache:
  ttl_secs: 60
"#,
            )?;

            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.openai.api_key.as_deref(), Some("from-file"));
            assert_eq!(config.openai.model, "gpt-4o");
            assert_eq!(config.cache.ttl_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "openai:\n  api_key: from-file\n")?;
            jail.set_env("OPENAI_API_KEY", "from-env");
            jail.set_env("PORT", "9000");
            jail.set_env("ADEA_AUTH__PASSWORD", "s3cret");

            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.openai.api_key.as_deref(), Some("from-env"));
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.auth.password.as_deref(), Some("s3cret"));
            Ok(())
        });
    }
}
