use std::path::Path;

use formpilot_agent::{BrowserOptions, CatalogOptions};
use formpilot_resume::{LlmConfig, ResumeConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Top-level config. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Browser launch and navigation.
    pub browser: BrowserOptions,

    /// Catalog store and description options.
    pub catalog: CatalogOptions,

    /// LLM endpoint used for resume structuring.
    pub llm: LlmConfig,

    /// HTTP API.
    pub server: ServerConfig,

    /// Resume pipeline artifacts.
    pub resume: ResumeConfig,
}

/// HTTP API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string. An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` (or the defaults), then apply `FORMPILOT_*` environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FORMPILOT_HEADLESS") {
            self.browser.headless = parse_bool("FORMPILOT_HEADLESS", &v)?;
        }
        if let Some(key) = lookup("FORMPILOT_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Some(url) = lookup("FORMPILOT_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("FORMPILOT_LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Validate the config.
    fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".into()));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(Error::Config("llm.base_url must not be empty".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be at least 1".into()));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::Config("llm.max_tokens must be at least 1".into()));
        }
        if self.browser.navigation_timeout_ms == 0 {
            return Err(Error::Config(
                "browser.navigation_timeout_ms must be at least 1".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server.port must not be 0".into()));
        }
        if self.catalog.store_path.as_os_str().is_empty() {
            return Err(Error::Config("catalog.store_path must not be empty".into()));
        }
        if self.resume.text_path.as_os_str().is_empty() {
            return Err(Error::Config("resume.text_path must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.browser.headless);
        assert_eq!(config.browser.navigation_timeout_ms, 30_000);
        assert!(config.catalog.verify_fresh);
        assert!(!config.catalog.viewport_only);
        assert_eq!(
            config.catalog.store_path.to_str(),
            Some("clickable_items.json")
        );
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.resume.text_path.to_str(), Some("cv.txt"));
    }

    #[test]
    fn test_parse_sections() {
        let yaml = r#"
browser:
  headless: false
  proxy: "http://localhost:8080"
  viewport:
    width: 1920
    height: 1080
catalog:
  store_path: "/tmp/catalog.json"
  verify_fresh: false
llm:
  base_url: "https://api.siliconflow.cn/v1"
  model: "deepseek-ai/DeepSeek-V3"
server:
  port: 9000
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(
            config.browser.proxy.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(config.browser.viewport.as_ref().unwrap().width, 1920);
        assert!(!config.catalog.verify_fresh);
        assert_eq!(config.catalog.description_max_chars, 120);
        assert_eq!(config.llm.model, "deepseek-ai/DeepSeek-V3");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_validation() {
        assert!(Config::parse("server:\n  port: 0\n").is_err());
        assert!(Config::parse("llm:\n  model: \"\"\n").is_err());
        assert!(Config::parse("llm:\n  timeout_secs: 0\n").is_err());
        assert!(Config::parse("browser:\n  navigation_timeout_ms: 0\n").is_err());
        assert!(Config::parse("browser: [1, 2]\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("FORMPILOT_HEADLESS", "false"),
                ("FORMPILOT_LLM_API_KEY", "sk-formpilot"),
                ("OPENAI_API_KEY", "sk-openai"),
                ("FORMPILOT_LLM_MODEL", "gpt-4o"),
            ]))
            .unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-formpilot"));
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn test_openai_key_fallback() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("OPENAI_API_KEY", "sk-openai")]))
            .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn test_bad_headless_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("FORMPILOT_HEADLESS", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORMPILOT_HEADLESS"));
    }
}
