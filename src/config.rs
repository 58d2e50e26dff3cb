use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use serde::Deserialize;

use crate::command::{DEFAULT_POWERSHELL, DEFAULT_TIMEOUT_SECS};
use crate::sandbox::SandboxSpec;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_url: String,
    /// Supports ${ENV_VAR} substitution. One key is picked at random
    /// each time a sandbox is provisioned.
    pub api_keys: Vec<String>,
    #[serde(default = "default_template")]
    pub template: String,
    /// Root directory inside the sandbox
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Exported to every command in the sandbox. Supports ${ENV_VAR}.
    #[serde(default)]
    pub envs: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    /// Per command, enforced by `timeout` inside the sandbox
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where sandbox files are copied after each batch. Must exist.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_powershell")]
    pub powershell: String,
    /// Merged over the default policy table
    #[serde(default)]
    pub execution_policy: HashMap<String, bool>,
    /// Merged over the default alias table
    #[serde(default)]
    pub language_aliases: HashMap<String, String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            local_dir: default_local_dir(),
            powershell: default_powershell(),
            execution_policy: HashMap::new(),
            language_aliases: HashMap::new(),
        }
    }
}

fn default_provider() -> String {
    "http".to_string()
}

fn default_template() -> String {
    "base".to_string()
}

fn default_working_dir() -> String {
    "/home/user".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./data/output")
}

fn default_powershell() -> String {
    DEFAULT_POWERSHELL.to_string()
}

impl SandboxConfig {
    pub fn spec(&self) -> SandboxSpec {
        SandboxSpec {
            template: self.template.clone(),
            working_dir: self.working_dir.clone(),
            envs: self.envs.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${SANDBOX_API_KEY}
        let expanded = shellexpand::env(&content)?;
        Self::parse(&expanded)
    }

    /// Parses and validates an already expanded TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sandbox.provider != "http" {
            bail!(
                "Unsupported sandbox provider: '{}'. Supported: 'http'.",
                self.sandbox.provider
            );
        }

        let url = url::Url::parse(&self.sandbox.api_url)
            .map_err(|e| anyhow!("Invalid sandbox.api_url '{}': {e}", self.sandbox.api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("sandbox.api_url must use http or https");
        }

        if self.sandbox.api_keys.iter().all(|k| k.trim().is_empty()) {
            bail!("sandbox.api_keys must contain at least one key");
        }

        if !self.sandbox.working_dir.starts_with('/') {
            bail!(
                "sandbox.working_dir must be absolute (got '{}')",
                self.sandbox.working_dir
            );
        }

        if let Some(name) = self.sandbox.envs.keys().find(|k| !is_env_name(k)) {
            bail!("sandbox.envs: invalid variable name '{name}'");
        }

        if self.executor.timeout_secs == 0 {
            bail!("executor.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
