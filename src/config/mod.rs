use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Backend kind for the chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Native Ollama `/api/chat` endpoint.
    #[default]
    Ollama,
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint.
    #[serde(alias = "openai_compat", alias = "compat")]
    OpenaiCompat,
    /// No model: model-dependent tools are omitted and every turn reports
    /// the model as unavailable.
    None,
}

/// Chat model settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model name to request (e.g. "llama3.1").
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Full endpoint URL. Overrides scheme/host/port when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key (plain text or env-var reference like `$OPENROUTER_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_name() -> String {
    "gpt-oss:20b-cloud".into()
}

fn default_scheme() -> String {
    "http".into()
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    11434
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model_name(),
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            endpoint: None,
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Base URL built from scheme/host/port, e.g. `http://localhost:11434`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Top-level configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory every tool resolves paths against.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default)]
    pub model: ModelConfig,
    /// Tool-dispatch rounds allowed per turn. `0` means unbounded.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Persist conversation history between runs.
    #[serde(default = "default_true")]
    pub persist_state: bool,
    /// State file location. Defaults to `<home>/state.json`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_tool_rounds() -> usize {
    25
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            model: ModelConfig::default(),
            max_tool_rounds: default_max_tool_rounds(),
            persist_state: true,
            state_file: None,
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one
    /// is an error.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config = Config::from_yaml(&contents)?;
        tracing::debug!(
            path = %path.display(),
            provider = ?config.model.provider,
            model = %config.model.model,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        // An empty document deserialises as unit, not as an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config =
            serde_yaml::from_str(contents).context("failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        if self.model.provider != ProviderKind::None && self.model.model.trim().is_empty() {
            anyhow::bail!("config: model.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!(
                "config: model.temperature {} is outside 0.0..=2.0",
                self.model.temperature
            );
        }
        if self.model.port == 0 {
            anyhow::bail!("config: model.port must be > 0");
        }
        if self.model.timeout_secs == 0 {
            anyhow::bail!("config: model.timeout_secs must be > 0");
        }
        if self.model.provider == ProviderKind::OpenaiCompat
            && self.model.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            anyhow::bail!("config: the openai-compat provider requires model.endpoint");
        }
        Ok(())
    }

    /// Location of the persisted session state.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| crate::code_agent_home().join("state.json"))
    }

    /// Serialize and write the configuration back to a YAML file.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(self).context("serialize config YAML")?;
        crate::files::atomic_write(path, contents)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}
