//! YAML provider/model configuration.
//!
//! ```yaml
//! type: round_robin            # default | round_robin | all
//! default_provider: OpenAI
//! default_model: gpt-4o-mini
//! llm_providers:
//!   - name: OpenAI
//!     credentials_path: /secrets/openai
//!     models:
//!       - name: gpt-4o-mini
//!         weight: 2
//!       - name: gpt-4o
//!         enabled: false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Separator between provider and model in a candidate label.
pub const PROVIDER_MODEL_SEPARATOR: &str = ": ";

/// How the UI picks the active provider/model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// A single configured default provider/model.
    #[default]
    Default,
    /// Weighted round-robin across every enabled model.
    RoundRobin,
    /// Every enabled model is offered to the user.
    All,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Default => write!(f, "default"),
            SelectionMode::RoundRobin => write!(f, "round_robin"),
            SelectionMode::All => write!(f, "all"),
        }
    }
}

/// A single `{name, value}` model parameter override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParam {
    pub name: String,
    pub value: serde_json::Value,
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: i64,
    #[serde(default)]
    pub params: Vec<ModelParam>,
}

impl ModelConfig {
    /// Parameter overrides as a JSON object, later entries winning.
    pub fn params_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Loaded from `credentials_path`; never read from the YAML itself.
    #[serde(skip)]
    pub credentials: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> i64 {
    1
}

/// Provider configuration file (`config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, rename = "type")]
    pub selection: SelectionMode,
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub llm_providers: Vec<ProviderConfig>,
}

impl LlmConfig {
    /// Load configuration from a YAML file and resolve credential files.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to load config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!(
            "Loaded LLM config from {}: {} providers, mode={}",
            path.display(),
            config.llm_providers.len(),
            config.selection
        );
        Ok(config)
    }

    /// Parse configuration from YAML text and resolve credential files.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: LlmConfig = serde_yaml::from_str(text)?;
        config.resolve_credentials();
        Ok(config)
    }

    fn resolve_credentials(&mut self) {
        for provider in &mut self.llm_providers {
            if let Some(path) = &provider.credentials_path {
                provider.credentials = read_credentials(path);
            }
            for model in &mut provider.models {
                if model.credentials.is_none() {
                    if let Some(path) = &model.credentials_path {
                        model.credentials = read_credentials(path);
                    }
                }
            }
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.llm_providers.iter().find(|p| p.name == name)
    }

    pub fn model(&self, provider: &str, model: &str) -> Option<&ModelConfig> {
        self.provider(provider).and_then(|p| p.model(model))
    }

    /// The UI lets the user choose a provider only in `all` mode.
    pub fn is_provider_visible(&self) -> bool {
        self.selection == SelectionMode::All
    }

    /// `"Provider: model"` label of the configured default pair.
    pub fn default_provider_model(&self) -> String {
        join_provider_model(
            self.default_provider.as_deref().unwrap_or_default(),
            self.default_model.as_deref().unwrap_or_default(),
        )
    }

    /// Enabled models of enabled providers, in configuration order.
    fn enabled_models(&self) -> impl Iterator<Item = (&ProviderConfig, &ModelConfig)> {
        self.llm_providers
            .iter()
            .filter(|p| p.enabled)
            .flat_map(|p| p.models.iter().filter(|m| m.enabled).map(move |m| (p, m)))
    }

    /// `"Provider: model"` labels offered to the user.
    pub fn provider_model_list(&self) -> Vec<String> {
        if self.selection == SelectionMode::Default {
            return vec![self.default_provider_model()];
        }
        self.enabled_models()
            .map(|(p, m)| join_provider_model(&p.name, &m.name))
            .collect()
    }

    /// `("Provider: model", weight)` pairs feeding the scheduler.
    pub fn provider_model_weights(&self) -> Vec<(String, i64)> {
        if self.selection == SelectionMode::Default {
            return vec![(self.default_provider_model(), 1)];
        }
        self.enabled_models()
            .map(|(p, m)| (join_provider_model(&p.name, &m.name), m.weight))
            .collect()
    }
}

fn read_credentials(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Some(s.trim_end().to_string()),
        Err(e) => {
            warn!("Failed to read credentials from {}: {}", path.display(), e);
            None
        }
    }
}

/// Build a `"Provider: model"` label.
pub fn join_provider_model(provider: &str, model: &str) -> String {
    format!("{}{}{}", provider, PROVIDER_MODEL_SEPARATOR, model)
}

/// Split a `"Provider: model"` label into its parts.
pub fn split_provider_model(label: &str) -> Option<(&str, &str)> {
    label.split_once(PROVIDER_MODEL_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
type: round_robin
default_provider: OpenAI
default_model: gpt-4o-mini
llm_providers:
  - name: OpenAI
    models:
      - name: gpt-4o-mini
        weight: 2
      - name: gpt-4o
        enabled: false
  - name: Hugging Face
    url: http://tgi:8080
    models:
      - name: mistral-7b
  - name: NVIDIA
    enabled: false
    models:
      - name: mixtral
        params:
          - name: max_tokens
            value: 256
"#;

    #[test]
    fn test_parse_defaults() {
        let config = LlmConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.selection, SelectionMode::RoundRobin);
        assert_eq!(config.llm_providers.len(), 3);

        let hf = config.provider("Hugging Face").unwrap();
        assert!(hf.enabled);
        assert_eq!(hf.url.as_deref(), Some("http://tgi:8080"));
        assert_eq!(hf.models[0].weight, 1);
        assert!(hf.models[0].enabled);

        let mixtral = config.model("NVIDIA", "mixtral").unwrap();
        assert_eq!(mixtral.params_map()["max_tokens"], 256);
    }

    #[test]
    fn test_missing_type_is_default_mode() {
        let config = LlmConfig::from_yaml_str("default_provider: OpenAI\ndefault_model: gpt-4o\n")
            .unwrap();
        assert_eq!(config.selection, SelectionMode::Default);
        assert_eq!(config.provider_model_list(), vec!["OpenAI: gpt-4o"]);
        assert_eq!(
            config.provider_model_weights(),
            vec![("OpenAI: gpt-4o".to_string(), 1)]
        );
        assert!(!config.is_provider_visible());
    }

    #[test]
    fn test_weights_skip_disabled() {
        let config = LlmConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            config.provider_model_weights(),
            vec![
                ("OpenAI: gpt-4o-mini".to_string(), 2),
                ("Hugging Face: mistral-7b".to_string(), 1),
            ]
        );
        assert_eq!(
            config.provider_model_list(),
            vec!["OpenAI: gpt-4o-mini", "Hugging Face: mistral-7b"]
        );
    }

    #[test]
    fn test_credentials_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let key = dir.path().join("key");
        std::fs::write(&key, "sk-test\n").unwrap();

        let yaml = format!(
            "llm_providers:\n  - name: OpenAI\n    credentials_path: {}\n    models:\n      - name: gpt-4o\n      - name: o1\n        credentials: inline\n",
            key.display()
        );
        let config = LlmConfig::from_yaml_str(&yaml).unwrap();
        let openai = config.provider("OpenAI").unwrap();
        assert_eq!(openai.credentials.as_deref(), Some("sk-test"));
        assert_eq!(openai.model("o1").unwrap().credentials.as_deref(), Some("inline"));
        assert!(openai.model("gpt-4o").unwrap().credentials.is_none());
    }

    #[test]
    fn test_unreadable_credentials_are_absent() {
        let yaml = "llm_providers:\n  - name: OpenAI\n    credentials_path: /nonexistent/key\n";
        let config = LlmConfig::from_yaml_str(yaml).unwrap();
        assert!(config.provider("OpenAI").unwrap().credentials.is_none());
    }

    #[test]
    fn test_split_provider_model() {
        assert_eq!(
            split_provider_model("OpenShift AI (vLLM): granite"),
            Some(("OpenShift AI (vLLM)", "granite"))
        );
        assert_eq!(split_provider_model("no-separator"), None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LlmConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
