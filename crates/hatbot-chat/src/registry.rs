//! Provider/model registry built from the YAML configuration.
//!
//! Every configured model becomes a `ModelEndpoint` holding everything a
//! client needs for one request: the wire protocol, the base URL, the API
//! key and the generation parameters.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use hatbot_core::{split_provider_model, Error, LlmConfig, ModelConfig, ProviderConfig, Result};

pub const OPENAI: &str = "OpenAI";
pub const NVIDIA: &str = "NVIDIA";
pub const HUGGING_FACE: &str = "Hugging Face";
pub const OPENSHIFT_AI_VLLM: &str = "OpenShift AI (vLLM)";

/// Placeholder key for OpenAI-compatible servers that ignore authentication.
pub const DUMMY_API_KEY: &str = "dummy-api-key";

const REMOTE_PREFIX: &str = "Remote-";

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI chat completions.
    OpenAi,
    /// NVIDIA NeMo behind an OpenAI-compatible chat endpoint.
    Nvidia,
    /// Hugging Face text-generation-inference.
    HuggingFace,
    /// vLLM OpenAI-compatible text completions.
    OpenShiftVllm,
}

impl ProviderKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            OPENAI => Ok(Self::OpenAi),
            NVIDIA => Ok(Self::Nvidia),
            HUGGING_FACE => Ok(Self::HuggingFace),
            OPENSHIFT_AI_VLLM => Ok(Self::OpenShiftVllm),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI,
            Self::Nvidia => NVIDIA,
            Self::HuggingFace => HUGGING_FACE,
            Self::OpenShiftVllm => OPENSHIFT_AI_VLLM,
        }
    }

    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::HuggingFace,
            Self::Nvidia,
            Self::OpenAi,
            Self::OpenShiftVllm,
        ]
    }

    fn default_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            _ => "",
        }
    }

    fn default_params(&self) -> Map<String, Value> {
        let params = match self {
            Self::OpenAi => json!({ "temperature": 0.01 }),
            Self::Nvidia => json!({ "max_tokens": 512 }),
            Self::HuggingFace => json!({
                "temperature": 0.01,
                "top_k": 10,
                "top_p": 0.95,
                "repetition_penalty": 1.03,
            }),
            Self::OpenShiftVllm => json!({ "temperature": 0.1, "max_tokens": 1024 }),
        };
        match params {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Whether an absent key is replaced with `DUMMY_API_KEY`.
    fn needs_dummy_key(&self) -> bool {
        matches!(self, Self::Nvidia | Self::OpenShiftVllm)
    }
}

/// Fully resolved connection settings for one provider/model pair.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    pub kind: ProviderKind,
    pub provider: String,
    /// Model name sent on the wire.
    pub model: String,
    /// Base URL; empty when nothing is configured.
    pub url: String,
    pub api_key: Option<String>,
    pub params: Map<String, Value>,
}

impl ModelEndpoint {
    fn resolve(
        kind: ProviderKind,
        provider: &ProviderConfig,
        model: &ModelConfig,
    ) -> Self {
        let url = model
            .url
            .clone()
            .or_else(|| provider.url.clone())
            .unwrap_or_else(|| kind.default_url().to_string());

        let mut api_key = model
            .credentials
            .clone()
            .or_else(|| provider.credentials.clone())
            .filter(|k| !k.is_empty());
        if api_key.is_none() && kind.needs_dummy_key() {
            api_key = Some(DUMMY_API_KEY.to_string());
        }

        let mut params = kind.default_params();
        if kind == ProviderKind::Nvidia {
            params.extend(model.params_map());
        }

        Self {
            kind,
            provider: provider.name.clone(),
            model: model.name.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            params,
        }
    }
}

/// Registry of every configured provider/model pair, keyed by `"provider:model"`.
#[derive(Debug, Default)]
pub struct LlmFactory {
    endpoints: HashMap<String, ModelEndpoint>,
}

impl LlmFactory {
    fn key(provider: &str, model: &str) -> String {
        format!("{}:{}", provider, model)
    }

    /// Register every model of every provider, enabled or not.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut endpoints = HashMap::new();
        for provider in &config.llm_providers {
            let kind = ProviderKind::from_name(&provider.name)?;
            for model in &provider.models {
                let target = match kind {
                    ProviderKind::Nvidia => remote_alias(provider, model),
                    _ => model,
                };
                let endpoint = ModelEndpoint::resolve(kind, provider, target);
                debug!(
                    "Registered {} -> {} ({})",
                    Self::key(&provider.name, &model.name),
                    endpoint.model,
                    if endpoint.url.is_empty() { "<no url>" } else { endpoint.url.as_str() }
                );
                endpoints.insert(Self::key(&provider.name, &model.name), endpoint);
            }
        }
        info!("LLM factory initialized with {} models", endpoints.len());
        Ok(Self { endpoints })
    }

    pub fn get(&self, provider: &str, model: &str) -> Result<&ModelEndpoint> {
        self.endpoints
            .get(&Self::key(provider, model))
            .ok_or_else(|| Error::ModelConfigMissing {
                provider: provider.to_string(),
                model: model.to_string(),
            })
    }

    /// Look up a `"Provider: model"` label.
    pub fn get_by_label(&self, label: &str) -> Result<&ModelEndpoint> {
        let (provider, model) = split_provider_model(label).ok_or_else(|| {
            Error::InvalidConfig(format!("'{}' is not a 'Provider: model' label", label))
        })?;
        self.get(provider, model)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// `Remote-<name>` resolves to the provider's local model of that name, if any.
fn remote_alias<'a>(provider: &'a ProviderConfig, model: &'a ModelConfig) -> &'a ModelConfig {
    let Some(local) = model.name.strip_prefix(REMOTE_PREFIX) else {
        return model;
    };
    provider
        .models
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(local))
        .unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
type: all
llm_providers:
  - name: OpenAI
    models:
      - name: gpt-4o-mini
        credentials: sk-model
      - name: gpt-4o
        url: https://proxy.example.com/v1/
  - name: NVIDIA
    url: http://nemo:8000/v1
    models:
      - name: mixtral
        url: http://mixtral-local:8000/v1
        params:
          - name: max_tokens
            value: 128
          - name: top_p
            value: 0.9
      - name: Remote-MIXTRAL
  - name: Hugging Face
    url: http://tgi:8080
    models:
      - name: mistral-7b
        enabled: false
  - name: OpenShift AI (vLLM)
    url: http://vllm:8000/v1
    models:
      - name: granite
"#;

    fn factory() -> LlmFactory {
        LlmFactory::from_config(&LlmConfig::from_yaml_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_registers_every_model() {
        let factory = factory();
        assert_eq!(factory.len(), 6);
        // Disabled models are still registered
        assert!(factory.get("Hugging Face", "mistral-7b").is_ok());
    }

    #[test]
    fn test_url_resolution() {
        let factory = factory();
        assert_eq!(
            factory.get("OpenAI", "gpt-4o-mini").unwrap().url,
            "https://api.openai.com/v1"
        );
        assert_eq!(
            factory.get("OpenAI", "gpt-4o").unwrap().url,
            "https://proxy.example.com/v1"
        );
        assert_eq!(
            factory.get("NVIDIA", "mixtral").unwrap().url,
            "http://mixtral-local:8000/v1"
        );
        assert_eq!(factory.get("Hugging Face", "mistral-7b").unwrap().url, "http://tgi:8080");
    }

    #[test]
    fn test_credentials_and_dummy_key() {
        let factory = factory();
        let mini = factory.get("OpenAI", "gpt-4o-mini").unwrap();
        assert_eq!(mini.api_key.as_deref(), Some("sk-model"));
        assert!(factory.get("OpenAI", "gpt-4o").unwrap().api_key.is_none());
        assert_eq!(
            factory.get("OpenShift AI (vLLM)", "granite").unwrap().api_key.as_deref(),
            Some(DUMMY_API_KEY)
        );
        assert!(factory.get("Hugging Face", "mistral-7b").unwrap().api_key.is_none());
    }

    #[test]
    fn test_default_params() {
        let factory = factory();
        let tgi = factory.get("Hugging Face", "mistral-7b").unwrap();
        assert_eq!(tgi.params["top_k"], 10);
        assert_eq!(tgi.params["repetition_penalty"], 1.03);
        let vllm = factory.get("OpenShift AI (vLLM)", "granite").unwrap();
        assert_eq!(vllm.params["max_tokens"], 1024);
        assert_eq!(vllm.kind, ProviderKind::OpenShiftVllm);
    }

    #[test]
    fn test_nvidia_params_override_and_remote_alias() {
        let factory = factory();
        let mixtral = factory.get("NVIDIA", "mixtral").unwrap();
        assert_eq!(mixtral.params["max_tokens"], 128);
        assert_eq!(mixtral.params["top_p"], 0.9);

        let remote = factory.get("NVIDIA", "Remote-MIXTRAL").unwrap();
        assert_eq!(remote.model, "mixtral");
        assert_eq!(remote.url, "http://mixtral-local:8000/v1");
        assert_eq!(remote.api_key.as_deref(), Some(DUMMY_API_KEY));
    }

    #[test]
    fn test_missing_model_and_label_lookup() {
        let factory = factory();
        assert!(matches!(
            factory.get("OpenAI", "gpt-5"),
            Err(Error::ModelConfigMissing { .. })
        ));
        assert_eq!(factory.get_by_label("OpenAI: gpt-4o").unwrap().model, "gpt-4o");
        assert!(matches!(
            factory.get_by_label("gpt-4o"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig::from_yaml_str(
            "llm_providers:\n  - name: Bedrock\n    models:\n      - name: claude\n",
        )
        .unwrap();
        let err = LlmFactory::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::UnsupportedProvider(p) if p == "Bedrock"));
    }
}
