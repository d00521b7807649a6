//! Shared application state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::export::DocumentExporter;
use crate::metrics::Metrics;
use hatbot_chat::LlmFactory;
use hatbot_core::{HatbotConfig, LlmConfig, Result, SelectionMode};
use hatbot_runtime::{BridgeOptions, Candidate, StreamingBridge, WeightedRoundRobinScheduler};
use hatbot_store::RetrieverFactory;

/// Everything derived from the provider configuration file. Replaced as a
/// whole on reload.
pub struct LlmRuntime {
    pub config: LlmConfig,
    pub factory: LlmFactory,
    pub scheduler: WeightedRoundRobinScheduler,
}

impl LlmRuntime {
    pub fn build(config: LlmConfig) -> Result<Self> {
        let factory = LlmFactory::from_config(&config)?;
        let scheduler = WeightedRoundRobinScheduler::new(candidates(&config))?;
        Ok(Self {
            config,
            factory,
            scheduler,
        })
    }

    /// `"Provider: model"` label used when a request does not name one.
    pub fn selected_provider(&self) -> Result<String> {
        if self.config.selection == SelectionMode::RoundRobin {
            return self.scheduler.next();
        }
        self.scheduler
            .candidates()
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or(hatbot_core::Error::EmptyScheduler)
    }
}

fn candidates(config: &LlmConfig) -> Vec<Candidate> {
    config
        .provider_model_weights()
        .into_iter()
        .map(|(label, weight)| Candidate::new(label, weight))
        .collect()
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: HatbotConfig,
    llm: RwLock<Arc<LlmRuntime>>,
    pub retrievers: RetrieverFactory,
    pub bridge: StreamingBridge,
    pub metrics: Metrics,
    pub exporter: DocumentExporter,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: HatbotConfig, llm_config: LlmConfig) -> Result<Self> {
        let llm = LlmRuntime::build(llm_config)?;
        info!(
            "Provider selection mode: {} ({} candidates)",
            llm.config.selection,
            llm.scheduler.candidates().len()
        );

        let bridge = StreamingBridge::new(BridgeOptions {
            deadline: config.request_timeout,
            serialize_work: config.serialize_work,
            ..BridgeOptions::default()
        });
        let retrievers = RetrieverFactory::new(&config.data_paths.vectordb);
        let exporter = DocumentExporter::new(&config.data_paths.exports);

        Ok(Self {
            llm: RwLock::new(Arc::new(llm)),
            retrievers,
            bridge,
            metrics: Metrics::new()?,
            exporter,
            http: reqwest::Client::new(),
            config,
        })
    }

    /// Current provider runtime. Holders keep their snapshot across a reload.
    pub fn llm(&self) -> Arc<LlmRuntime> {
        self.llm.read().clone()
    }

    /// Re-read the provider configuration file and swap in the result.
    /// The running configuration is kept when anything fails.
    pub fn reload_llm(&self) -> Result<Arc<LlmRuntime>> {
        let path = &self.config.config_file;
        let runtime = LlmConfig::load(path)
            .and_then(LlmRuntime::build)
            .map(Arc::new)
            .map_err(|e| {
                warn!("Reload of {} failed, keeping current config: {}", path.display(), e);
                e
            })?;

        *self.llm.write() = runtime.clone();
        info!(
            "Reloaded {}: mode={}, {} models",
            path.display(),
            runtime.config.selection,
            runtime.factory.len()
        );
        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(yaml: &str) -> LlmRuntime {
        LlmRuntime::build(LlmConfig::from_yaml_str(yaml).unwrap()).unwrap()
    }

    const PROVIDERS: &str = r#"
llm_providers:
  - name: OpenAI
    models:
      - name: gpt-4o
        weight: 2
      - name: gpt-4o-mini
  - name: NVIDIA
    enabled: false
    models:
      - name: mixtral
"#;

    #[test]
    fn test_round_robin_selection() {
        let llm = runtime(&format!("type: round_robin\n{}", PROVIDERS));
        let picks: Vec<String> = (0..3).map(|_| llm.selected_provider().unwrap()).collect();
        assert_eq!(
            picks,
            vec!["OpenAI: gpt-4o", "OpenAI: gpt-4o", "OpenAI: gpt-4o-mini"]
        );
    }

    #[test]
    fn test_default_selection_uses_configured_pair() {
        let llm = runtime(&format!(
            "type: default\ndefault_provider: OpenAI\ndefault_model: gpt-4o-mini\n{}",
            PROVIDERS
        ));
        assert_eq!(llm.selected_provider().unwrap(), "OpenAI: gpt-4o-mini");
        assert_eq!(llm.selected_provider().unwrap(), "OpenAI: gpt-4o-mini");
    }

    #[test]
    fn test_all_mode_selects_first_enabled() {
        let llm = runtime(&format!("type: all\n{}", PROVIDERS));
        assert_eq!(llm.selected_provider().unwrap(), "OpenAI: gpt-4o");
        assert_eq!(llm.selected_provider().unwrap(), "OpenAI: gpt-4o");
    }

    #[test]
    fn test_no_enabled_models_is_rejected() {
        let config = LlmConfig::from_yaml_str(
            "type: all\nllm_providers:\n  - name: OpenAI\n    models:\n      - name: gpt-4o\n        enabled: false\n",
        )
        .unwrap();
        assert!(LlmRuntime::build(config).is_err());
    }
}
