//! HatBot Core: error taxonomy, environment configuration, provider configuration.

pub mod config;
pub mod error;
pub mod llm_config;

pub use config::{DataPaths, HatbotConfig};
pub use error::{Error, Result};
pub use llm_config::{
    join_provider_model, split_provider_model, LlmConfig, ModelConfig, ModelParam,
    ProviderConfig, SelectionMode,
};
