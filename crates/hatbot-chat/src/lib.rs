//! HatBot Chat: provider registry, streaming LLM clients and the
//! retrieval-QA chain that turns a question into a streamed answer.

pub mod providers;
pub mod qa;
pub mod registry;
pub mod types;

pub use qa::{unique_sources, PromptTemplate, QaResponse, RetrievalQa, PROPOSAL_PROMPT};
pub use registry::{LlmFactory, ModelEndpoint, ProviderKind};
pub use types::*;
