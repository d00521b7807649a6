//! HatBot server: axum application streaming retrieval-augmented sales
//! proposals from configurable LLM providers.

pub mod export;
pub mod metrics;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, LlmRuntime};
