//! Runtime: provider scheduling and the producer/consumer streaming bridge.
//!
//! `WeightedRoundRobinScheduler` hands out provider/model candidates in
//! proportion to their weights. `StreamingBridge` runs one unit of LLM work
//! per request on its own task and exposes the fragments it reports as a
//! finite sequence of `(fragment, accumulated_text)` pairs.

pub mod bridge;
pub mod scheduler;
pub mod types;

pub use bridge::{
    BridgeOptions, ChannelSink, FragmentSequence, StreamingBridge, TokenSink,
    DEFAULT_POLL_INTERVAL, TIMEOUT_MESSAGE, WORK_FAILURE_MESSAGE,
};
pub use scheduler::WeightedRoundRobinScheduler;
pub use types::*;
