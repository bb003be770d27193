//! Backend Pool: inference adapters and sequential fallback-on-error.

pub mod adapter;
pub mod openai_compatible;
pub mod pool;
pub mod sse;
pub mod static_adapter;

pub use adapter::{ChatTurn, InferenceAdapter, ProviderError, TextStream};
pub use openai_compatible::OpenAiCompatibleAdapter;
pub use pool::{BackendOutcome, BackendPool};
pub use static_adapter::StaticAdapter;
