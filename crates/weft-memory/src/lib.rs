//! Categorized, time-windowed conversational memory (§4.G).

pub mod error;
pub mod store;
pub mod tags;

pub use error::MemoryError;
pub use store::{MemoryMessage, MemoryStore};
pub use tags::{extract_tags, jaccard};
