pub mod backend;
pub mod dynamo;
pub mod error;
pub mod keys;
pub mod memory;
pub mod normalize;
pub mod store;

pub use backend::{CacheBackend, CacheRecord};
pub use dynamo::DynamoBackend;
pub use error::{CacheError, Result};
pub use keys::{prompt_hash, CacheKey};
pub use memory::MemoryBackend;
pub use normalize::StoredValue;
pub use store::{AnalysisRecord, CacheStore, Clock};
