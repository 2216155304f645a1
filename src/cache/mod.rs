//! Content-hash caching for expensive setup stages.
//!
//! A stage with a `cache:` block only runs its command when the dependency
//! manifest's SHA-256 differs from the persisted [`CacheRecord`]. The record
//! is written after a successful install, never after a failed one.

pub mod gate;
pub mod record;

pub use gate::{BootstrapPolicy, CacheDecision, CacheGate, CacheRun};
pub use record::{hash_manifest, CacheRecord, HashAlgorithm};
