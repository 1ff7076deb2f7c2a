//! Memory entries and retention.
//!
//! A [`MemoryEntry`] is the unit the orchestrator stores. Entries are
//! immutable after creation apart from access bookkeeping, and are persisted
//! in the vector store as documents (see [`MemoryEntry::to_document`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use recall_core::memory::{MemoryEntry, MemoryMetadata, MemoryType, RetentionPolicy};
//!
//! let entry = MemoryEntry::new(
//!     "thread-1",
//!     "The API uses JWT for auth",
//!     MemoryMetadata::new(MemoryType::Fact).with_importance(0.9),
//! );
//!
//! let evict = select_for_eviction(&[entry], &RetentionPolicy::keep_top(10), Utc::now());
//! ```

mod entry;
#[cfg(test)]
mod proptest;
mod retention;

pub(crate) use entry::keys;
pub use entry::{
    clamp_importance, MemoryEntry, MemoryId, MemoryMetadata, MemoryType, NewMemory,
    DEFAULT_IMPORTANCE,
};
pub use retention::{select_for_eviction, EvictionStrategy, RetentionPolicy};
