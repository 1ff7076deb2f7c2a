//! Backend adapters.
//!
//! An adapter binds an engine client that may or may not be present to one of
//! the store traits:
//!
//! - **Vector**: [`VectorAdapter`] over [`SqliteVectorEngine`](crate::engine::SqliteVectorEngine)
//! - **Graph**: [`GraphAdapter`] over [`SqliteGraphEngine`](crate::engine::SqliteGraphEngine)
//!
//! `is_available()` reports whether a client was bound. Calls on an unbound
//! adapter fail with a "backend not available" error, and health probes fold
//! every failure into `Ok(false)`.

mod graph;
mod vector;

pub use graph::GraphAdapter;
pub use vector::VectorAdapter;
