//! Bundled engine clients.
//!
//! These are the concrete backends the adapters bind to. Both keep their data in
//! SQLite; any other engine can be plugged in by implementing the store traits.

mod embedding;
mod graph;
mod schema;
mod vector;

pub use embedding::{cosine_distance, Embedder, HashingEmbedder};
pub use graph::{SqliteGraphEngine, SqliteGraphTransaction};
pub use schema::{
    initialize_graph_schema, initialize_vector_schema, is_initialized, GRAPH_SCHEMA_VERSION,
    VECTOR_SCHEMA_VERSION,
};
pub use vector::SqliteVectorEngine;
