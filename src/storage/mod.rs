//! Storage layer abstraction.
//!
//! One [`VectorStore`] contract over two structurally different engines: a
//! local file-backed point index and PostgreSQL with pgvector.

pub mod vector;

pub use vector::{
    AnyVectorStore, EmbeddedStore, PgvectorStore, VectorStore, VectorStoreFactory,
};
