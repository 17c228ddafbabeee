// src/cache/mod.rs
pub mod embedding_cache;
pub mod legacy;

pub use embedding_cache::EmbeddingCache;
