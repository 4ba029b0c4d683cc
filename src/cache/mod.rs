//! # Caché de Archivos
//! src/cache/mod.rs
//!
//! Caché LRU en memoria, uno por proceso worker.

pub mod file_cache;
pub mod recency;

pub use file_cache::{CacheStats, Fetched, FileCache, PutOutcome, Source};
