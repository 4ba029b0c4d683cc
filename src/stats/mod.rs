//! # Estadísticas del Servidor
//! src/stats/mod.rs
//!
//! Contadores globales compartidos entre el master y los workers:
//! - Conexiones activas y totales
//! - Bytes enviados y latencia promedio
//! - Respuestas por código de estado
//! - Hits/misses del caché y lecturas de disco

pub mod shared_stats;

pub use shared_stats::{CacheResult, SharedStats, StatsSnapshot};
