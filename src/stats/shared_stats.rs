//! # Estadísticas Compartidas
//! src/stats/shared_stats.rs
//!
//! Contadores globales del servidor en memoria compartida. Todos los
//! procesos (master y workers) escriben en el mismo bloque, protegido por
//! el semáforo `stats_mutex`. El bloque también aloja `log_mutex`, que
//! serializa el access log entre procesos.
//!
//! Las estadísticas son solo observación: nada en el servidor decide en
//! base a ellas.

use crate::error::SyncError;
use crate::ipc::{Semaphore, SemaphoreGuard, SemaphoreRole, SharedRegion};
use serde::Serialize;
use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::ptr::addr_of_mut;
use std::time::Duration;

/// Códigos con contador propio; el resto va a "other"
const TRACKED_STATUS: [u16; 7] = [200, 400, 403, 404, 405, 500, 503];

#[repr(C)]
#[derive(Clone, Copy)]
struct Counters {
    started_at: i64,
    active_connections: i64,
    total_requests: u64,
    bytes_transferred: u64,
    total_latency_us: u64,
    status: [u64; TRACKED_STATUS.len() + 1],
    cache_hits: u64,
    cache_misses: u64,
    disk_reads: u64,
}

#[repr(C)]
struct StatsBlock {
    stats_mutex: Semaphore,
    log_mutex: Semaphore,
    counters: UnsafeCell<Counters>,
}

// `counters` solo se toca con `stats_mutex` tomado
unsafe impl Sync for StatsBlock {}

/// Resultado del caché visto por un request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResult {
    /// Servido desde el caché
    Hit,
    /// Este request leyó el disco
    Miss,
    /// No estaba en caché, pero otro request ya lo estaba leyendo
    Shared,
}

/// Estadísticas globales compartidas entre procesos
pub struct SharedStats {
    region: SharedRegion<StatsBlock>,
    owner: libc::pid_t,
}

impl SharedStats {
    /// Crea el bloque compartido. Llamar antes del `fork()`.
    pub fn new() -> Result<Self, SyncError> {
        let region: SharedRegion<StatsBlock> = SharedRegion::zeroed(0)?;
        let block = region.as_ptr();

        unsafe {
            Semaphore::init(addr_of_mut!((*block).stats_mutex), SemaphoreRole::StatsMutex, 1)?;
            Semaphore::init(addr_of_mut!((*block).log_mutex), SemaphoreRole::LogMutex, 1)?;
            (*UnsafeCell::raw_get(addr_of_mut!((*block).counters))).started_at =
                chrono::Utc::now().timestamp();
        }

        Ok(Self {
            region,
            owner: std::process::id() as libc::pid_t,
        })
    }

    fn block(&self) -> &StatsBlock {
        unsafe { &*self.region.as_ptr() }
    }

    /// Ejecuta `f` sobre los contadores con `stats_mutex` tomado
    fn update<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> Result<R, SyncError> {
        let block = self.block();
        let _guard = block.stats_mutex.lock()?;
        Ok(f(unsafe { &mut *block.counters.get() }))
    }

    /// Mutex del access log (vive en el mismo bloque compartido)
    pub fn lock_log(&self) -> Result<SemaphoreGuard<'_>, SyncError> {
        self.block().log_mutex.lock()
    }

    pub fn connection_opened(&self) -> Result<(), SyncError> {
        self.update(|c| c.active_connections += 1)
    }

    pub fn connection_closed(&self) -> Result<(), SyncError> {
        self.update(|c| {
            if c.active_connections > 0 {
                c.active_connections -= 1;
            }
        })
    }

    /// Registra el estado terminal de una conexión
    pub fn record_response(&self, status: u16, bytes: u64, latency: Duration) -> Result<(), SyncError> {
        let slot = status_slot(status);
        self.update(|c| {
            c.total_requests += 1;
            c.bytes_transferred += bytes;
            c.total_latency_us += latency.as_micros() as u64;
            c.status[slot] += 1;
        })
    }

    pub fn record_cache(&self, result: CacheResult) -> Result<(), SyncError> {
        self.update(|c| match result {
            CacheResult::Hit => c.cache_hits += 1,
            CacheResult::Miss => {
                c.cache_misses += 1;
                c.disk_reads += 1;
            }
            CacheResult::Shared => c.cache_misses += 1,
        })
    }

    /// Copia consistente de todos los contadores
    pub fn snapshot(&self) -> Result<StatsSnapshot, SyncError> {
        let c = self.update(|c| *c)?;

        let mut status_codes = BTreeMap::new();
        for (i, code) in TRACKED_STATUS.iter().enumerate() {
            if c.status[i] > 0 {
                status_codes.insert(code.to_string(), c.status[i]);
            }
        }
        let other = c.status[TRACKED_STATUS.len()];
        if other > 0 {
            status_codes.insert("other".to_string(), other);
        }

        let uptime = chrono::Utc::now().timestamp() - c.started_at;
        let latency_avg_us = if c.total_requests > 0 {
            c.total_latency_us / c.total_requests
        } else {
            0
        };

        Ok(StatsSnapshot {
            uptime_secs: uptime.max(0) as u64,
            active_connections: c.active_connections.max(0) as u64,
            total_requests: c.total_requests,
            bytes_transferred: c.bytes_transferred,
            status_codes,
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            disk_reads: c.disk_reads,
            latency_avg_us,
        })
    }
}

impl Drop for SharedStats {
    fn drop(&mut self) {
        if std::process::id() as libc::pid_t == self.owner {
            let block = self.block();
            unsafe {
                block.stats_mutex.destroy();
                block.log_mutex.destroy();
            }
        }
    }
}

fn status_slot(status: u16) -> usize {
    TRACKED_STATUS
        .iter()
        .position(|s| *s == status)
        .unwrap_or(TRACKED_STATUS.len())
}

/// Snapshot de estadísticas (para logs y tests)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub active_connections: u64,
    pub total_requests: u64,
    pub bytes_transferred: u64,
    pub status_codes: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub latency_avg_us: u64,
}

impl StatsSnapshot {
    /// Cantidad de respuestas con `status`
    pub fn count(&self, status: u16) -> u64 {
        self.status_codes.get(&status.to_string()).copied().unwrap_or(0)
    }

    /// Hits sobre el total de accesos al caché
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_responses() {
        let stats = SharedStats::new().unwrap();
        stats.record_response(200, 100, Duration::from_millis(10)).unwrap();
        stats.record_response(200, 50, Duration::from_millis(20)).unwrap();
        stats.record_response(404, 10, Duration::from_millis(5)).unwrap();
        stats.record_response(418, 0, Duration::ZERO).unwrap();

        let snapshot = stats.snapshot().unwrap();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.bytes_transferred, 160);
        assert_eq!(snapshot.count(200), 2);
        assert_eq!(snapshot.count(404), 1);
        assert_eq!(snapshot.count(500), 0);
        assert_eq!(snapshot.status_codes.get("other"), Some(&1));
        assert_eq!(snapshot.latency_avg_us, 35_000 / 4);
    }

    #[test]
    fn test_active_connections_never_negative() {
        let stats = SharedStats::new().unwrap();
        stats.connection_opened().unwrap();
        stats.connection_opened().unwrap();
        assert_eq!(stats.snapshot().unwrap().active_connections, 2);

        stats.connection_closed().unwrap();
        stats.connection_closed().unwrap();
        stats.connection_closed().unwrap();
        assert_eq!(stats.snapshot().unwrap().active_connections, 0);
    }

    #[test]
    fn test_cache_results() {
        let stats = SharedStats::new().unwrap();
        stats.record_cache(CacheResult::Miss).unwrap();
        stats.record_cache(CacheResult::Shared).unwrap();
        stats.record_cache(CacheResult::Hit).unwrap();
        stats.record_cache(CacheResult::Hit).unwrap();

        let snapshot = stats.snapshot().unwrap();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.disk_reads, 1);
        assert!((snapshot.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(SharedStats::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.connection_opened().unwrap();
                        stats.record_response(200, 2, Duration::ZERO).unwrap();
                        stats.connection_closed().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = stats.snapshot().unwrap();
        assert_eq!(snapshot.total_requests, 2000);
        assert_eq!(snapshot.bytes_transferred, 4000);
        assert_eq!(snapshot.active_connections, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let stats = SharedStats::new().unwrap();
        stats.record_response(503, 0, Duration::ZERO).unwrap();

        let json: serde_json::Value = serde_json::from_str(&stats.snapshot().unwrap().to_json()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["status_codes"]["503"], 1);
    }

    #[test]
    fn test_log_mutex_is_independent() {
        let stats = SharedStats::new().unwrap();
        let _log = stats.lock_log().unwrap();
        // stats_mutex sigue libre mientras log_mutex está tomado
        stats.record_response(200, 1, Duration::ZERO).unwrap();
    }
}
