//! # Contexto del Worker
//! src/server/context.rs
//!
//! Todo lo que un thread del pool necesita para atender una conexión. Se
//! construye una vez por worker (después del `fork()` en modo procesos) y
//! se comparte con `Arc` entre el dispatcher y los threads del pool.

use crate::cache::FileCache;
use crate::config::Config;
use crate::logging::AccessLog;
use crate::stats::SharedStats;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub struct WorkerContext {
    /// Índice del worker (0..workers)
    pub id: usize,
    pub config: Arc<Config>,
    /// Document root canonicalizado
    pub document_root: PathBuf,
    /// Caché privado de este worker
    pub cache: FileCache,
    pub stats: Arc<SharedStats>,
    pub access_log: AccessLog,
}

impl WorkerContext {
    pub fn new(id: usize, config: Arc<Config>, stats: Arc<SharedStats>) -> io::Result<Self> {
        let document_root = config.document_root.canonicalize()?;
        let cache = FileCache::new(config.cache_bytes(), config.max_cache_entry_bytes());
        let access_log = AccessLog::new(&config.log_file, config.log_max_bytes, Arc::clone(&stats));

        Ok(Self {
            id,
            config,
            document_root,
            cache,
            stats,
            access_log,
        })
    }
}
