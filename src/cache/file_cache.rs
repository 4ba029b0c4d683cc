//! # Caché LRU de Archivos
//! src/cache/file_cache.rs
//!
//! Caché en memoria de archivos estáticos, privado de cada worker.
//!
//! ## Concurrencia
//!
//! - `get`: copia los bytes con el lock de lectura (muchos lectores en
//!   paralelo) y después toma el lock de escritura solo para promover.
//! - `put`: copia los bytes fuera del lock y muta con el lock de escritura.
//! - `get_or_load`: carga de disco deduplicada por ruta (single flight).
//!   Un líder lee el archivo; los demás esperan su resultado.
//!
//! Los llamadores siempre reciben una copia propia, nunca una referencia
//! al almacenamiento interno.

use super::recency::RecencyList;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Resultado de `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Entrada nueva al frente de la lista
    Inserted,
    /// La ruta ya existía: bytes reemplazados y promovida
    Replaced,
    /// Payload más grande que el límite por entrada o que el caché entero
    TooLarge,
    /// No hubo memoria para copiar los bytes; nada cambió
    NoMemory,
}

/// De dónde salieron los bytes de `get_or_load`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Hit del caché
    Cache,
    /// Este llamador leyó el disco
    Disk,
    /// Otro thread leyó el disco y compartió el resultado
    Flight,
}

/// Bytes obtenidos por `get_or_load`
#[derive(Debug)]
pub struct Fetched {
    pub data: Vec<u8>,
    pub source: Source,
}

/// Contadores del caché
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bytes: usize,
    pub entries: usize,
    pub max_bytes: usize,
}

struct CacheCore {
    index: HashMap<String, usize>,
    list: RecencyList,
    total_size: usize,
}

type FlightResult = Result<Vec<u8>, (io::ErrorKind, String)>;

/// Carga en curso de una ruta
struct Flight {
    result: Mutex<Option<FlightResult>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, result: FlightResult) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> io::Result<Vec<u8>> {
        let mut slot = self.result.lock();
        while slot.is_none() {
            self.done.wait(&mut slot);
        }
        match slot.as_ref() {
            Some(Ok(data)) => Ok(data.clone()),
            Some(Err((kind, message))) => Err(io::Error::new(*kind, message.clone())),
            None => unreachable!(),
        }
    }
}

/// Termina el vuelo aunque el loader haga panic, para no dejar
/// seguidores bloqueados para siempre.
struct FlightGuard<'a> {
    cache: &'a FileCache,
    path: &'a str,
    flight: Arc<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.complete(Err((
            io::ErrorKind::Other,
            "loader did not finish".to_string(),
        )));
        self.cache.flights.lock().remove(self.path);
    }
}

/// Caché LRU limitado por bytes
pub struct FileCache {
    core: RwLock<CacheCore>,
    max_size: usize,
    max_entry_size: usize,
    flights: Mutex<HashMap<String, Arc<Flight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl FileCache {
    /// Crea un caché de `max_size` bytes que acepta entradas de hasta
    /// `max_entry_size` bytes.
    pub fn new(max_size: usize, max_entry_size: usize) -> Self {
        Self {
            core: RwLock::new(CacheCore {
                index: HashMap::new(),
                list: RecencyList::new(),
                total_size: 0,
            }),
            max_size,
            max_entry_size,
            flights: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// ¿Un payload de `len` bytes puede entrar al caché?
    pub fn is_cacheable(&self, len: usize) -> bool {
        len <= self.max_entry_size && len <= self.max_size
    }

    /// Busca `path` y devuelve una copia de sus bytes.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        match self.copy_of(path) {
            Some((index, data)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.promote(path, index);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Copia bajo el lock de lectura, sin promover ni contar
    fn copy_of(&self, path: &str) -> Option<(usize, Vec<u8>)> {
        let core = self.core.read();
        let index = *core.index.get(path)?;
        let entry = core.list.get(index)?;

        let mut copy = Vec::new();
        if copy.try_reserve_exact(entry.size()).is_err() {
            tracing::warn!(path, size = entry.size(), "no memory to copy cached entry");
            return None;
        }
        copy.extend_from_slice(&entry.data);
        Some((index, copy))
    }

    /// Mueve la entrada al frente si sigue en el caché
    fn promote(&self, path: &str, index: usize) {
        let mut core = self.core.write();
        // Pudo haber sido desalojada (y el slot reusado) entre ambos locks
        if core.index.get(path) == Some(&index) {
            core.list.move_to_front(index);
        }
    }

    /// Guarda una copia de `bytes` bajo `path`.
    pub fn put(&self, path: &str, bytes: &[u8]) -> PutOutcome {
        if !self.is_cacheable(bytes.len()) {
            return PutOutcome::TooLarge;
        }

        // 1. Copiar fuera del lock
        let mut data = Vec::new();
        if data.try_reserve_exact(bytes.len()).is_err() {
            return PutOutcome::NoMemory;
        }
        data.extend_from_slice(bytes);

        let mut core = self.core.write();

        // 2. Reemplazo en su lugar
        if let Some(&index) = core.index.get(path) {
            let old_size = match core.list.get_mut(index) {
                Some(entry) => std::mem::replace(&mut entry.data, data).len(),
                None => unreachable!("index points to an empty slot"),
            };
            core.total_size = core.total_size - old_size + bytes.len();
            core.list.move_to_front(index);
            // Si creció, desalojar desde la cola (nunca la recién promovida)
            self.evict_until(&mut core, 0);
            return PutOutcome::Replaced;
        }

        // 3. Reservar todo antes de tocar la lista
        if core.list.reserve_slot().is_err() || core.index.try_reserve(1).is_err() {
            return PutOutcome::NoMemory;
        }

        // 4. Desalojar LRU hasta que quepa, e insertar al frente
        self.evict_until(&mut core, bytes.len());
        let index = core.list.push_front(path.to_string(), data);
        core.index.insert(path.to_string(), index);
        core.total_size += bytes.len();

        PutOutcome::Inserted
    }

    /// Desaloja desde `tail` hasta que `total_size + incoming <= max_size`
    fn evict_until(&self, core: &mut CacheCore, incoming: usize) {
        while core.total_size + incoming > self.max_size {
            let Some(entry) = core.list.pop_back() else {
                break;
            };
            core.index.remove(&entry.path);
            core.total_size -= entry.size();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path = %entry.path, size = entry.size(), "evicted from cache");
        }
    }

    /// Devuelve `path` del caché o lo carga con `load`.
    ///
    /// Para una misma ruta hay a lo sumo una llamada a `load` en curso:
    /// los llamadores concurrentes esperan y reciben copias del mismo
    /// resultado (incluido el error). Si el resultado es cacheable queda
    /// en el caché antes de liberar a los seguidores.
    pub fn get_or_load<F>(&self, path: &str, load: F) -> io::Result<Fetched>
    where
        F: FnOnce() -> io::Result<Vec<u8>>,
    {
        if let Some(data) = self.get(path) {
            return Ok(Fetched {
                data,
                source: Source::Cache,
            });
        }

        let (flight, leader) = {
            let mut flights = self.flights.lock();
            match flights.get(path) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    flights.insert(path.to_string(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !leader {
            return flight.wait().map(|data| Fetched {
                data,
                source: Source::Flight,
            });
        }

        let guard = FlightGuard {
            cache: self,
            path,
            flight,
        };

        // Un líder anterior pudo terminar entre nuestro `get` y el registro
        if let Some((_, data)) = self.copy_of(path) {
            guard.flight.complete(Ok(data.clone()));
            return Ok(Fetched {
                data,
                source: Source::Cache,
            });
        }

        match load() {
            Ok(data) => {
                self.put(path, &data);
                guard.flight.complete(Ok(data.clone()));
                Ok(Fetched {
                    data,
                    source: Source::Disk,
                })
            }
            Err(e) => {
                guard.flight.complete(Err((e.kind(), e.to_string())));
                Err(e)
            }
        }
    }

    /// Contadores actuales
    pub fn stats(&self) -> CacheStats {
        let core = self.core.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes: core.total_size,
            entries: core.list.len(),
            max_bytes: self.max_size,
        }
    }

    /// Rutas de la más reciente a la menos reciente
    pub fn paths_by_recency(&self) -> Vec<String> {
        let core = self.core.read();
        core.list
            .iter_indices()
            .filter_map(|i| core.list.get(i).map(|e| e.path.clone()))
            .collect()
    }

    /// Verifica los invariantes de tamaño, índice y enlaces
    pub fn check_invariants(&self) -> Result<(), String> {
        let core = self.core.read();
        core.list.check_links()?;

        let mut sum = 0;
        let mut seen = 0;
        for index in core.list.iter_indices() {
            let entry = core.list.get(index).ok_or("dangling index")?;
            if core.index.get(&entry.path) != Some(&index) {
                return Err(format!("index does not point to entry '{}'", entry.path));
            }
            sum += entry.size();
            seen += 1;
        }

        if seen != core.index.len() {
            return Err(format!("{} linked entries but {} indexed paths", seen, core.index.len()));
        }
        if sum != core.total_size {
            return Err(format!("total_size is {} but entries add up to {}", core.total_size, sum));
        }
        if core.total_size > self.max_size {
            return Err(format!("total_size {} exceeds max {}", core.total_size, self.max_size));
        }
        Ok(())
    }
}
