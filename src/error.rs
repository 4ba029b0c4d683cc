//! # Errores del Servidor
//! src/error.rs
//!
//! Taxonomía de errores del servidor. Solo los errores que deben detener
//! un proceso viajan como `Err`; los fallos de una conexión individual
//! (archivo inexistente, lectura parcial, request malformado) se
//! convierten en un `Outcome` del handler y nunca llegan aquí.

use std::io;
use thiserror::Error;

/// Alias de resultado para operaciones de arranque y supervisión
pub type Result<T> = std::result::Result<T, ServerError>;

/// Fallos de las primitivas de sincronización entre procesos.
///
/// Son fatales para el proceso que los observa: continuar podría
/// violar los invariantes de la cola compartida.
#[derive(Error, Debug)]
pub enum SyncError {
    /// `mmap` de la región compartida falló
    #[error("failed to map shared region of {size} bytes: {source}")]
    Map {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// `sem_init` falló
    #[error("failed to initialize semaphore '{name}': {source}")]
    Init {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// `sem_wait`/`sem_trywait` fallaron por algo distinto de EINTR/EAGAIN
    #[error("wait on semaphore '{name}' failed: {source}")]
    Wait {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// `sem_post` falló
    #[error("post on semaphore '{name}' failed: {source}")]
    Post {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// Capacidad pedida fuera de rango
    #[error("invalid queue capacity {requested} (max {max})")]
    Capacity { requested: usize, max: usize },
}

/// Fallo al agregar una línea al access log.
///
/// `Sync` es fatal como cualquier `SyncError`; `Io` solo pierde la línea.
#[derive(Error, Debug)]
pub enum LogError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("access log write failed: {0}")]
    Io(#[from] io::Error),
}

/// Errores de configuración
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Valor inválido (ej: 0 workers)
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No se pudo leer el archivo de configuración
    #[error("cannot read config file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Línea con un valor que no se puede interpretar
    #[error("config file {path}, line {line}: bad value for {key}: '{value}'")]
    BadValue {
        path: String,
        line: usize,
        key: String,
        value: String,
    },
}

/// Error de nivel superior del servidor
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("synchronization error: {0}")]
    Sync(#[from] SyncError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `fork()` falló al crear un worker
    #[error("failed to fork worker {index}: {source}")]
    Fork {
        index: usize,
        #[source]
        source: nix::Error,
    },

    /// No se pudo instalar un handler de señales
    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),
}
