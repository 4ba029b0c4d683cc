//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración resuelta una sola vez al arrancar y compartida sin
//! cambios (`Arc<Config>`) por el master, los workers y sus threads.
//!
//! ## Fuentes (de menor a mayor prioridad)
//!
//! 1. Valores por defecto
//! 2. Variables de entorno
//! 3. Argumentos CLI
//! 4. Archivo `--config` en formato `CLAVE=valor`
//!
//! ### CLI
//! ```bash
//! ./concurrent_http --port 8080 \
//!   --document-root ./www \
//!   --workers 4 \
//!   --threads-per-worker 10 \
//!   --queue-capacity 100
//! ```
//!
//! ### Archivo de configuración
//! ```text
//! # server.conf
//! PORT=8080
//! DOCUMENT_ROOT=/var/www/html
//! NUM_WORKERS=4
//! THREADS_PER_WORKER=10
//! MAX_QUEUE_SIZE=100
//! LOG_FILE=access.log
//! CACHE_SIZE_MB=10
//! TIMEOUT_SECONDS=30
//! ```

use crate::error::ConfigError;
use crate::ipc::MAX_QUEUE_CAPACITY;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cómo se ejecutan los workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Un proceso por worker (`fork()`)
    Processes,
    /// Un thread dispatcher por worker dentro del master
    Threads,
}

/// Configuración del servidor de archivos estáticos
#[derive(Debug, Clone, Parser)]
#[command(name = "concurrent_http")]
#[command(about = "Servidor HTTP de archivos estáticos multi-proceso")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Directorio raíz de los archivos servidos
    #[arg(long, default_value = "./www", env = "DOCUMENT_ROOT")]
    pub document_root: PathBuf,

    // === Workers ===
    /// Número de procesos worker
    #[arg(short, long, default_value = "4", env = "NUM_WORKERS")]
    pub workers: usize,

    /// Threads del pool de cada worker
    #[arg(short, long = "threads-per-worker", default_value = "10", env = "THREADS_PER_WORKER")]
    pub threads_per_worker: usize,

    /// Procesos separados o threads en un solo proceso
    #[arg(long, value_enum, default_value = "processes", env = "RUN_MODE")]
    pub mode: RunMode,

    // === Cola ===
    /// Capacidad de la cola compartida de conexiones
    #[arg(short, long = "queue-capacity", default_value = "100", env = "MAX_QUEUE_SIZE")]
    pub queue_capacity: usize,

    // === Caché ===
    /// Tamaño del caché de cada worker en MB
    #[arg(long = "cache-size-mb", default_value = "10", env = "CACHE_SIZE_MB")]
    pub cache_size_mb: usize,

    /// Tamaño máximo de un archivo cacheable en KB
    #[arg(long = "max-cache-file-kb", default_value = "1024", env = "MAX_CACHE_FILE_KB")]
    pub max_cache_file_kb: usize,

    // === Logging ===
    /// Archivo del access log
    #[arg(long = "log-file", default_value = "access.log", env = "LOG_FILE")]
    pub log_file: PathBuf,

    /// Tamaño a partir del cual se rota el access log
    #[arg(long = "log-max-bytes", default_value = "10485760", env = "LOG_MAX_BYTES")]
    pub log_max_bytes: u64,

    /// Nivel de los logs de diagnóstico (RUST_LOG tiene prioridad)
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Logs de diagnóstico en JSON
    #[arg(long = "log-json", env = "LOG_JSON")]
    pub log_json: bool,

    // === Timeouts ===
    /// Timeout de lectura/escritura de sockets en segundos (0 = sin timeout)
    #[arg(long = "timeout-seconds", default_value = "30", env = "TIMEOUT_SECONDS")]
    pub timeout_seconds: u64,

    /// Cada cuántos segundos el master registra las estadísticas (0 = nunca)
    #[arg(long = "stats-interval", default_value = "30", env = "STATS_INTERVAL")]
    pub stats_interval_secs: u64,

    /// Archivo `CLAVE=valor` aplicado sobre los valores anteriores
    #[arg(short, long = "config")]
    pub config_file: Option<PathBuf>,

    /// Avisos del archivo de configuración, emitidos por `log_warnings`
    /// una vez que el subscriber de tracing existe
    #[arg(skip)]
    pub warnings: Vec<String>,
}

impl Config {
    /// Parsea CLI/env, aplica el archivo `--config` y valida.
    ///
    /// Errores de CLI terminan el proceso con el mensaje de clap.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(Config::parse())
    }

    /// Igual que `load` pero desde argumentos explícitos
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::resolve(config)
    }

    fn resolve(mut config: Config) -> Result<Self, ConfigError> {
        if let Some(path) = config.config_file.clone() {
            config.apply_file(&path)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Aplica un archivo `CLAVE=valor`. Líneas vacías y comentarios (`#`)
    /// se ignoran; claves desconocidas solo generan un warning.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_str(&contents, &path.display().to_string())
    }

    fn apply_str(&mut self, contents: &str, origin: &str) -> Result<(), ConfigError> {
        for (number, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                self.warnings
                    .push(format!("{}:{}: ignoring config line without '='", origin, number + 1));
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            let bad_value = || ConfigError::BadValue {
                path: origin.to_string(),
                line: number + 1,
                key: key.to_string(),
                value: value.to_string(),
            };

            match key {
                "PORT" => self.port = value.parse().map_err(|_| bad_value())?,
                "DOCUMENT_ROOT" => self.document_root = PathBuf::from(value),
                "NUM_WORKERS" => self.workers = value.parse().map_err(|_| bad_value())?,
                "THREADS_PER_WORKER" => {
                    self.threads_per_worker = value.parse().map_err(|_| bad_value())?
                }
                "MAX_QUEUE_SIZE" => self.queue_capacity = value.parse().map_err(|_| bad_value())?,
                "LOG_FILE" => self.log_file = PathBuf::from(value),
                "CACHE_SIZE_MB" => self.cache_size_mb = value.parse().map_err(|_| bad_value())?,
                "TIMEOUT_SECONDS" => self.timeout_seconds = value.parse().map_err(|_| bad_value())?,
                other => {
                    self.warnings
                        .push(format!("{}:{}: ignoring unknown config key {}", origin, number + 1, other));
                }
            }
        }
        Ok(())
    }

    /// Obtiene la dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Presupuesto del caché de cada worker en bytes
    pub fn cache_bytes(&self) -> usize {
        self.cache_size_mb.saturating_mul(1024 * 1024)
    }

    /// Tamaño máximo de una entrada del caché en bytes
    pub fn max_cache_entry_bytes(&self) -> usize {
        self.max_cache_file_kb.saturating_mul(1024)
    }

    /// Timeout de sockets (`None` = bloquear indefinidamente)
    pub fn socket_timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".to_string()));
        }
        if self.threads_per_worker == 0 {
            return Err(ConfigError::Invalid("threads per worker must be >= 1".to_string()));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue capacity must be between 1 and {}",
                MAX_QUEUE_CAPACITY
            )));
        }
        if self.cache_size_mb == 0 {
            return Err(ConfigError::Invalid("cache size must be >= 1 MB".to_string()));
        }
        if !self.document_root.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "document root {} is not a directory",
                self.document_root.display()
            )));
        }
        Ok(())
    }

    /// Emite los avisos acumulados al cargar el archivo de configuración
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!("{}", warning);
        }
    }

    /// Registra un resumen de la configuración
    pub fn log_summary(&self) {
        tracing::info!(
            address = %self.address(),
            document_root = %self.document_root.display(),
            mode = ?self.mode,
            workers = self.workers,
            threads_per_worker = self.threads_per_worker,
            queue_capacity = self.queue_capacity,
            cache_mb = self.cache_size_mb,
            max_cache_file_kb = self.max_cache_file_kb,
            log_file = %self.log_file.display(),
            timeout_seconds = self.timeout_seconds,
            "configuration loaded"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            document_root: PathBuf::from("./www"),
            workers: 4,
            threads_per_worker: 10,
            mode: RunMode::Processes,
            queue_capacity: 100,
            cache_size_mb: 10,
            max_cache_file_kb: 1024,
            log_file: PathBuf::from("access.log"),
            log_max_bytes: 10 * 1024 * 1024,
            log_level: "info".to_string(),
            log_json: false,
            timeout_seconds: 30,
            stats_interval_secs: 30,
            config_file: None,
            warnings: Vec::new(),
        }
    }
}
