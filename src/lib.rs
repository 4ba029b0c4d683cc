//! # Concurrent HTTP
//! src/lib.rs
//!
//! Servidor HTTP de archivos estáticos multi-proceso, implementado desde
//! cero para demostrar conceptos de sistemas operativos: memoria
//! compartida, semáforos entre procesos, thread pools y caché LRU.
//!
//! ## Arquitectura
//!
//! - `ipc`: memoria compartida, semáforos POSIX y la cola de conexiones
//! - `pool`: thread pool con cola FIFO local
//! - `cache`: caché LRU de archivos por proceso
//! - `server`: Acceptor, Dispatcher, handler y supervisor
//! - `http`: parsing y construcción de mensajes HTTP
//! - `stats`: estadísticas globales compartidas entre procesos
//! - `logging`: logs de diagnóstico y access log
//! - `config`: configuración (CLI, entorno y archivo)
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use concurrent_http::config::Config;
//! use concurrent_http::server::Server;
//!
//! let config = Config::default();
//! let snapshot = Server::bind(config)?.with_signal_handlers().run()?;
//! println!("{}", snapshot.to_json());
//! # Ok::<(), concurrent_http::error::ServerError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod ipc;
pub mod logging;
pub mod pool;
pub mod server;
pub mod stats;
