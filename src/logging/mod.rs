//! # Logging
//! src/logging/mod.rs
//!
//! Dos salidas distintas:
//! - **Diagnóstico**: eventos `tracing` a stderr (texto o JSON).
//! - **Access log**: una línea en Common Log Format por conexión atendida,
//!   compartida por todos los procesos (ver [`AccessLog`]).

pub mod access_log;

pub use access_log::{AccessEntry, AccessLog};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Inicializa el subscriber global.
///
/// `RUST_LOG`, si está definida, tiene prioridad sobre `level`. Llamar
/// más de una vez no es un error (los tests lo hacen).
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
