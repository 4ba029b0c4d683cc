//! # Concurrent HTTP - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor de archivos estáticos.
//!
//! ```bash
//! ./concurrent_http --document-root ./www --workers 4 --threads-per-worker 10
//! ./concurrent_http --config server.conf
//! ```

use concurrent_http::config::Config;
use concurrent_http::logging;
use concurrent_http::server::Server;

fn main() {
    // Configuración (CLI + entorno + archivo); sus avisos se emiten tras init
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("concurrent_http: {}", e);
            std::process::exit(2);
        }
    };

    logging::init(&config.log_level, config.log_json);
    config.log_warnings();
    config.log_summary();

    let result = Server::bind(config).and_then(|server| server.with_signal_handlers().run());
    match result {
        Ok(_) => tracing::info!("server stopped"),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}
