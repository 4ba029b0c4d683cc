//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Las piezas del pipeline de conexiones:
//!
//! 1. [`Acceptor`]: acepta y admite en la cola compartida (o responde 503)
//! 2. [`Dispatcher`]: uno por worker, pasa conexiones de la cola al pool
//! 3. [`handler`]: atiende una conexión dentro de un thread del pool
//! 4. [`Server`]: crea todo, forkea los workers y coordina el apagado

pub mod acceptor;
pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod signals;
pub mod supervisor;

pub use acceptor::{Acceptor, AcceptorReport};
pub use context::WorkerContext;
pub use dispatcher::{Dispatcher, DispatcherReport};
pub use handler::{handle_connection, resolve_path, serve_request, Outcome};
pub use supervisor::Server;
