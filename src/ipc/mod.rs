//! # Comunicación entre Procesos
//! src/ipc/mod.rs
//!
//! Primitivas compartidas entre el master y los workers:
//! - Regiones `mmap` anónimas heredadas por `fork()`
//! - Semáforos POSIX con `pshared = 1`
//! - La cola circular acotada de conexiones
//! - El transporte que mueve el socket real junto a cada slot

pub mod connection_queue;
pub mod semaphore;
pub mod shared_memory;
pub mod transport;

pub use connection_queue::{Admission, ConnectionQueue, Dequeued, MAX_QUEUE_CAPACITY};
pub use semaphore::{Semaphore, SemaphoreGuard, SemaphoreRole};
pub use shared_memory::SharedRegion;
pub use transport::{HandleTransport, InProcessTransport, ScmRightsTransport};
