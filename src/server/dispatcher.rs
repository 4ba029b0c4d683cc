//! # Dispatcher
//! src/server/dispatcher.rs
//!
//! Un dispatcher por worker: saca conexiones de la cola compartida y las
//! entrega al thread pool local.
//!
//! ```text
//! ConnectionQueue ──dequeue──► Dispatcher ──submit──► ThreadPool ──► handle_connection
//! ```
//!
//! Termina al recibir la marca de apagado. Antes de salir apaga el pool:
//! lo ya encolado se atiende, lo que nunca arrancó se libera sin atender.

use super::context::WorkerContext;
use super::handler::handle_connection;
use crate::error::SyncError;
use crate::http::{Response, StatusCode};
use crate::ipc::{ConnectionQueue, Dequeued, HandleTransport};
use crate::pool::ThreadPool;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

/// Resumen de la vida de un dispatcher
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherReport {
    /// Conexiones entregadas al pool
    pub dispatched: u64,
    /// Conexiones que el pool no aceptó (respondidas con 500)
    pub refused: u64,
    /// Slots cuyo descriptor no se pudo recuperar
    pub lost: u64,
    /// Conexiones liberadas sin atender durante el apagado
    pub released: u64,
}

pub struct Dispatcher<T: HandleTransport<Handle = TcpStream>> {
    queue: Arc<ConnectionQueue<T>>,
    ctx: Arc<WorkerContext>,
    pool: ThreadPool<TcpStream>,
}

impl<T: HandleTransport<Handle = TcpStream>> Dispatcher<T> {
    /// Crea el dispatcher y arranca el pool del worker
    pub fn new(queue: Arc<ConnectionQueue<T>>, ctx: Arc<WorkerContext>) -> io::Result<Self> {
        let handler_ctx = Arc::clone(&ctx);
        let pool = ThreadPool::new(
            &format!("worker{}", ctx.id),
            ctx.config.threads_per_worker,
            move |stream| {
                if let Err(e) = handle_connection(&handler_ctx, stream) {
                    // Los semáforos compartidos quedaron inutilizables
                    tracing::error!(error = %e, "fatal synchronization failure");
                    std::process::abort();
                }
            },
        )?;

        Ok(Self { queue, ctx, pool })
    }

    /// Bucle principal: bloquea en `dequeue` hasta la marca de apagado
    pub fn run(self) -> Result<DispatcherReport, SyncError> {
        let mut report = DispatcherReport::default();
        tracing::info!(
            worker = self.ctx.id,
            pid = std::process::id(),
            threads = self.pool.size(),
            "dispatcher started"
        );

        loop {
            match self.queue.dequeue()? {
                Dequeued::Handle(stream) => match self.pool.submit(stream) {
                    Ok(()) => report.dispatched += 1,
                    Err(rejected) => {
                        tracing::warn!(worker = self.ctx.id, error = ?rejected, "pool refused connection");
                        report.refused += 1;
                        self.refuse(rejected.into_inner())?;
                    }
                },
                Dequeued::Shutdown => break,
                Dequeued::Lost(e) => {
                    tracing::warn!(worker = self.ctx.id, error = %e, "queued connection lost");
                    report.lost += 1;
                }
            }
        }

        // Apagar el pool: lo que quede sin arrancar se cierra aquí
        let leftovers = self.pool.shutdown();
        report.released = leftovers.len() as u64;
        drop(leftovers);

        let cache = self.ctx.cache.stats();
        tracing::info!(
            worker = self.ctx.id,
            dispatched = report.dispatched,
            refused = report.refused,
            lost = report.lost,
            released = report.released,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            cache_evictions = cache.evictions,
            cache_bytes = cache.bytes,
            cache_entries = cache.entries,
            "dispatcher stopped"
        );
        Ok(report)
    }

    /// Responde 500 a una conexión que el pool no pudo aceptar
    fn refuse(&self, mut stream: TcpStream) -> Result<(), SyncError> {
        let start = Instant::now();
        let response = Response::error(StatusCode::InternalServerError);
        if let Err(e) = stream.write_all(&response.to_bytes()) {
            tracing::debug!(error = %e, "error response not delivered");
        }
        drop(stream);
        self.ctx.stats.record_response(
            response.status().as_u16(),
            response.body_len() as u64,
            start.elapsed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ipc::{Admission, InProcessTransport};
    use crate::stats::SharedStats;
    use std::io::Read;
    use std::net::{Shutdown, TcpListener};
    use std::thread;
    use tempfile::TempDir;

    fn context(dir: &TempDir, threads: usize) -> Arc<WorkerContext> {
        std::fs::write(dir.path().join("hello.txt"), "hello").unwrap();
        let config = Arc::new(Config {
            document_root: dir.path().to_path_buf(),
            log_file: dir.path().join("access.log"),
            threads_per_worker: threads,
            timeout_seconds: 5,
            ..Config::default()
        });
        Arc::new(WorkerContext::new(0, config, Arc::new(SharedStats::new().unwrap())).unwrap())
    }

    #[test]
    fn test_shutdown_marker_stops_dispatcher() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(ConnectionQueue::new(4, InProcessTransport).unwrap());
        let dispatcher = Dispatcher::new(Arc::clone(&queue), context(&dir, 2)).unwrap();

        queue.enqueue_shutdown().unwrap();
        let report = dispatcher.run().unwrap();
        assert_eq!(report, DispatcherReport::default());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_dispatches_queued_connections() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 2);
        let queue = Arc::new(ConnectionQueue::new(8, InProcessTransport).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // 1. Tres clientes, sus conexiones van a la cola
        let clients: Vec<_> = (0..3)
            .map(|_| {
                thread::spawn(move || {
                    let mut stream = TcpStream::connect(addr).unwrap();
                    stream.write_all(b"GET /hello.txt HTTP/1.1\r\n\r\n").unwrap();
                    stream.shutdown(Shutdown::Write).unwrap();
                    let mut response = String::new();
                    stream.read_to_string(&mut response).unwrap();
                    response
                })
            })
            .collect();
        for _ in 0..3 {
            let (stream, _) = listener.accept().unwrap();
            assert!(matches!(queue.try_enqueue(stream).unwrap(), Admission::Queued));
        }
        queue.enqueue_shutdown().unwrap();

        // 2. El dispatcher las entrega y se apaga con la marca
        let report = Dispatcher::new(Arc::clone(&queue), Arc::clone(&ctx))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(report.dispatched, 3);

        for client in clients {
            let response = client.join().unwrap();
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(response.ends_with("hello"));
        }
        assert_eq!(ctx.stats.snapshot().unwrap().count(200), 3);
    }
}
