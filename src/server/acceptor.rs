//! # Acceptor
//! src/server/acceptor.rs
//!
//! Dueño del socket de escucha. Acepta conexiones y las admite en la cola
//! compartida sin bloquear nunca: si la cola está llena responde 503 en
//! el acto y cierra la conexión.
//!
//! ```text
//! accept() ──► try_enqueue ──┬── Queued ──► (un worker la atiende)
//!                            └── Full    ──► 503 + close
//!
//! Un socket que no se puede configurar o entregar también recibe el 503.
//! ```

use crate::error::SyncError;
use crate::http::Response;
use crate::ipc::{Admission, ConnectionQueue, HandleTransport};
use crate::server::signals;
use crate::stats::SharedStats;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cada cuánto se revisa la bandera de apagado mientras no hay conexiones
const POLL_INTERVAL_MS: libc::c_int = 100;

/// Timeout para escribir el 503 (el cliente puede no estar leyendo)
const OVERLOAD_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Conexiones admitidas y rechazadas durante `run`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcceptorReport {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct Acceptor<T: HandleTransport<Handle = TcpStream>> {
    listener: TcpListener,
    queue: Arc<ConnectionQueue<T>>,
    stats: Arc<SharedStats>,
    shutdown: Arc<AtomicBool>,
    watch_signals: bool,
}

impl<T: HandleTransport<Handle = TcpStream>> Acceptor<T> {
    pub fn new(
        listener: TcpListener,
        queue: Arc<ConnectionQueue<T>>,
        stats: Arc<SharedStats>,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            queue,
            stats,
            shutdown,
            watch_signals: false,
        })
    }

    /// También se detiene con SIGINT/SIGTERM
    pub fn watch_signals(mut self) -> Self {
        self.watch_signals = true;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn should_stop(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) || (self.watch_signals && signals::shutdown_requested())
    }

    /// Acepta conexiones hasta que se pida el apagado.
    ///
    /// Solo un fallo de los semáforos de la cola termina con `Err`.
    pub fn run(&self) -> Result<AcceptorReport, SyncError> {
        let mut report = AcceptorReport::default();

        while !self.should_stop() {
            // 1. Esperar una conexión (o el timeout para revisar la bandera)
            match wait_readable(&self.listener, POLL_INTERVAL_MS) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "poll on listener failed");
                    std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS as u64));
                    continue;
                }
            }

            // 2. Aceptar todo lo pendiente
            loop {
                match self.listener.accept() {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut report)?,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EMFILE, ECONNABORTED...: se reintenta en la próxima vuelta
                        tracing::warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        }

        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected,
            "acceptor stopped"
        );
        Ok(report)
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, report: &mut AcceptorReport) -> Result<(), SyncError> {
        let configured = stream.set_nonblocking(false);
        self.admit_configured(stream, configured, peer, report)
    }

    /// Toda conexión aceptada termina en la cola o con un 503
    fn admit_configured(
        &self,
        stream: TcpStream,
        configured: io::Result<()>,
        peer: SocketAddr,
        report: &mut AcceptorReport,
    ) -> Result<(), SyncError> {
        if let Err(e) = configured {
            report.rejected += 1;
            tracing::warn!(%peer, error = %e, "cannot configure accepted socket, rejecting");
            return self.reject(stream);
        }

        match self.queue.try_enqueue(stream)? {
            Admission::Queued => {
                report.accepted += 1;
                tracing::trace!(%peer, "connection queued");
                Ok(())
            }
            Admission::Full(stream) => {
                report.rejected += 1;
                tracing::debug!(%peer, "queue full, rejecting");
                self.reject(stream)
            }
            Admission::Failed(stream, e) => {
                report.rejected += 1;
                tracing::warn!(%peer, error = %e, "cannot hand connection to workers");
                self.reject(stream)
            }
        }
    }

    /// Escribe el 503 y cierra
    fn reject(&self, mut stream: TcpStream) -> Result<(), SyncError> {
        let start = Instant::now();
        let response = Response::overload();

        let written = stream
            .set_write_timeout(Some(OVERLOAD_WRITE_TIMEOUT))
            .and_then(|_| stream.write_all(&response.to_bytes()));
        if let Err(e) = written {
            tracing::debug!(error = %e, "overload response not delivered");
        }
        drop(stream);

        self.stats.record_response(
            response.status().as_u16(),
            response.body_len() as u64,
            start.elapsed(),
        )
    }
}

/// `poll()` sobre el listener. `Ok(false)` si venció el timeout.
fn wait_readable(listener: &TcpListener, timeout_ms: libc::c_int) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: listener.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0)
}
