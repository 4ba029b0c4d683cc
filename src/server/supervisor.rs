//! # Supervisor
//! src/server/supervisor.rs
//!
//! Arma el servidor completo y maneja su ciclo de vida.
//!
//! ## Modo procesos
//!
//! ```text
//!                 ┌──────────── master ────────────┐
//!  clientes ────► │ Acceptor ──► ConnectionQueue   │  (mmap MAP_SHARED)
//!                 └──────────────────┬─────────────┘
//!                        fork() ×N   │ SCM_RIGHTS
//!              ┌─────────────────────┼─────────────────────┐
//!              ▼                     ▼                     ▼
//!         worker 0              worker 1              worker N-1
//!   Dispatcher + ThreadPool + FileCache (privado por proceso)
//! ```
//!
//! Los workers se crean antes de lanzar cualquier thread en el master.
//!
//! ## Modo threads
//!
//! Misma cola y mismos semáforos, pero cada dispatcher es un thread del
//! master y los descriptores viajan por `InProcessTransport`.
//!
//! ## Apagado
//!
//! 1. La bandera de apagado (o SIGINT/SIGTERM) detiene al Acceptor
//! 2. Se encola una marca de apagado por dispatcher
//! 3. Cada dispatcher apaga su pool y termina
//! 4. El master espera a todos y registra las estadísticas finales

use super::acceptor::Acceptor;
use super::context::WorkerContext;
use super::dispatcher::Dispatcher;
use super::signals;
use crate::config::{Config, RunMode};
use crate::error::{Result, ServerError};
use crate::ipc::{ConnectionQueue, HandleTransport, InProcessTransport, ScmRightsTransport};
use crate::stats::{SharedStats, StatsSnapshot};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Servidor de archivos estáticos listo para correr
pub struct Server {
    config: Arc<Config>,
    listener: TcpListener,
    stats: Arc<SharedStats>,
    shutdown: Arc<AtomicBool>,
    handle_signals: bool,
}

impl Server {
    /// Abre el socket de escucha y la región de estadísticas
    pub fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(config.address())?;
        let stats = Arc::new(SharedStats::new()?);

        tracing::info!(address = %listener.local_addr()?, "listening");

        Ok(Self {
            config: Arc::new(config),
            listener,
            stats,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle_signals: false,
        })
    }

    /// Apagar también con SIGINT/SIGTERM (solo el binario lo pide)
    pub fn with_signal_handlers(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Bandera que detiene el servidor al ponerse en `true`
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn stats(&self) -> Arc<SharedStats> {
        Arc::clone(&self.stats)
    }

    /// Corre hasta el apagado y devuelve las estadísticas finales
    pub fn run(self) -> Result<StatsSnapshot> {
        if self.handle_signals {
            signals::install_master_handlers().map_err(ServerError::Signal)?;
        }

        let stats = Arc::clone(&self.stats);
        match self.config.mode {
            RunMode::Threads => self.run_threads()?,
            RunMode::Processes => self.run_processes()?,
        }

        let snapshot = stats.snapshot()?;
        tracing::info!(stats = %snapshot.to_json(), "final statistics");
        Ok(snapshot)
    }

    fn run_threads(self) -> Result<()> {
        let queue = Arc::new(ConnectionQueue::new(
            self.config.queue_capacity,
            InProcessTransport,
        )?);

        // 1. Un thread dispatcher por worker
        let mut dispatchers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let ctx = WorkerContext::new(id, Arc::clone(&self.config), Arc::clone(&self.stats))?;
            let dispatcher = Dispatcher::new(Arc::clone(&queue), Arc::new(ctx))?;
            let handle = thread::Builder::new()
                .name(format!("dispatcher-{}", id))
                .spawn(move || dispatcher.run())?;
            dispatchers.push(handle);
        }

        // 2. Aceptar hasta el apagado
        let reporter = StatsReporter::spawn(&self.config, Arc::clone(&self.stats))?;
        let accepted = self.accept(Arc::clone(&queue));

        // 3. Una marca por dispatcher y esperar
        for _ in 0..dispatchers.len() {
            queue.enqueue_shutdown()?;
        }
        for handle in dispatchers {
            match handle.join() {
                Ok(result) => {
                    result?;
                }
                Err(_) => tracing::error!("dispatcher thread panicked"),
            }
        }

        reporter.stop();
        accepted
    }

    fn run_processes(self) -> Result<()> {
        let queue = Arc::new(ConnectionQueue::new(
            self.config.queue_capacity,
            ScmRightsTransport::new()?,
        )?);
        let master = nix::unistd::getpid();
        let mut listener = Some(self.listener);

        // 1. fork() de los workers, antes de cualquier thread
        let mut children = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    // El worker nunca acepta conexiones
                    drop(listener.take());
                    let code = worker_main(
                        id,
                        Arc::clone(&self.config),
                        Arc::clone(&self.stats),
                        Arc::clone(&queue),
                        master,
                    );
                    std::process::exit(code);
                }
                Ok(ForkResult::Parent { child }) => {
                    tracing::info!(worker = id, pid = child.as_raw(), "worker started");
                    children.push(child);
                }
                Err(source) => {
                    tracing::error!(worker = id, error = %source, "fork failed");
                    stop_workers(&queue, &children)?;
                    return Err(ServerError::Fork { index: id, source });
                }
            }
        }

        // 2. Aceptar hasta el apagado
        let reporter = StatsReporter::spawn(&self.config, Arc::clone(&self.stats))?;
        let accepted = match listener.take() {
            Some(listener) => Self::accept_on(
                listener,
                Arc::clone(&queue),
                Arc::clone(&self.stats),
                Arc::clone(&self.shutdown),
                self.handle_signals,
            ),
            None => Ok(()),
        };

        // 3. Detener y esperar a los workers
        stop_workers(&queue, &children)?;
        reporter.stop();
        accepted
    }

    fn accept<T: HandleTransport<Handle = TcpStream>>(self, queue: Arc<ConnectionQueue<T>>) -> Result<()> {
        Self::accept_on(self.listener, queue, self.stats, self.shutdown, self.handle_signals)
    }

    /// Corre el Acceptor; el listener se cierra al retornar
    fn accept_on<T: HandleTransport<Handle = TcpStream>>(
        listener: TcpListener,
        queue: Arc<ConnectionQueue<T>>,
        stats: Arc<SharedStats>,
        shutdown: Arc<AtomicBool>,
        handle_signals: bool,
    ) -> Result<()> {
        let acceptor = Acceptor::new(listener, queue, stats, shutdown)?;
        let acceptor = if handle_signals {
            acceptor.watch_signals()
        } else {
            acceptor
        };
        acceptor.run()?;
        Ok(())
    }
}

/// Cuerpo de un proceso worker. Retorna el exit code.
fn worker_main<T: HandleTransport<Handle = TcpStream>>(
    id: usize,
    config: Arc<Config>,
    stats: Arc<SharedStats>,
    queue: Arc<ConnectionQueue<T>>,
    master: Pid,
) -> i32 {
    if let Err(e) = signals::prepare_worker(master) {
        tracing::error!(worker = id, error = %e, "worker setup failed");
        return 1;
    }

    let ctx = match WorkerContext::new(id, config, stats) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::error!(worker = id, error = %e, "cannot build worker context");
            return 1;
        }
    };

    let dispatcher = match Dispatcher::new(queue, ctx) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            tracing::error!(worker = id, error = %e, "cannot start thread pool");
            return 1;
        }
    };

    match dispatcher.run() {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(worker = id, error = %e, "dispatcher failed");
            1
        }
    }
}

/// Manda una marca de apagado a cada worker vivo y espera a todos
fn stop_workers<T: HandleTransport>(queue: &ConnectionQueue<T>, children: &[Pid]) -> Result<()> {
    let mut exited = Vec::new();
    for &child in children {
        match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => queue.enqueue_shutdown()?,
            Ok(status) => {
                tracing::warn!(pid = child.as_raw(), ?status, "worker exited early");
                exited.push(child);
            }
            Err(e) => tracing::warn!(pid = child.as_raw(), error = %e, "cannot query worker"),
        }
    }

    for &child in children.iter().filter(|c| !exited.contains(c)) {
        loop {
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    tracing::info!(pid = pid.as_raw(), code, "worker exited");
                    break;
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    tracing::warn!(pid = pid.as_raw(), ?signal, "worker killed by signal");
                    break;
                }
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    tracing::warn!(pid = child.as_raw(), error = %e, "waitpid failed");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Thread del master que registra las estadísticas cada `stats_interval_secs`
struct StatsReporter {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatsReporter {
    fn spawn(config: &Config, stats: Arc<SharedStats>) -> io::Result<Self> {
        if config.stats_interval_secs == 0 {
            return Ok(Self {
                stop: None,
                handle: None,
            });
        }

        let interval = Duration::from_secs(config.stats_interval_secs);
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("stats-reporter".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match stats.snapshot() {
                        Ok(snapshot) => tracing::info!(stats = %snapshot.to_json(), "statistics"),
                        Err(e) => tracing::error!(error = %e, "cannot read statistics"),
                    },
                    _ => break,
                }
            })?;

        Ok(Self {
            stop: Some(tx),
            handle: Some(handle),
        })
    }

    fn stop(mut self) {
        // Cerrar el canal despierta al thread
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
