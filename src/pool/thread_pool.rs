//! # Thread Pool por Worker
//! src/pool/thread_pool.rs
//!
//! Pool de tamaño fijo que consume una [`WorkQueue`] local. Cada thread
//! pasa por estos estados:
//!
//! ```text
//! IDLE ──(item disponible)──► RUNNING ──(handler termina)──► IDLE
//!   │
//!   └──(shutdown && cola vacía)──► TERMINATED
//! ```
//!
//! El handler siempre se ejecuta fuera del mutex del pool.

use super::work_queue::WorkQueue;
use parking_lot::{Condvar, Mutex};
use std::collections::TryReserveError;
use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Función que procesa un item
type Handler<T> = dyn Fn(T) + Send + Sync;

struct PoolState<T> {
    queue: WorkQueue<T>,
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    handler: Box<Handler<T>>,
}

/// Motivo por el que `submit` no aceptó un item.
///
/// El item vuelve dentro del error: el llamador debe liberarlo.
pub enum Rejected<T> {
    /// El pool ya está apagándose
    ShuttingDown(T),
    /// No hubo memoria para el nodo de la cola
    OutOfMemory(T, TryReserveError),
}

impl<T> Rejected<T> {
    pub fn into_inner(self) -> T {
        match self {
            Rejected::ShuttingDown(item) | Rejected::OutOfMemory(item, _) => item,
        }
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::ShuttingDown(_) => write!(f, "pool is shutting down"),
            Rejected::OutOfMemory(_, e) => write!(f, "cannot allocate work item: {}", e),
        }
    }
}

/// Pool de threads con cola FIFO local
pub struct ThreadPool<T: Send + 'static> {
    name: String,
    size: usize,
    shared: Arc<Shared<T>>,
    threads: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Crea el pool y arranca `size` threads.
    pub fn new<F>(name: &str, size: usize, handler: F) -> io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut pool = Self::unstarted(name, size, handler);
        pool.start()?;
        Ok(pool)
    }

    /// Crea el pool sin arrancar threads. Los items se acumulan en la
    /// cola hasta `start()`.
    pub fn unstarted<F>(name: &str, size: usize, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            size,
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: WorkQueue::new(),
                    shutdown: false,
                }),
                available: Condvar::new(),
                handler: Box::new(handler),
            }),
            threads: Vec::with_capacity(size),
        }
    }

    /// Arranca los threads que falten
    pub fn start(&mut self) -> io::Result<()> {
        while self.threads.len() < self.size {
            let index = self.threads.len();
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || worker_loop(&shared))?;
            self.threads.push(handle);
        }
        tracing::debug!(pool = %self.name, threads = self.size, "thread pool started");
        Ok(())
    }

    /// Encola un item y despierta a un thread.
    pub fn submit(&self, item: T) -> Result<(), Rejected<T>> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(Rejected::ShuttingDown(item));
        }
        state
            .queue
            .push(item)
            .map_err(|(item, e)| Rejected::OutOfMemory(item, e))?;
        self.shared.available.notify_one();
        Ok(())
    }

    /// Items esperando en la cola
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Apaga el pool.
    ///
    /// Los threads vivos terminan de vaciar la cola antes de salir. Lo
    /// que quede sin empezar (por ejemplo, si nunca hubo threads) se
    /// devuelve para que el llamador lo libere sin procesarlo.
    pub fn shutdown(mut self) -> Vec<T> {
        self.stop()
    }

    fn stop(&mut self) -> Vec<T> {
        // 1. Marcar shutdown y despertar a todos
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.available.notify_all();
        }

        // 2. Esperar a cada thread
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!(pool = %self.name, "pool thread panicked");
            }
        }

        // 3. Lo que quedó nunca se va a procesar
        let leftover = self.shared.state.lock().queue.drain();
        if !leftover.is_empty() {
            tracing::warn!(
                pool = %self.name,
                released = leftover.len(),
                "releasing unstarted work items"
            );
        }
        leftover
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        // Los items sobrantes se sueltan aquí (cerrando sus recursos)
        let _ = self.stop();
    }
}

fn worker_loop<T>(shared: &Shared<T>) {
    loop {
        // IDLE: esperar trabajo o shutdown
        let item = {
            let mut state = shared.state.lock();
            loop {
                if let Some(item) = state.queue.pop() {
                    break item;
                }
                if state.shutdown {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };

        // RUNNING: sin el mutex tomado
        if catch_unwind(AssertUnwindSafe(|| (shared.handler)(item))).is_err() {
            tracing::error!("work item handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_handles_every_item() {
        let handled = Arc::new(AtomicUsize::new(0));
        let pool = {
            let handled = Arc::clone(&handled);
            ThreadPool::new("test", 4, move |_: u32| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };

        for i in 0..100 {
            pool.submit(i).unwrap();
        }

        let released = pool.shutdown();
        assert!(released.is_empty());
        assert_eq!(handled.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_shutdown_before_start_releases_everything() {
        let handled = Arc::new(AtomicUsize::new(0));
        let pool = {
            let handled = Arc::clone(&handled);
            ThreadPool::unstarted("idle", 4, move |_: u32| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
        };

        for i in 0..10 {
            pool.submit(i).unwrap();
        }
        assert_eq!(pool.queued(), 10);

        let released = pool.shutdown();
        assert_eq!(released, (0..10).collect::<Vec<_>>());
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fifo_with_single_thread() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pool = {
            let order = Arc::clone(&order);
            ThreadPool::unstarted("fifo", 1, move |i: u32| order.lock().push(i))
        };

        for i in 0..20 {
            pool.submit(i).unwrap();
        }
        pool.start().unwrap();
        assert!(pool.shutdown().is_empty());

        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_handlers_run_outside_the_lock() {
        // Si el handler corriera con el mutex tomado, nunca llegarían
        // los cuatro a la barrera.
        let barrier = Arc::new(Barrier::new(4));
        let pool = {
            let barrier = Arc::clone(&barrier);
            ThreadPool::new("barrier", 4, move |_: u32| {
                barrier.wait();
            })
            .unwrap()
        };

        for i in 0..4 {
            pool.submit(i).unwrap();
        }
        assert!(pool.shutdown().is_empty());
    }

    #[test]
    fn test_panicking_handler_keeps_thread_alive() {
        let handled = Arc::new(AtomicUsize::new(0));
        let pool = {
            let handled = Arc::clone(&handled);
            ThreadPool::new("panic", 1, move |i: u32| {
                if i == 0 {
                    panic!("boom");
                }
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };

        pool.submit(0).unwrap();
        pool.submit(1).unwrap();
        pool.submit(2).unwrap();
        assert!(pool.shutdown().is_empty());
        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_idle_threads_wake_on_submit() {
        let handled = Arc::new(AtomicUsize::new(0));
        let pool = {
            let handled = Arc::clone(&handled);
            ThreadPool::new("wake", 2, move |_: u32| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };

        thread::sleep(Duration::from_millis(20));
        pool.submit(1).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handled.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        drop(pool);
    }

    #[test]
    fn test_rejected_returns_item() {
        let rejected: Rejected<u32> = Rejected::ShuttingDown(7);
        assert_eq!(format!("{:?}", rejected), "pool is shutting down");
        assert_eq!(rejected.into_inner(), 7);
    }
}
