//! # Semáforos POSIX entre Procesos
//! src/ipc/semaphore.rs
//!
//! Semáforos `sem_t` inicializados con `pshared = 1` dentro de una
//! [`SharedRegion`](super::SharedRegion). Son el equivalente entre
//! procesos de un Mutex + Condvar:
//!
//! - **Contadores** (`empty_slots`, `filled_slots`): cuentan slots libres
//!   y ocupados de la cola compartida.
//! - **Mutex** (`queue_mutex`, `stats_mutex`, `log_mutex`): semáforos
//!   binarios que protegen una sección crítica.
//!
//! `EINTR` se reintenta siempre. Cualquier otro fallo es un [`SyncError`]
//! y el proceso que lo ve no debe seguir tocando la estructura protegida.

use crate::error::SyncError;
use std::cell::UnsafeCell;
use std::io;

/// Papel de cada semáforo dentro del servidor (usado en errores y logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SemaphoreRole {
    EmptySlots,
    FilledSlots,
    QueueMutex,
    StatsMutex,
    LogMutex,
}

impl SemaphoreRole {
    pub fn name(&self) -> &'static str {
        match self {
            SemaphoreRole::EmptySlots => "empty_slots",
            SemaphoreRole::FilledSlots => "filled_slots",
            SemaphoreRole::QueueMutex => "queue_mutex",
            SemaphoreRole::StatsMutex => "stats_mutex",
            SemaphoreRole::LogMutex => "log_mutex",
        }
    }
}

/// Semáforo contador compartido entre procesos.
///
/// Debe vivir en memoria compartida y no moverse después de `init`.
#[repr(C)]
pub struct Semaphore {
    raw: UnsafeCell<libc::sem_t>,
    role: SemaphoreRole,
}

// sem_t está diseñado para acceso concurrente
unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    /// Inicializa el semáforo en su lugar con valor `value`.
    ///
    /// # Safety
    /// `this` debe apuntar a memoria escribible que permanezca mapeada
    /// (y sin moverse) mientras algún proceso use el semáforo. Se llama
    /// una sola vez, antes de cualquier `wait`/`post`.
    pub unsafe fn init(this: *mut Semaphore, role: SemaphoreRole, value: u32) -> Result<(), SyncError> {
        std::ptr::addr_of_mut!((*this).role).write(role);
        let raw = UnsafeCell::raw_get(std::ptr::addr_of!((*this).raw));

        if libc::sem_init(raw, 1, value) != 0 {
            return Err(SyncError::Init {
                name: role.name(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn role(&self) -> SemaphoreRole {
        self.role
    }

    /// Espera (P). Bloquea hasta que el contador sea > 0.
    pub fn wait(&self) -> Result<(), SyncError> {
        loop {
            if unsafe { libc::sem_wait(self.raw.get()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(SyncError::Wait {
                name: self.role.name(),
                source: err,
            });
        }
    }

    /// Intenta decrementar sin bloquear.
    ///
    /// Retorna `Ok(false)` si el contador está en 0 ("would block").
    pub fn try_wait(&self) -> Result<bool, SyncError> {
        loop {
            if unsafe { libc::sem_trywait(self.raw.get()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => {
                    return Err(SyncError::Wait {
                        name: self.role.name(),
                        source: err,
                    })
                }
            }
        }
    }

    /// Señala (V). Incrementa el contador y despierta a un esperador.
    pub fn post(&self) -> Result<(), SyncError> {
        if unsafe { libc::sem_post(self.raw.get()) } != 0 {
            return Err(SyncError::Post {
                name: self.role.name(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Valor actual del contador (solo informativo, puede quedar obsoleto)
    pub fn value(&self) -> Result<i32, SyncError> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.raw.get(), &mut value) } != 0 {
            return Err(SyncError::Wait {
                name: self.role.name(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(value)
    }

    /// Toma el semáforo como mutex; se libera al soltar el guard.
    pub fn lock(&self) -> Result<SemaphoreGuard<'_>, SyncError> {
        self.wait()?;
        Ok(SemaphoreGuard { sem: self })
    }

    /// Destruye el semáforo.
    ///
    /// # Safety
    /// Ningún proceso puede estar esperando ni volver a usarlo.
    pub unsafe fn destroy(&self) {
        libc::sem_destroy(self.raw.get());
    }
}

/// Sección crítica protegida por un semáforo binario
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.post() {
            // Sin post el mutex queda tomado para siempre en todos los procesos
            tracing::error!(error = %e, "cannot release semaphore mutex, aborting");
            std::process::abort();
        }
    }
}
