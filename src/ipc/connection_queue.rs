//! # Cola de Conexiones Compartida
//! src/ipc/connection_queue.rs
//!
//! Buffer circular de capacidad fija en memoria compartida entre el master
//! (productor) y los workers (consumidores). Es el clásico productor /
//! consumidor con tres semáforos:
//!
//! ```text
//!            empty_slots (contador, inicia en N)
//!   Acceptor ───────────────────────────────┐
//!     try_wait(empty) ─► lock(mutex) ─► slots[rear] = h ─► unlock ─► post(filled)
//!
//!            filled_slots (contador, inicia en 0)
//!   Worker  ────────────────────────────────┐
//!     wait(filled) ─► lock(mutex) ─► h = slots[front] ─► unlock ─► post(empty)
//! ```
//!
//! - `try_enqueue` nunca bloquea: si no hay slot libre devuelve el handle
//!   al llamador para que responda 503 (back-pressure, no es un error).
//! - `dequeue` bloquea al dispatcher hasta que haya un slot lleno.
//! - `front`, `rear` y `count` solo se tocan con `queue_mutex` tomado.

use super::semaphore::{Semaphore, SemaphoreRole};
use super::shared_memory::SharedRegion;
use super::transport::HandleTransport;
use crate::error::SyncError;
use std::cell::UnsafeCell;
use std::io;
use std::mem::{align_of, size_of};
use std::ptr::addr_of_mut;

/// Capacidad máxima configurable de la cola
pub const MAX_QUEUE_CAPACITY: usize = 4096;

const SLOT_CONNECTION: u32 = 1;
const SLOT_SHUTDOWN: u32 = 2;

/// Un slot del buffer circular. `kind` es un entero plano porque la
/// memoria compartida arranca en ceros.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: u32,
    token: u64,
}

#[repr(C)]
struct RingCursor {
    front: usize,
    rear: usize,
    count: usize,
}

#[repr(C)]
struct QueueHeader {
    empty_slots: Semaphore,
    filled_slots: Semaphore,
    queue_mutex: Semaphore,
    capacity: usize,
    ring: UnsafeCell<RingCursor>,
}

// `ring` solo se accede con `queue_mutex` tomado
unsafe impl Sync for QueueHeader {}

/// Resultado de un intento de encolar
#[derive(Debug)]
pub enum Admission<H> {
    /// El handle quedó en la cola
    Queued,
    /// Cola llena: el handle vuelve intacto al llamador
    Full(H),
    /// El transporte no pudo mover el handle; vuelve al llamador
    Failed(H, io::Error),
}

/// Resultado de desencolar
#[derive(Debug)]
pub enum Dequeued<H> {
    Handle(H),
    /// Marca de apagado: el dispatcher debe terminar
    Shutdown,
    /// Había un slot pero el handle no se pudo recuperar
    Lost(io::Error),
}

/// Cola circular acotada compartida entre procesos
pub struct ConnectionQueue<T: HandleTransport> {
    region: SharedRegion<QueueHeader>,
    slots_offset: usize,
    transport: T,
    owner: libc::pid_t,
}

impl<T: HandleTransport> ConnectionQueue<T> {
    /// Crea la cola con `capacity` slots.
    ///
    /// Debe llamarse antes del `fork()` para que los workers la hereden.
    pub fn new(capacity: usize, transport: T) -> Result<Self, SyncError> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(SyncError::Capacity {
                requested: capacity,
                max: MAX_QUEUE_CAPACITY,
            });
        }

        let header_size = size_of::<QueueHeader>();
        let slots_offset = header_size.div_ceil(align_of::<Slot>()) * align_of::<Slot>();
        let extra = slots_offset - header_size + capacity * size_of::<Slot>();

        let region: SharedRegion<QueueHeader> = SharedRegion::zeroed(extra)?;
        let header = region.as_ptr();

        unsafe {
            Semaphore::init(addr_of_mut!((*header).empty_slots), SemaphoreRole::EmptySlots, capacity as u32)?;
            Semaphore::init(addr_of_mut!((*header).filled_slots), SemaphoreRole::FilledSlots, 0)?;
            Semaphore::init(addr_of_mut!((*header).queue_mutex), SemaphoreRole::QueueMutex, 1)?;
            addr_of_mut!((*header).capacity).write(capacity);
        }

        Ok(Self {
            region,
            slots_offset,
            transport,
            owner: std::process::id() as libc::pid_t,
        })
    }

    fn header(&self) -> &QueueHeader {
        unsafe { &*self.region.as_ptr() }
    }

    fn slot_ptr(&self, index: usize) -> *mut Slot {
        debug_assert!(index < self.capacity());
        unsafe { self.region.byte_at(self.slots_offset + index * size_of::<Slot>()) as *mut Slot }
    }

    /// Escribe en `rear`. Requiere `queue_mutex` tomado y un slot reservado.
    unsafe fn push_locked(&self, slot: Slot) {
        let header = self.header();
        let ring = &mut *header.ring.get();
        debug_assert!(ring.count < header.capacity);

        self.slot_ptr(ring.rear).write(slot);
        ring.rear = (ring.rear + 1) % header.capacity;
        ring.count += 1;
    }

    /// Lee de `front`. Requiere `queue_mutex` tomado y un slot lleno consumido.
    unsafe fn pop_locked(&self) -> Slot {
        let header = self.header();
        let ring = &mut *header.ring.get();
        debug_assert!(ring.count > 0);

        let slot = self.slot_ptr(ring.front).read();
        ring.front = (ring.front + 1) % header.capacity;
        ring.count -= 1;
        slot
    }

    /// Intenta encolar sin bloquear.
    ///
    /// Con la cola llena retorna `Admission::Full(handle)` de inmediato; el
    /// llamador sigue siendo dueño del handle y debe responder y cerrarlo.
    pub fn try_enqueue(&self, handle: T::Handle) -> Result<Admission<T::Handle>, SyncError> {
        let header = self.header();

        // 1. Reservar un slot vacío (falla rápido)
        if !header.empty_slots.try_wait()? {
            return Ok(Admission::Full(handle));
        }

        // 2. Sección crítica: mover el handle y escribir el slot
        let guard = header.queue_mutex.lock()?;
        let token = match self.transport.stage(handle) {
            Ok(token) => token,
            Err((handle, e)) => {
                drop(guard);
                // Devolver la reserva: nada se escribió en la cola
                header.empty_slots.post()?;
                return Ok(Admission::Failed(handle, e));
            }
        };
        unsafe {
            self.push_locked(Slot {
                kind: SLOT_CONNECTION,
                token,
            })
        };
        drop(guard);

        // 3. Avisar a un consumidor
        header.filled_slots.post()?;
        Ok(Admission::Queued)
    }

    /// Encola una marca de apagado. Bloquea hasta que haya espacio.
    pub fn enqueue_shutdown(&self) -> Result<(), SyncError> {
        let header = self.header();
        header.empty_slots.wait()?;
        {
            let _guard = header.queue_mutex.lock()?;
            unsafe {
                self.push_locked(Slot {
                    kind: SLOT_SHUTDOWN,
                    token: 0,
                })
            };
        }
        header.filled_slots.post()
    }

    /// Desencola el siguiente handle (FIFO). Bloquea mientras la cola esté vacía.
    pub fn dequeue(&self) -> Result<Dequeued<T::Handle>, SyncError> {
        let header = self.header();
        header.filled_slots.wait()?;

        let result = {
            let _guard = header.queue_mutex.lock()?;
            let slot = unsafe { self.pop_locked() };
            match slot.kind {
                SLOT_CONNECTION => match self.transport.claim(slot.token) {
                    Ok(handle) => Dequeued::Handle(handle),
                    Err(e) => Dequeued::Lost(e),
                },
                SLOT_SHUTDOWN => Dequeued::Shutdown,
                other => Dequeued::Lost(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("corrupt queue slot kind {}", other),
                )),
            }
        };

        header.empty_slots.post()?;
        Ok(result)
    }

    /// Número de slots ocupados (leído bajo el mutex)
    pub fn len(&self) -> Result<usize, SyncError> {
        let header = self.header();
        let _guard = header.queue_mutex.lock()?;
        Ok(unsafe { (*header.ring.get()).count })
    }

    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len()? == 0)
    }

    pub fn capacity(&self) -> usize {
        self.header().capacity
    }

    /// Slots libres según `empty_slots` (solo informativo)
    pub fn free_slots(&self) -> Result<usize, SyncError> {
        Ok(self.header().empty_slots.value()?.max(0) as usize)
    }
}

impl<T: HandleTransport> Drop for ConnectionQueue<T> {
    fn drop(&mut self) {
        // Solo el proceso creador destruye los semáforos, y solo después
        // de que todos los workers terminaron.
        if std::process::id() as libc::pid_t == self.owner {
            let header = self.header();
            unsafe {
                header.empty_slots.destroy();
                header.filled_slots.destroy();
                header.queue_mutex.destroy();
            }
        }
    }
}
