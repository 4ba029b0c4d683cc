//! # Memoria Compartida entre Procesos
//! src/ipc/shared_memory.rs
//!
//! Región anónima `MAP_SHARED` creada antes del `fork()`. Los hijos heredan
//! el mismo mapeo físico, así que lo que un proceso escribe aquí lo ven
//! todos los demás. El kernel entrega la región llena de ceros.

use crate::error::SyncError;
use std::io;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Región de memoria compartida que contiene un `T` al inicio, seguido
/// opcionalmente de datos extra (ej: los slots de la cola circular).
pub struct SharedRegion<T> {
    base: NonNull<u8>,
    len: usize,
    _marker: PhantomData<T>,
}

// El contenido solo se modifica a través de semáforos compartidos
unsafe impl<T: Sync> Send for SharedRegion<T> {}
unsafe impl<T: Sync> Sync for SharedRegion<T> {}

impl<T> SharedRegion<T> {
    /// Mapea una región de al menos `size_of::<T>()` bytes.
    ///
    /// `extra` bytes se agregan al final para datos de tamaño variable.
    pub fn zeroed(extra: usize) -> Result<Self, SyncError> {
        let len = std::mem::size_of::<T>()
            .checked_add(extra)
            .ok_or(SyncError::Map {
                size: usize::MAX,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            })?
            .max(1);

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(SyncError::Map {
                size: len,
                source: io::Error::last_os_error(),
            });
        }

        // mmap nunca devuelve null con MAP_FAILED descartado
        let base = NonNull::new(base as *mut u8).ok_or(SyncError::Map {
            size: len,
            source: io::Error::from(io::ErrorKind::Other),
        })?;

        Ok(Self {
            base,
            len,
            _marker: PhantomData,
        })
    }

    /// Puntero al `T` del inicio de la región (alineado a página)
    pub fn as_ptr(&self) -> *mut T {
        self.base.as_ptr() as *mut T
    }

    /// Puntero a `offset` bytes desde el inicio
    ///
    /// # Safety
    /// `offset` debe quedar dentro de la región.
    pub unsafe fn byte_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.len);
        self.base.as_ptr().add(offset)
    }

    /// Tamaño total mapeado en bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Drop for SharedRegion<T> {
    fn drop(&mut self) {
        // Cada proceso desmapea su propia vista; las demás siguen vivas
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[repr(C)]
    struct Counter {
        value: AtomicU64,
    }

    #[test]
    fn test_region_is_zeroed() {
        let region: SharedRegion<Counter> = SharedRegion::zeroed(64).unwrap();
        let counter = unsafe { &*region.as_ptr() };
        assert_eq!(counter.value.load(Ordering::SeqCst), 0);
        assert!(region.len() >= std::mem::size_of::<Counter>() + 64);

        let tail = unsafe { std::slice::from_raw_parts(region.byte_at(8), 64) };
        assert!(tail.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_region_shared_between_threads() {
        let region: SharedRegion<Counter> = SharedRegion::zeroed(0).unwrap();
        let region = std::sync::Arc::new(region);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let region = std::sync::Arc::clone(&region);
                std::thread::spawn(move || {
                    let counter = unsafe { &*region.as_ptr() };
                    for _ in 0..1000 {
                        counter.value.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let counter = unsafe { &*region.as_ptr() };
        assert_eq!(counter.value.load(Ordering::SeqCst), 4000);
    }
}
