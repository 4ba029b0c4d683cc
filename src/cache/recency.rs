//! # Lista de Recencia
//! src/cache/recency.rs
//!
//! Lista doblemente enlazada sobre un arena de slots indexados. Ordena
//! las entradas del caché de más reciente (`head`) a menos reciente
//! (`tail`):
//!
//! ```text
//! head ──► [A] ◄──► [B] ◄──► [C] ◄── tail
//!          MRU                LRU
//! ```
//!
//! Los índices de slots liberados se reciclan, así que un índice solo es
//! válido mientras su entrada siga en la lista.

use std::collections::TryReserveError;

/// Entrada del caché: ruta + copia propia de los bytes
pub struct Entry {
    pub path: String,
    pub data: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Entry {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

pub struct RecencyList {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl RecencyList {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.slots.get_mut(index).and_then(|slot| slot.as_mut())
    }

    /// Reserva espacio para un slot nuevo sin insertar nada
    pub fn reserve_slot(&mut self) -> Result<(), TryReserveError> {
        if self.free.is_empty() {
            self.slots.try_reserve(1)?;
        }
        Ok(())
    }

    /// Inserta al frente (MRU). Llamar `reserve_slot` antes para no
    /// reubicar el arena sin control de memoria.
    pub fn push_front(&mut self, path: String, data: Vec<u8>) -> usize {
        let entry = Entry {
            path,
            data,
            prev: None,
            next: self.head,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(entry);
                index
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.link_mut(old_head).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;
        index
    }

    /// Mueve la entrada al frente. No-op si ya es `head`.
    pub fn move_to_front(&mut self, index: usize) {
        if self.head == Some(index) || self.get(index).is_none() {
            return;
        }
        self.unlink(index);

        let old_head = self.head;
        {
            let entry = self.link_mut(index);
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(h) => self.link_mut(h).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    /// Quita la entrada de la lista y libera su slot
    pub fn remove(&mut self, index: usize) -> Option<Entry> {
        self.get(index)?;
        self.unlink(index);
        self.len -= 1;
        self.free.push(index);
        self.slots[index].take()
    }

    /// Quita la entrada menos reciente
    pub fn pop_back(&mut self) -> Option<Entry> {
        let tail = self.tail?;
        self.remove(tail)
    }

    /// Desconecta `index` de sus vecinos (sin liberar el slot)
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let entry = self.link_mut(index);
            (entry.prev.take(), entry.next.take())
        };

        match prev {
            Some(p) => self.link_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.link_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_mut(&mut self, index: usize) -> &mut Entry {
        match self.slots[index].as_mut() {
            Some(entry) => entry,
            None => unreachable!("linked slot {} is empty", index),
        }
    }

    /// Índices de head a tail
    pub fn iter_indices(&self) -> RecencyIter<'_> {
        RecencyIter {
            list: self,
            cursor: self.head,
        }
    }

    /// Verifica que la lista sea acíclica y consistente en ambos sentidos
    pub fn check_links(&self) -> Result<(), String> {
        if self.head.is_some() != self.tail.is_some() {
            return Err("head and tail disagree on emptiness".to_string());
        }

        // Hacia adelante
        let mut forward = Vec::new();
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            if forward.len() > self.len {
                return Err("cycle following next".to_string());
            }
            let entry = self.get(index).ok_or(format!("dangling index {}", index))?;
            if entry.prev != prev {
                return Err(format!("entry {} has a wrong prev link", index));
            }
            forward.push(index);
            prev = Some(index);
            cursor = entry.next;
        }
        if prev != self.tail {
            return Err("walking next does not end at tail".to_string());
        }

        // Hacia atrás
        let mut backward = Vec::new();
        let mut cursor = self.tail;
        while let Some(index) = cursor {
            if backward.len() > self.len {
                return Err("cycle following prev".to_string());
            }
            backward.push(index);
            cursor = self.get(index).and_then(|e| e.prev);
        }
        backward.reverse();

        if forward != backward {
            return Err("forward and backward walks differ".to_string());
        }
        if forward.len() != self.len {
            return Err(format!("len is {} but {} entries are linked", self.len, forward.len()));
        }
        Ok(())
    }
}

impl Default for RecencyList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RecencyIter<'a> {
    list: &'a RecencyList,
    cursor: Option<usize>,
}

impl Iterator for RecencyIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.cursor?;
        self.cursor = self.list.get(index).and_then(|e| e.next);
        Some(index)
    }
}
