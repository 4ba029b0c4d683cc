//! # Cola Local de Trabajo
//! src/pool/work_queue.rs
//!
//! Lista simplemente enlazada FIFO sobre un arena de nodos indexados.
//! `head` es el extremo de salida y `tail` el de entrada; los nodos
//! liberados se reciclan desde `free`.
//!
//! Invariante: `tail` es `Some` si y solo si `head` es `Some`.

use std::collections::TryReserveError;

struct Node<T> {
    item: Option<T>,
    next: Option<usize>,
}

/// Cola FIFO sin locks propios (el pool la protege con su mutex)
pub struct WorkQueue<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Agrega `item` al final.
    ///
    /// Si no hay memoria para un nodo nuevo, el item vuelve al llamador.
    pub fn push(&mut self, item: T) -> Result<(), (T, TryReserveError)> {
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Node {
                    item: Some(item),
                    next: None,
                };
                index
            }
            None => {
                if let Err(e) = self.nodes.try_reserve(1) {
                    return Err((item, e));
                }
                self.nodes.push(Node {
                    item: Some(item),
                    next: None,
                });
                self.nodes.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        Ok(())
    }

    /// Saca el item del frente
    pub fn pop(&mut self) -> Option<T> {
        let index = self.head?;
        let node = &mut self.nodes[index];
        let item = node.item.take();

        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        self.free.push(index);
        item
    }

    /// Vacía la cola en orden FIFO
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Verifica la forma de la lista; retorna una descripción del problema
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.head.is_some() != self.tail.is_some() {
            return Err("head and tail disagree on emptiness".to_string());
        }

        let mut count = 0;
        let mut last = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            count += 1;
            if count > self.nodes.len() {
                return Err("cycle in work queue".to_string());
            }
            if self.nodes[index].item.is_none() {
                return Err(format!("linked node {} has no item", index));
            }
            last = Some(index);
            cursor = self.nodes[index].next;
        }

        if last != self.tail {
            return Err("tail is not the last reachable node".to_string());
        }
        if count != self.len {
            return Err(format!("len is {} but {} nodes are linked", self.len, count));
        }
        Ok(())
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue() {
        let mut queue: WorkQueue<u32> = WorkQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
        queue.check_invariants().unwrap();
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = WorkQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        queue.check_invariants().unwrap();
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
            queue.check_invariants().unwrap();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nodes_are_reused() {
        let mut queue = WorkQueue::new();
        for round in 0..100 {
            queue.push(round).unwrap();
            queue.push(round + 1000).unwrap();
            assert_eq!(queue.pop(), Some(round));
            assert_eq!(queue.pop(), Some(round + 1000));
        }
        // Nunca hubo más de 2 nodos vivos
        assert!(queue.nodes.len() <= 2);
        queue.check_invariants().unwrap();
    }

    #[test]
    fn test_drain_keeps_order() {
        let mut queue = WorkQueue::new();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.push("c").unwrap();
        assert_eq!(queue.drain(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        queue.check_invariants().unwrap();
    }

    #[test]
    fn test_interleaved_push_pop() {
        let mut queue = WorkQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(1));
        queue.push(3).unwrap();
        queue.check_invariants().unwrap();
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
        queue.check_invariants().unwrap();
    }
}
