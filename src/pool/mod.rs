//! # Thread Pool
//! src/pool/mod.rs
//!
//! Pool de threads de cada worker con su cola FIFO local.

pub mod thread_pool;
pub mod work_queue;

pub use thread_pool::{Rejected, ThreadPool};
pub use work_queue::WorkQueue;
