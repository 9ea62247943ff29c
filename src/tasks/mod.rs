//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Store sweep: Purges expired values from the in-memory store

mod sweep;

pub use sweep::spawn_sweep_task;
