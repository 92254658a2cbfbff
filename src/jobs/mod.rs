//! Background job system
//!
//! Trait-based queue with an in-memory backend and a durable SeaORM backend,
//! a registry of job handlers and a worker pool.

mod config;
mod in_memory;
mod registry;
mod worker;

#[cfg(feature = "database")]
mod sea_orm_queue;


pub use config::{JobBackend, JobsConfig};
pub use in_memory::InMemoryJobQueue;
pub use registry::JobRegistry;
pub use worker::{JobWorker, WorkerPool};

#[cfg(feature = "database")]
pub use sea_orm_queue::SeaOrmJobQueue;
