//! Background workers: inbox watcher and job scheduler

pub mod scheduler;
pub mod watcher;
