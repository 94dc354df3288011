//! Job configuration pipeline: validation, staging, per-job checks

pub mod config;
pub mod lifecycle;
pub mod runner;
