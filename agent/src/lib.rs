//! deployd library
//!
//! Core modules for the deployd continuous-deployment agent: it tracks
//! commits on remote GitHub repositories and synchronizes branch
//! snapshots onto local deployment paths.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod github;
pub mod jobs;
pub mod lock;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
