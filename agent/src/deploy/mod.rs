//! Deployment pipeline: snapshot download, extraction, sync and setup

pub mod archive;
pub mod engine;
pub mod fileops;
pub mod fsm;
