//! GitHub API access: commit tracking and change-set resolution

pub mod changes;
pub mod client;
pub mod commits;
