//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::scheduler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Identity deploy paths are chowned to after a sync
    pub deploy_user: String,

    /// Enable the HTTP trigger server
    pub enable_http_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Scheduler worker options
    pub scheduler: scheduler::Options,
}

impl AppOptions {
    /// Build options from a storage layout and its settings file
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            deploy_user: settings.deploy_user.clone(),
            enable_http_server: settings.enable_http_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            scheduler: scheduler::Options {
                sweep_interval: Duration::from_secs(settings.check_interval_secs),
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP trigger server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}
