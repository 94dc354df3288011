//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings, read from `<base>/settings.json`.
///
/// Every field has a default so a missing or partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Identity the deploy path is chowned to after a sync,
    /// `user` or `user:group`
    #[serde(default = "default_deploy_user")]
    pub deploy_user: String,

    /// Interval between periodic re-checks of processed jobs, seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Age after which a lock whose holder is gone counts as stale,
    /// seconds
    #[serde(default = "default_lock_stale")]
    pub lock_stale_secs: u64,

    /// Enable the HTTP trigger server
    #[serde(default = "default_true")]
    pub enable_http_server: bool,

    /// HTTP trigger server configuration
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_true() -> bool {
    true
}

fn default_deploy_user() -> String {
    "www-data:www-data".to_string()
}

fn default_check_interval() -> u64 {
    1200 // 20 minutes
}

fn default_lock_stale() -> u64 {
    3600 // 1 hour
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            deploy_user: default_deploy_user(),
            check_interval_secs: default_check_interval(),
            lock_stale_secs: default_lock_stale(),
            enable_http_server: true,
            server: ServerSettings::default(),
        }
    }
}

/// HTTP trigger server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_empty_object() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.deploy_user, "www-data:www-data");
        assert_eq!(settings.check_interval_secs, 1200);
        assert_eq!(settings.lock_stale_secs, 3600);
        assert!(settings.enable_http_server);
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn test_settings_partial_override() {
        let settings: Settings =
            serde_json::from_str(r#"{"check_interval_secs": 60, "server": {"port": 8080}}"#)
                .unwrap();
        assert_eq!(settings.check_interval_secs, 60);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
    }
}
