//! deployd - Entry Point
//!
//! A continuous-deployment agent: watches GitHub repositories for new
//! commits and syncs branch snapshots onto local deploy paths. Job
//! configs are dropped as JSON files into the pending inbox.

use std::collections::HashMap;
use std::env;

use deployd::app::options::AppOptions;
use deployd::app::run::run;
use deployd::app::state::AppState;
use deployd::lock::{InstallLock, LockOptions};
use deployd::logs::{init_logging, LogOptions};
use deployd::storage::layout::StorageLayout;
use deployd::storage::settings::Settings;
use deployd::utils::version_info;
use deployd::workers::scheduler;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to render version info: {}", e),
        }
        return;
    }

    // Storage layout, optionally relocated for development setups
    let layout = match cli_args.get("base-dir") {
        Some(base) => StorageLayout::new(base),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file; a missing file means defaults
    let settings_file = layout.settings_file();
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => Some(guard),
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if let Err(e) = layout.setup().await {
        error!("Failed to create storage layout: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = layout.assert_writable().await {
        error!("Storage layout is not writable: {}", e);
        std::process::exit(1);
    }

    // Single agent instance per host
    let mut lock_options = LockOptions::new(layout.lock_file());
    lock_options.stale_after = std::time::Duration::from_secs(settings.lock_stale_secs);
    let _lock = match InstallLock::acquire(&lock_options) {
        Ok(lock) => lock,
        Err(e) => {
            error!("Could not acquire install lock: {}", e);
            std::process::exit(1);
        }
    };

    // One sweep of every processed job, then exit
    if cli_args.contains_key("single") {
        std::process::exit(run_single(&layout, &settings).await);
    }

    // Run the agent
    let options = AppOptions::from_settings(layout, &settings);
    info!("Running deployd agent with options: {:?}", options);
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

/// Run one scheduler pass over pending and processed jobs
async fn run_single(layout: &StorageLayout, settings: &Settings) -> i32 {
    let app_state = match AppState::init(layout, settings.deploy_user.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize agent: {}", e);
            return 1;
        }
    };

    scheduler::drain_pending(app_state.lifecycle.as_ref()).await;
    let stats = scheduler::sweep_once(app_state.lifecycle.as_ref(), app_state.runner.as_ref()).await;
    info!(
        "Single sweep finished: {} checked, {} deployed, {} failed",
        stats.checked, stats.deployed, stats.failed
    );

    if stats.failed > 0 {
        1
    } else {
        0
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
