//! apptivator-daemon: global shortcut sequences that activate applications
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global hotkey capture via CGEventTap, binding only the combos that can
//!   continue the sequence typed so far
//! - A sequence engine that walks multi-combo shortcuts with an idle timeout
//! - Application activation, hiding and launching through osascript
//! - IPC server for the configuration UI

mod activation;
mod config;
mod engine;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::activation::{ActivationWorker, ScriptActivator};
use crate::config::Config;
use crate::engine::SequenceEngine;
use crate::events::EngineEvent;
#[cfg(target_os = "macos")]
use crate::hotkey::{EventTapRegistry, HotkeyListener};
#[cfg(not(target_os = "macos"))]
use crate::hotkey::MemoryRegistry;
use crate::ipc::{RequestContext, Server};
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "apptivator-daemon starting"
    );

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket = %config.socket_path.display(),
        sequence_delay_ms = config.sequence_delay.as_millis() as u64,
        max_sequence_length = config.max_sequence_length,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    // Hotkey listener -> engine
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // IPC clients -> engine
    let (command_tx, command_rx) = mpsc::channel(32);
    // Engine -> activation worker
    let (activation_tx, activation_rx) = mpsc::unbounded_channel();
    // Engine and activation worker -> log and subscribed clients
    let (event_tx, _event_rx) = broadcast::channel::<EngineEvent>(64);

    #[cfg(target_os = "macos")]
    let (registry, hotkey_listener) = {
        let registry = EventTapRegistry::new();
        let listener = HotkeyListener::new(hotkey_tx, registry.bound_set());

        // Runs on a dedicated thread
        match listener.start() {
            Ok(()) => info!("hotkey listener started"),
            Err(e) => {
                error!(?e, "failed to start hotkey listener");
                warn!("continuing without hotkey support - check Accessibility permissions");
            }
        }
        (registry, listener)
    };

    #[cfg(not(target_os = "macos"))]
    let registry = {
        drop(hotkey_tx);
        warn!("global hotkeys unavailable on this platform, serving IPC only");
        MemoryRegistry::new()
    };

    let activation_worker =
        ActivationWorker::new(ScriptActivator::new(), activation_rx, event_tx.clone());
    tokio::spawn(activation_worker.run());

    let mut engine = SequenceEngine::new(
        config.engine(),
        registry,
        activation_tx,
        event_tx.clone(),
    );

    let server = Server::new(
        &config.socket_path,
        RequestContext::new(command_tx, event_tx.clone()),
    )?;

    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = engine.run(hotkey_rx, command_rx) => {
            info!("sequence engine exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "engine event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "engine event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("engine event logger exited");
        }

        reason = shutdown.wait() => {
            info!(%reason, "shutdown signal received");
        }
    }

    info!("shutting down...");

    engine.shutdown();

    #[cfg(target_os = "macos")]
    {
        if hotkey_listener.is_running() {
            hotkey_listener.stop();
            info!("hotkey listener stopped");
        }
    }

    server.shutdown().await;

    info!("apptivator-daemon stopped");

    Ok(())
}
