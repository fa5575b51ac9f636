//! Global hotkey listener using macOS CGEventTap
//!
//! Watches system-wide key-down events. A key-down whose combo is bound in
//! the shared registry is swallowed and forwarded to the engine; every
//! other event passes through untouched. Runs on a dedicated thread with
//! its own CFRunLoop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::keys::ShortcutCombo;
use super::HotkeyEvent;

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to attach event tap to the run loop")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Global hotkey listener for the combos bound in an `EventTapRegistry`
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    bound: Arc<Mutex<HashSet<ShortcutCombo>>>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener over the registry's bound set
    pub fn new(
        event_tx: mpsc::Sender<HotkeyEvent>,
        bound: Arc<Mutex<HashSet<ShortcutCombo>>>,
    ) -> Self {
        Self {
            event_tx,
            bound,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// Spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks until `stop()` is called.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let bound = Arc::clone(&self.bound);
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = tap::run_event_loop(event_tx, bound, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop the hotkey listener; the run loop exits on its next tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

mod tap {
    use super::*;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tracing::{debug, warn};

    use crate::hotkey::keys::Modifiers;

    enum TapMessage {
        Pressed(ShortcutCombo),
        Disabled,
    }

    /// Run the CFRunLoop with the event tap
    pub(super) fn run_event_loop(
        event_tx: mpsc::Sender<HotkeyEvent>,
        bound: Arc<Mutex<HashSet<ShortcutCombo>>>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let (callback_tx, callback_rx) = std::sync::mpsc::channel::<TapMessage>();

        // Must be fast and non-blocking: decide, then hand off
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
                             -> Option<CGEvent> {
            match event_type {
                CGEventType::KeyDown => {
                    let repeat =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
                    let key_code =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                    let combo = ShortcutCombo::new(key_code, Modifiers::from(event.get_flags()));

                    let is_bound = bound
                        .lock()
                        .map(|set| set.contains(&combo))
                        .unwrap_or(false);
                    if is_bound {
                        if !repeat {
                            let _ = callback_tx.send(TapMessage::Pressed(combo));
                        }
                        return None;
                    }
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(TapMessage::Disabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;

        tap.enable();

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        info!("event tap created and enabled");

        while running.load(Ordering::SeqCst) {
            CFRunLoop::run_in_mode(
                unsafe { kCFRunLoopDefaultMode },
                std::time::Duration::from_millis(100),
                true,
            );

            while let Ok(message) = callback_rx.try_recv() {
                let event = match message {
                    TapMessage::Pressed(combo) => {
                        debug!(%combo, "bound combo pressed");
                        HotkeyEvent::ComboPressed(combo)
                    }
                    TapMessage::Disabled => {
                        warn!("event tap disabled, re-enabling");
                        tap.enable();
                        HotkeyEvent::TapDisabled
                    }
                };

                // Not in an async context, so block on the bounded channel
                if event_tx.blocking_send(event).is_err() {
                    warn!("failed to send hotkey event - channel closed?");
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        Ok(())
    }
}
