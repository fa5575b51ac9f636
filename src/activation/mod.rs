//! Application activation
//!
//! The engine hands a completed sequence to the activation worker and moves
//! on; the worker runs the activator on the blocking pool and reports the
//! result as an engine event. What activation means (launch, bring to
//! front, hide) is decided here from the entry's behavior flags.

use std::process::Command;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::engine::{AppTarget, BehaviorFlags, EntryId};
use crate::events::EngineEvent;

/// What an activation ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Launched,
    Activated,
    Hidden,
    /// Already frontmost and hiding is turned off
    AlreadyActive,
}

/// Errors surfaced when an application could not be activated
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("{0} is not running")]
    NotRunning(String),

    #[error("failed to launch osascript: {0}")]
    Launch(String),

    #[error("activation script failed (status {status}): {stderr}")]
    Script { status: i32, stderr: String },

    #[error("unexpected activation result: {0}")]
    UnexpectedOutput(String),

    #[error("activation task failed: {0}")]
    Task(String),
}

/// Activates the target of a completed sequence
///
/// Implementations may block; they always run on the blocking pool.
pub trait Activator: Send + Sync + 'static {
    fn activate(&self, target: &AppTarget, flags: &BehaviorFlags)
        -> Result<Outcome, ActivationError>;
}

/// A completed sequence waiting to be activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub entry_id: EntryId,
    pub target: AppTarget,
    pub flags: BehaviorFlags,
}

/// Runs activation requests one at a time, off the engine task
pub struct ActivationWorker<A> {
    activator: Arc<A>,
    requests: mpsc::UnboundedReceiver<ActivationRequest>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<A: Activator> ActivationWorker<A> {
    pub fn new(
        activator: A,
        requests: mpsc::UnboundedReceiver<ActivationRequest>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            activator: Arc::new(activator),
            requests,
            event_tx,
        }
    }

    /// Process requests until every sender is gone
    pub async fn run(mut self) {
        info!("activation worker started");

        while let Some(request) = self.requests.recv().await {
            let event = self.perform(request).await;
            debug!(%event, "emitting engine event");
            let _ = self.event_tx.send(event);
        }

        info!("activation worker stopped");
    }

    async fn perform(&self, request: ActivationRequest) -> EngineEvent {
        let ActivationRequest {
            entry_id,
            target,
            flags,
        } = request;
        let name = target.name();
        let activator = Arc::clone(&self.activator);

        let result = tokio::task::spawn_blocking(move || activator.activate(&target, &flags))
            .await
            .unwrap_or_else(|e| Err(ActivationError::Task(e.to_string())));

        match result {
            Ok(outcome) => {
                info!(app = %name, ?outcome, "application activated");
                EngineEvent::Activated { entry_id, name }
            }
            Err(e) => {
                warn!(app = %name, error = %e, "activation failed");
                EngineEvent::ActivationFailed {
                    entry_id,
                    name,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Activator backed by AppleScript through `osascript`
#[derive(Debug, Default)]
pub struct ScriptActivator;

impl ScriptActivator {
    pub fn new() -> Self {
        Self
    }
}

impl Activator for ScriptActivator {
    fn activate(
        &self,
        target: &AppTarget,
        flags: &BehaviorFlags,
    ) -> Result<Outcome, ActivationError> {
        let path = target.path.to_string_lossy();
        let script = activation_script(path.trim_end_matches('/'), flags);
        debug!(app = %path, "running activation script");

        let output = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .map_err(|e| ActivationError::Launch(e.to_string()))?;

        if !output.status.success() {
            return Err(ActivationError::Script {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_outcome(&target.name(), &String::from_utf8_lossy(&output.stdout))
    }
}

/// Build the AppleScript that performs the activation for the bundle at
/// `path`
///
/// The running process is looked up by its application file, so two
/// bundles sharing a name are never confused.
pub fn activation_script(path: &str, flags: &BehaviorFlags) -> String {
    let path = escape(path);
    let absent = if flags.launch_if_not_running {
        "do shell script \"open \" & quoted form of appPath\n\treturn \"launched\""
    } else {
        "return \"not-running\""
    };
    let frontmost = if flags.hide_with_shortcut_when_active {
        "set visible of proc to false\n\t\treturn \"hidden\""
    } else {
        "return \"active\""
    };

    format!(
        "set appPath to \"{path}\"\n\
         tell application \"System Events\"\n\
         \tset procs to every process whose POSIX path of application file is appPath\n\
         end tell\n\
         if procs is {{}} then\n\
         \t{absent}\n\
         end if\n\
         tell application \"System Events\"\n\
         \tset proc to item 1 of procs\n\
         \tif frontmost of proc then\n\
         \t\t{frontmost}\n\
         \tend if\n\
         \tset frontmost of proc to true\n\
         end tell\n\
         return \"activated\""
    )
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_outcome(name: &str, stdout: &str) -> Result<Outcome, ActivationError> {
    match stdout.trim() {
        "launched" => Ok(Outcome::Launched),
        "activated" => Ok(Outcome::Activated),
        "hidden" => Ok(Outcome::Hidden),
        "active" => Ok(Outcome::AlreadyActive),
        "not-running" => Err(ActivationError::NotRunning(name.to_string())),
        other => Err(ActivationError::UnexpectedOutput(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_launches_only_when_flagged() {
        let mut flags = BehaviorFlags::default();
        let script = activation_script("/Applications/Xcode.app", &flags);
        assert!(script.contains("return \"not-running\""));
        assert!(!script.contains("return \"launched\""));

        flags.launch_if_not_running = true;
        let script = activation_script("/Applications/Xcode.app", &flags);
        assert!(script.contains("quoted form of appPath"));
        assert!(script.contains("return \"launched\""));
    }

    #[test]
    fn test_script_hides_when_active() {
        let mut flags = BehaviorFlags::default();
        let script = activation_script("/Applications/Chess.app", &flags);
        assert!(script.contains("set visible of proc to false"));

        flags.hide_with_shortcut_when_active = false;
        let script = activation_script("/Applications/Chess.app", &flags);
        assert!(!script.contains("set visible"));
        assert!(script.contains("return \"active\""));
    }

    #[test]
    fn test_script_addresses_bundle_path() {
        let flags = BehaviorFlags::default();
        let release = activation_script("/Applications/Xcode.app", &flags);
        let beta = activation_script("/Applications/Beta/Xcode.app", &flags);

        assert!(release.contains("set appPath to \"/Applications/Xcode.app\""));
        assert!(beta.contains("set appPath to \"/Applications/Beta/Xcode.app\""));
        assert!(release.contains("POSIX path of application file is appPath"));
        assert!(!release.contains("application \"Xcode\""));
        assert_ne!(release, beta);
    }

    #[test]
    fn test_script_escapes_quotes() {
        let script = activation_script("/Applications/Say \"Hi\".app", &BehaviorFlags::default());
        assert!(script.contains("set appPath to \"/Applications/Say \\\"Hi\\\".app\""));
    }

    #[test]
    fn test_parse_outcome() {
        assert_eq!(parse_outcome("Xcode", "activated\n"), Ok(Outcome::Activated));
        assert_eq!(parse_outcome("Xcode", "hidden"), Ok(Outcome::Hidden));
        assert_eq!(
            parse_outcome("Xcode", "not-running"),
            Err(ActivationError::NotRunning("Xcode".into()))
        );
        assert!(matches!(
            parse_outcome("Xcode", "???"),
            Err(ActivationError::UnexpectedOutput(_))
        ));
    }

    struct FixedActivator(Result<Outcome, ActivationError>);

    impl Activator for FixedActivator {
        fn activate(
            &self,
            _target: &AppTarget,
            _flags: &BehaviorFlags,
        ) -> Result<Outcome, ActivationError> {
            self.0.clone()
        }
    }

    fn request(id: u64, path: &str) -> ActivationRequest {
        ActivationRequest {
            entry_id: EntryId(id),
            target: AppTarget::new(path),
            flags: BehaviorFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_worker_reports_success() {
        let (event_tx, mut event_rx) = broadcast::channel(8);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = ActivationWorker::new(FixedActivator(Ok(Outcome::Activated)), rx, event_tx);

        tx.send(request(3, "/Applications/Chess.app")).unwrap();
        drop(tx);
        worker.run().await;

        assert_eq!(
            event_rx.recv().await.unwrap(),
            EngineEvent::Activated {
                entry_id: EntryId(3),
                name: "Chess".into()
            }
        );
    }

    #[tokio::test]
    async fn test_worker_reports_failure() {
        let (event_tx, mut event_rx) = broadcast::channel(8);
        let (tx, rx) = mpsc::unbounded_channel();
        let activator = FixedActivator(Err(ActivationError::NotRunning("Calculator".into())));
        let worker = ActivationWorker::new(activator, rx, event_tx);

        tx.send(request(2, "/Applications/Calculator.app")).unwrap();
        tx.send(request(2, "/Applications/Calculator.app")).unwrap();
        drop(tx);
        worker.run().await;

        for _ in 0..2 {
            match event_rx.recv().await.unwrap() {
                EngineEvent::ActivationFailed {
                    entry_id,
                    name,
                    error,
                } => {
                    assert_eq!(entry_id, EntryId(2));
                    assert_eq!(name, "Calculator");
                    assert_eq!(error, "Calculator is not running");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
