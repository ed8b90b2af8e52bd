use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::error::RouterError;

/// System audio output routing, consumed by the capture session to enable
/// loopback capture. The session pairs every successful switch with exactly
/// one eventual restore.
pub trait OutputRouter: Send + Sync {
    /// Name of the current system output device, if it can be determined.
    fn current_output(&self) -> Result<Option<String>, RouterError>;

    /// Switch the system output device.
    fn set_output(&self, device: &str) -> Result<(), RouterError>;
}

/// Routes through the `SwitchAudioSource` CLI (macOS, switchaudio-osx).
pub struct SwitchAudioRouter;

impl OutputRouter for SwitchAudioRouter {
    fn current_output(&self) -> Result<Option<String>, RouterError> {
        let output = Command::new("SwitchAudioSource")
            .args(["-c", "-t", "output"])
            .output()
            .map_err(RouterError::Unavailable)?;

        if !output.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    fn set_output(&self, device: &str) -> Result<(), RouterError> {
        let status = Command::new("SwitchAudioSource")
            .args(["-s", device, "-t", "output"])
            .status()
            .map_err(RouterError::Unavailable)?;

        if status.success() {
            info!("switched audio output to '{}'", device);
            Ok(())
        } else {
            Err(RouterError::SwitchFailed(device.to_string()))
        }
    }
}

/// Device parked for emergency restore while a switch is active.
///
/// A normal restore clears the slot, so the emergency path never performs a
/// duplicate restore. Only one session may hold a pending switch at a time.
static PENDING_RESTORE: Mutex<Option<String>> = Mutex::new(None);

fn register_pending_restore(device: &str) {
    if let Ok(mut slot) = PENDING_RESTORE.lock() {
        *slot = Some(device.to_string());
    }
}

fn clear_pending_restore() {
    if let Ok(mut slot) = PENDING_RESTORE.lock() {
        *slot = None;
    }
}

/// Best-effort restore for abnormal shutdown paths. A no-op when no switch is
/// pending.
pub fn emergency_restore(router: &dyn OutputRouter) {
    let parked = PENDING_RESTORE.lock().ok().and_then(|mut slot| slot.take());
    if let Some(device) = parked {
        warn!("restoring audio output to '{}' during emergency cleanup", device);
        if let Err(e) = router.set_output(&device) {
            warn!("emergency restore failed: {}", e);
        }
    }
}

/// Tracks the switch/restore pairing for one capture session.
///
/// `switch_to` saves the current output before switching and is idempotent
/// while a switch is active; `restore` puts the saved device back and is a
/// no-op when there is nothing to restore. Dropping the guard restores too,
/// so cancel, stop, and unwind paths all converge on one restore.
pub struct RoutingGuard {
    router: Arc<dyn OutputRouter>,
    original: Option<String>,
}

impl RoutingGuard {
    pub fn new(router: Arc<dyn OutputRouter>) -> Self {
        Self {
            router,
            original: None,
        }
    }

    pub fn is_switched(&self) -> bool {
        self.original.is_some()
    }

    pub fn switch_to(&mut self, device: &str) -> Result<(), RouterError> {
        if self.original.is_some() {
            return Ok(());
        }

        let saved = self.router.current_output()?;
        self.router.set_output(device)?;

        if let Some(name) = &saved {
            register_pending_restore(name);
            self.original = saved;
        } else {
            // Unknown prior device: nothing we could restore to later.
            warn!("prior output device unknown; restore will be skipped");
        }
        Ok(())
    }

    pub fn restore(&mut self) {
        if let Some(device) = self.original.take() {
            match self.router.set_output(&device) {
                Ok(()) => info!("restored audio output to '{}'", device),
                Err(e) => warn!("could not restore audio output to '{}': {}", device, e),
            }
            clear_pending_restore();
        }
    }
}

impl Drop for RoutingGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
