// Tests for the output routing switch/restore pairing
//
// Every successful switch must be paired with exactly one eventual restore,
// whether that happens via explicit disable, stop, or drop. A restore with
// nothing to restore is a no-op, not an error.

use std::sync::{Arc, Mutex};

use recscribe::audio::{OutputRouter, RoutingGuard};
use recscribe::error::RouterError;

/// Records every switch so tests can assert the pairing.
struct FakeRouter {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl FakeRouter {
    fn new(initial: &str) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial.to_string()),
            history: Mutex::new(Vec::new()),
        })
    }

    fn current_name(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn switches(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl OutputRouter for FakeRouter {
    fn current_output(&self) -> Result<Option<String>, RouterError> {
        Ok(Some(self.current_name()))
    }

    fn set_output(&self, device: &str) -> Result<(), RouterError> {
        *self.current.lock().unwrap() = device.to_string();
        self.history.lock().unwrap().push(device.to_string());
        Ok(())
    }
}

#[test]
fn test_switch_then_restore_returns_to_original() {
    let router = FakeRouter::new("Speakers");
    let mut guard = RoutingGuard::new(router.clone());

    guard.switch_to("Multi-Output Device").unwrap();
    assert_eq!(router.current_name(), "Multi-Output Device");
    assert!(guard.is_switched());

    guard.restore();
    assert_eq!(router.current_name(), "Speakers");
    assert!(!guard.is_switched());
}

#[test]
fn test_switch_is_idempotent_while_active() {
    let router = FakeRouter::new("Speakers");
    let mut guard = RoutingGuard::new(router.clone());

    guard.switch_to("Multi-Output Device").unwrap();
    guard.switch_to("Multi-Output Device").unwrap();
    guard.switch_to("Multi-Output Device").unwrap();

    // One switch, and the saved original is still the true original.
    assert_eq!(router.switches(), vec!["Multi-Output Device".to_string()]);

    guard.restore();
    assert_eq!(router.current_name(), "Speakers");
}

#[test]
fn test_restore_with_nothing_to_restore_is_noop() {
    let router = FakeRouter::new("Speakers");
    let mut guard = RoutingGuard::new(router.clone());

    guard.restore();
    guard.restore();

    assert!(router.switches().is_empty());
    assert_eq!(router.current_name(), "Speakers");
}

#[test]
fn test_repeated_enable_disable_cycles_restore_each_time() {
    let router = FakeRouter::new("Speakers");
    let mut guard = RoutingGuard::new(router.clone());

    for _ in 0..3 {
        guard.switch_to("Multi-Output Device").unwrap();
        guard.restore();
        assert_eq!(router.current_name(), "Speakers");
    }

    assert_eq!(
        router.switches(),
        vec![
            "Multi-Output Device".to_string(),
            "Speakers".to_string(),
            "Multi-Output Device".to_string(),
            "Speakers".to_string(),
            "Multi-Output Device".to_string(),
            "Speakers".to_string(),
        ]
    );
}

#[test]
fn test_drop_restores_pending_switch() {
    let router = FakeRouter::new("Speakers");

    {
        let mut guard = RoutingGuard::new(router.clone());
        guard.switch_to("Multi-Output Device").unwrap();
        assert_eq!(router.current_name(), "Multi-Output Device");
        // Guard dropped here: cancel, stop, and unwind all end up on this path.
    }

    assert_eq!(router.current_name(), "Speakers");
}

#[test]
fn test_double_restore_after_switch_restores_once() {
    let router = FakeRouter::new("Speakers");
    let mut guard = RoutingGuard::new(router.clone());

    guard.switch_to("Multi-Output Device").unwrap();
    guard.restore();
    guard.restore();

    // switch + restore, nothing more.
    assert_eq!(router.switches().len(), 2);
}
