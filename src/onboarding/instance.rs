//! The process-wide onboarding machine.
//!
//! Onboarding is modal for the whole application, so at most one machine is live at a
//! time. Screens reach it through [require_existing].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use super::{
    machine::{OnboardingMachine, OnboardingOptions},
    OnboardingError,
};

static INSTANCE: Mutex<Option<Arc<OnboardingMachine>>> = Mutex::new(None);

/// Lock the slot, releasing a machine that was stopped through its own handle.
fn instance() -> MutexGuard<'static, Option<Arc<OnboardingMachine>>> {
    let mut instance = INSTANCE.lock().unwrap_or_else(PoisonError::into_inner);
    if instance.as_ref().is_some_and(|machine| machine.is_stopped()) {
        if let Some(machine) = instance.take() {
            debug!(id = %machine.id(), "released stopped onboarding instance");
        }
    }
    instance
}

/// Return the live machine, creating one from `options` if there is none.
///
/// `options` are ignored when a machine is already live. A stopped machine is replaced.
pub fn get_or_create(options: OnboardingOptions) -> Arc<OnboardingMachine> {
    instance()
        .get_or_insert_with(|| {
            let machine = Arc::new(OnboardingMachine::new(options));
            debug!(id = %machine.id(), "started onboarding instance");
            machine
        })
        .clone()
}

pub fn require_existing() -> Result<Arc<OnboardingMachine>, OnboardingError> {
    instance().clone().ok_or(OnboardingError::NoActiveInstance)
}

pub fn has_instance() -> bool {
    instance().is_some()
}

/// Stop and release the live machine. Does nothing when there is none.
pub fn stop() {
    // Released before stopping so the lock is never held inside the machine.
    let machine = instance().take();
    if let Some(machine) = machine {
        machine.stop();
        debug!(id = %machine.id(), "stopped onboarding instance");
    }
}

/// Stop the live machine only if it is the machine with the given id.
pub(crate) fn stop_machine(id: Uuid) {
    let machine = {
        let mut instance = instance();
        if instance.as_ref().is_some_and(|machine| machine.id() == id) {
            instance.take()
        } else {
            None
        }
    };
    if let Some(machine) = machine {
        machine.stop();
        debug!(%id, "stopped finished onboarding instance");
    }
}
