//! The onboarding workflow: a guarded state machine walking a new user through the
//! agreements, personal details and PIN screens before the wallet is set up.
//!
//! ```text
//! ShowIntro -> AcceptAgreement -> EnterPersonalDetails -> EnterPin -> VerifyPin
//!     -> VerifyPersonalDetails -> SetupWallet -> FinishOnboarding
//! ```
//!
//! Declining the agreements goes through `DeclineOnboarding`, which resets the context
//! and returns to `ShowIntro`. A failed wallet setup lands in `SetupFailed`, from where
//! the user can retry, go back or decline.

pub mod context;
pub mod instance;
pub mod machine;
pub mod navigation;
pub mod setup;

use std::fmt;

use uuid::Uuid;

pub use context::{CredentialDraft, OnboardingContext, PersonalData, PinCode};
pub use machine::{OnboardingMachine, OnboardingOptions};
pub use navigation::{NavigationListener, Navigator, Screen};
pub use setup::{CredentialIssuer, IssuingSetupService, SetupService, WalletSetupOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OnboardingState {
    ShowIntro,
    AcceptAgreement,
    EnterPersonalDetails,
    EnterPin,
    VerifyPin,
    VerifyPersonalDetails,
    SetupWallet,
    SetupFailed,
    DeclineOnboarding,
    FinishOnboarding,
}

impl fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Input sent to the onboarding machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OnboardingEvent {
    /// Continue. In `VerifyPin` it carries the re-entered PIN.
    Next(Option<String>),
    Previous,
    Decline,
    SetTermsAccepted(bool),
    SetPrivacyAccepted(bool),
    SetPersonalData(PersonalData),
    SetPin(String),
}

impl OnboardingEvent {
    pub fn next() -> Self {
        Self::Next(None)
    }

    pub fn confirm_pin(pin: impl Into<String>) -> Self {
        Self::Next(Some(pin.into()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Next(_) => "NEXT",
            Self::Previous => "PREVIOUS",
            Self::Decline => "DECLINE",
            Self::SetTermsAccepted(_) => "SET_TOC",
            Self::SetPrivacyAccepted(_) => "SET_POLICY",
            Self::SetPersonalData(_) => "SET_PERSONAL_DATA",
            Self::SetPin(_) => "SET_PIN",
        }
    }
}

/// Where a transition came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A caller event or the wallet setup outcome. The user should see another screen.
    External,
    /// Bookkeeping of the machine itself. The user stays where they are.
    Internal,
}

/// A state change, or a context update when `prior == state`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub machine: Uuid,
    pub prior: OnboardingState,
    pub state: OnboardingState,
    pub context: OnboardingContext,
    pub kind: EventKind,
}

impl Transition {
    pub fn is_state_change(&self) -> bool {
        self.prior != self.state
    }
}

/// Receives every transition of a machine.
pub trait TransitionListener: Send + Sync {
    fn on_transition(&self, transition: &Transition);
}

impl<F> TransitionListener for F
where
    F: Fn(&Transition) + Send + Sync,
{
    fn on_transition(&self, transition: &Transition) {
        self(transition)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnboardingSnapshot {
    pub state: OnboardingState,
    pub context: OnboardingContext,
}

/// Result of a successfully delivered event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The machine moved to another state.
    Transitioned(OnboardingSnapshot),
    /// The context changed, the state did not.
    Updated(OnboardingSnapshot),
    /// A guard refused the transition. Nothing changed.
    Rejected,
}

impl SendOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn snapshot(&self) -> Option<&OnboardingSnapshot> {
        match self {
            Self::Transitioned(snapshot) | Self::Updated(snapshot) => Some(snapshot),
            Self::Rejected => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OnboardingError {
    /// The event is not accepted in the current state.
    #[error("event {event} is not accepted in state {state}")]
    InvalidEvent {
        state: OnboardingState,
        event: &'static str,
    },

    #[error("no onboarding machine is running")]
    NoActiveInstance,

    #[error("the onboarding machine has been stopped")]
    Stopped,
}
