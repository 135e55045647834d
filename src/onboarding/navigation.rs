use std::{fmt, sync::Arc};

use tracing::{debug, info};

use super::{
    context::OnboardingContext, instance, EventKind, OnboardingState, Transition,
    TransitionListener,
};

/// Screens of the onboarding flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Screen {
    Welcome,
    TermsOfService,
    PersonalData,
    PinCodeSet,
    PinCodeVerify,
    OnboardingSummary,
    Loading,
    SetupFailed,
}

impl Screen {
    /// The screen shown in `state`. The finished flow has none.
    pub fn for_state(state: OnboardingState) -> Option<Self> {
        let screen = match state {
            OnboardingState::ShowIntro | OnboardingState::DeclineOnboarding => Self::Welcome,
            OnboardingState::AcceptAgreement => Self::TermsOfService,
            OnboardingState::EnterPersonalDetails => Self::PersonalData,
            OnboardingState::EnterPin => Self::PinCodeSet,
            OnboardingState::VerifyPin => Self::PinCodeVerify,
            OnboardingState::VerifyPersonalDetails => Self::OnboardingSummary,
            OnboardingState::SetupWallet => Self::Loading,
            OnboardingState::SetupFailed => Self::SetupFailed,
            OnboardingState::FinishOnboarding => return None,
        };
        Some(screen)
    }
}

/// The host application's screen navigation.
pub trait Navigator: Send + Sync {
    /// False while the host cannot navigate yet, e.g. during start up.
    fn is_ready(&self) -> bool {
        true
    }

    fn navigate(&self, screen: Screen, context: &OnboardingContext);

    /// Called once onboarding completed.
    fn finish(&self);
}

/// Default transition listener: logs every transition and shows the screen of each
/// state reached through an external event.
///
/// When onboarding finishes it stops the process-wide instance, if that is the machine
/// which finished, and hands over to [Navigator::finish].
#[derive(Clone, Default)]
pub struct NavigationListener {
    navigator: Option<Arc<dyn Navigator>>,
}

impl fmt::Debug for NavigationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationListener")
            .field("navigator", &self.navigator.is_some())
            .finish()
    }
}

impl NavigationListener {
    pub fn new(navigator: Option<Arc<dyn Navigator>>) -> Self {
        Self { navigator }
    }
}

impl TransitionListener for NavigationListener {
    fn on_transition(&self, transition: &Transition) {
        debug!(
            machine = %transition.machine,
            prior = %transition.prior,
            state = %transition.state,
            kind = ?transition.kind,
            context = ?transition.context,
            "onboarding state"
        );

        if transition.kind == EventKind::Internal {
            return;
        }

        if transition.state == OnboardingState::FinishOnboarding {
            info!(machine = %transition.machine, "onboarding finished");
            instance::stop_machine(transition.machine);
            if let Some(navigator) = &self.navigator {
                navigator.finish();
            }
            return;
        }

        let (Some(navigator), Some(screen)) = (&self.navigator, Screen::for_state(transition.state))
        else {
            return;
        };
        if !navigator.is_ready() {
            debug!(?screen, "navigator not ready, skipping navigation");
            return;
        }
        navigator.navigate(screen, &transition.context);
    }
}
