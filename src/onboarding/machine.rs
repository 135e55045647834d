use std::{
    fmt,
    sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use regex::Regex;
use serde_json::Value as Json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    context::{CredentialDraft, OnboardingContext},
    navigation::{NavigationListener, Navigator},
    setup::SetupService,
    EventKind, OnboardingError, OnboardingEvent, OnboardingSnapshot, OnboardingState,
    SendOutcome, Transition, TransitionListener,
};
use crate::config::OnboardingConfig;

use OnboardingState::*;

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9\-]+(\.[a-zA-Z0-9\-]+)*\.[a-zA-Z]{2,}$")
        .expect("email address pattern is valid")
});

pub const PIN_CODE_LENGTH: usize = 6;

fn agreement_accepted(context: &OnboardingContext) -> bool {
    context.terms_accepted && context.privacy_accepted
}

fn personal_data_valid(context: &OnboardingContext) -> bool {
    context.personal_data.as_ref().is_some_and(|data| {
        !data.first_name.is_empty()
            && !data.last_name.is_empty()
            && EMAIL_ADDRESS.is_match(&data.email_address)
    })
}

fn pin_code_set(context: &OnboardingContext) -> bool {
    context.pin_code.len() == PIN_CODE_LENGTH
}

fn pin_code_verified(context: &OnboardingContext, confirmation: Option<&str>) -> bool {
    pin_code_set(context) && confirmation == Some(context.pin_code.as_str())
}

enum Action {
    Assign,
    Goto(OnboardingState),
    Reject,
}

fn guarded(guard: bool, target: OnboardingState) -> Action {
    if guard {
        Action::Goto(target)
    } else {
        Action::Reject
    }
}

/// The transition table. `None` means the event is not accepted in `state`.
fn plan(
    state: OnboardingState,
    event: &OnboardingEvent,
    context: &OnboardingContext,
) -> Option<Action> {
    use OnboardingEvent as E;

    let action = match (state, event) {
        (ShowIntro, E::Next(_)) => Action::Goto(AcceptAgreement),

        (AcceptAgreement, E::SetTermsAccepted(_) | E::SetPrivacyAccepted(_)) => Action::Assign,
        (AcceptAgreement, E::Next(_)) => {
            guarded(agreement_accepted(context), EnterPersonalDetails)
        }
        (AcceptAgreement, E::Previous) => Action::Goto(ShowIntro),
        (AcceptAgreement, E::Decline) => Action::Goto(DeclineOnboarding),

        (EnterPersonalDetails, E::SetPersonalData(_)) => Action::Assign,
        (EnterPersonalDetails, E::Next(_)) => guarded(personal_data_valid(context), EnterPin),
        (EnterPersonalDetails, E::Previous) => Action::Goto(AcceptAgreement),

        (EnterPin, E::SetPin(_)) => Action::Assign,
        (EnterPin, E::Next(_)) => guarded(pin_code_set(context), VerifyPin),
        (EnterPin, E::Previous) => Action::Goto(EnterPersonalDetails),

        (VerifyPin, E::Next(confirmation)) => guarded(
            pin_code_verified(context, confirmation.as_deref()),
            VerifyPersonalDetails,
        ),
        (VerifyPin, E::Previous) => Action::Goto(EnterPin),

        (VerifyPersonalDetails, E::Next(_)) => Action::Goto(SetupWallet),
        // Verification restarts from PIN entry.
        (VerifyPersonalDetails, E::Previous) => Action::Goto(EnterPin),

        (SetupFailed, E::Next(_)) => Action::Goto(SetupWallet),
        (SetupFailed, E::Previous) => Action::Goto(VerifyPersonalDetails),
        (SetupFailed, E::Decline) => Action::Goto(DeclineOnboarding),

        _ => return None,
    };

    Some(action)
}

fn assign(context: &mut OnboardingContext, event: OnboardingEvent) {
    match event {
        OnboardingEvent::SetTermsAccepted(accepted) => context.terms_accepted = accepted,
        OnboardingEvent::SetPrivacyAccepted(accepted) => context.privacy_accepted = accepted,
        OnboardingEvent::SetPersonalData(data) => context.personal_data = Some(data),
        OnboardingEvent::SetPin(pin) => context.pin_code = pin.into(),
        OnboardingEvent::Next(_) | OnboardingEvent::Previous | OnboardingEvent::Decline => {}
    }
}

/// Options used to create an [OnboardingMachine].
#[derive(Clone)]
pub struct OnboardingOptions {
    machine_id: String,
    credential_draft: CredentialDraft,
    setup: Arc<dyn SetupService>,
    setup_timeout: Duration,
    listener: Option<Arc<dyn TransitionListener>>,
    navigator: Option<Arc<dyn Navigator>>,
    require_custom_navigation_hook: bool,
}

impl OnboardingOptions {
    /// Options with the default configuration.
    pub fn new(setup: Arc<dyn SetupService>) -> Self {
        Self::from_config(&OnboardingConfig::default(), setup)
    }

    pub fn from_config(config: &OnboardingConfig, setup: Arc<dyn SetupService>) -> Self {
        Self {
            machine_id: config.machine_id.clone(),
            credential_draft: CredentialDraft::new(
                config.did_method.as_str(),
                config.proof_format.as_str(),
                config.identity_context.as_ref(),
            ),
            setup,
            setup_timeout: config.setup_timeout(),
            listener: None,
            navigator: None,
            require_custom_navigation_hook: config.require_custom_navigation_hook,
        }
    }

    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }

    /// Replace the credential template of the draft.
    pub fn with_credential(mut self, credential: Json) -> Self {
        self.credential_draft.credential = credential;
        self
    }

    pub fn with_credential_draft(mut self, credential_draft: CredentialDraft) -> Self {
        self.credential_draft = credential_draft;
        self
    }

    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    /// Replace the default navigation listener.
    pub fn with_listener(mut self, listener: Arc<dyn TransitionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Navigator used by the default navigation listener.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Without a custom listener, transitions are not observed at all.
    pub fn require_custom_navigation_hook(mut self, required: bool) -> Self {
        self.require_custom_navigation_hook = required;
        self
    }
}

struct Inner {
    state: OnboardingState,
    context: OnboardingContext,
    setup_error: Option<String>,
    stopped: bool,
}

impl Inner {
    fn snapshot(&self) -> OnboardingSnapshot {
        OnboardingSnapshot {
            state: self.state,
            context: self.context.clone(),
        }
    }
}

/// The onboarding workflow of a single user.
///
/// Events are applied one at a time. The state lock is never held while the setup
/// service runs, so snapshots can be taken meanwhile; events sent during setup are
/// refused.
pub struct OnboardingMachine {
    id: Uuid,
    machine_id: String,
    initial: OnboardingContext,
    setup: Arc<dyn SetupService>,
    setup_timeout: Duration,
    listener: Option<Arc<dyn TransitionListener>>,
    inner: RwLock<Inner>,
}

impl fmt::Debug for OnboardingMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnboardingMachine")
            .field("id", &self.id)
            .field("machine_id", &self.machine_id)
            .field("state", &self.read().state)
            .finish_non_exhaustive()
    }
}

impl OnboardingMachine {
    pub fn new(options: OnboardingOptions) -> Self {
        let OnboardingOptions {
            machine_id,
            credential_draft,
            setup,
            setup_timeout,
            listener,
            navigator,
            require_custom_navigation_hook,
        } = options;

        let listener = match listener {
            Some(listener) => Some(listener),
            None if !require_custom_navigation_hook => {
                Some(Arc::new(NavigationListener::new(navigator)) as Arc<dyn TransitionListener>)
            }
            None => None,
        };

        let initial = OnboardingContext::new(credential_draft);
        let id = Uuid::new_v4();
        debug!(%id, machine_id = machine_id.as_str(), "created onboarding machine");

        Self {
            id,
            machine_id,
            setup,
            setup_timeout,
            listener,
            inner: RwLock::new(Inner {
                state: ShowIntro,
                context: initial.clone(),
                setup_error: None,
                stopped: false,
            }),
            initial,
        }
    }

    /// Unique id of this machine instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn state(&self) -> OnboardingState {
        self.read().state
    }

    pub fn context(&self) -> OnboardingContext {
        self.read().context.clone()
    }

    pub fn snapshot(&self) -> OnboardingSnapshot {
        self.read().snapshot()
    }

    /// Reason of the last failed wallet setup, cleared when setup is retried.
    pub fn setup_error(&self) -> Option<String> {
        self.read().setup_error.clone()
    }

    pub fn is_done(&self) -> bool {
        self.state() == FinishOnboarding
    }

    pub fn is_stopped(&self) -> bool {
        self.read().stopped
    }

    /// Stop the machine. Any later event fails with [OnboardingError::Stopped] and the
    /// result of a setup still in flight is dropped.
    pub fn stop(&self) {
        let mut inner = self.write();
        if !inner.stopped {
            inner.stopped = true;
            debug!(id = %self.id, state = %inner.state, "stopped onboarding machine");
        }
    }

    /// Whether `event` would be accepted and pass its guard in the current state.
    pub fn can(&self, event: &OnboardingEvent) -> bool {
        let inner = self.read();
        !inner.stopped
            && matches!(
                plan(inner.state, event, &inner.context),
                Some(Action::Assign | Action::Goto(_))
            )
    }

    /// Apply an event.
    ///
    /// Entering `SetupWallet` runs the setup service before returning, the outcome then
    /// describes the state reached after setup.
    pub async fn send(&self, event: OnboardingEvent) -> Result<SendOutcome, OnboardingError> {
        let mut transitions = Vec::new();
        let outcome = {
            let mut inner = self.write();
            if inner.stopped {
                return Err(OnboardingError::Stopped);
            }

            let Some(action) = plan(inner.state, &event, &inner.context) else {
                debug!(state = %inner.state, event = event.name(), "event not accepted");
                return Err(OnboardingError::InvalidEvent {
                    state: inner.state,
                    event: event.name(),
                });
            };

            match action {
                Action::Reject => {
                    debug!(state = %inner.state, event = event.name(), "guard rejected event");
                    return Ok(SendOutcome::Rejected);
                }
                Action::Assign => {
                    assign(&mut inner.context, event);
                    transitions.push(self.transition(&inner, inner.state, EventKind::External));
                    SendOutcome::Updated(inner.snapshot())
                }
                Action::Goto(target) => {
                    self.enter(&mut inner, target, EventKind::External, &mut transitions);
                    SendOutcome::Transitioned(inner.snapshot())
                }
            }
        };

        self.notify(&transitions);

        match outcome {
            SendOutcome::Transitioned(OnboardingSnapshot {
                state: SetupWallet,
                context,
            }) => self.run_setup(context).await,
            outcome => Ok(outcome),
        }
    }

    /// Apply events in order, stopping at the first error.
    pub async fn send_all(
        &self,
        events: impl IntoIterator<Item = OnboardingEvent>,
    ) -> Result<Vec<SendOutcome>, OnboardingError> {
        let mut outcomes = Vec::new();
        for event in events {
            outcomes.push(self.send(event).await?);
        }
        Ok(outcomes)
    }

    async fn run_setup(&self, context: OnboardingContext) -> Result<SendOutcome, OnboardingError> {
        info!(id = %self.id, "setting up wallet");

        let result = match tokio::time::timeout(self.setup_timeout, self.setup.run(context)).await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!("wallet setup timed out after {:?}", self.setup_timeout)),
        };

        let mut transitions = Vec::new();
        let snapshot = {
            let mut inner = self.write();
            if inner.stopped || inner.state != SetupWallet {
                debug!(id = %self.id, "dropping wallet setup result of stopped machine");
                return Err(OnboardingError::Stopped);
            }

            let target = match result {
                Ok(outcome) => {
                    info!(id = %self.id, credential = %outcome.credential_hash, "wallet set up");
                    FinishOnboarding
                }
                Err(e) => {
                    warn!(id = %self.id, "wallet setup failed: {e}");
                    inner.setup_error = Some(e);
                    SetupFailed
                }
            };
            self.enter(&mut inner, target, EventKind::External, &mut transitions);
            inner.snapshot()
        };

        self.notify(&transitions);
        Ok(SendOutcome::Transitioned(snapshot))
    }

    /// Move to `target`, running its entry actions.
    fn enter(
        &self,
        inner: &mut Inner,
        target: OnboardingState,
        kind: EventKind,
        transitions: &mut Vec<Transition>,
    ) {
        let prior = inner.state;
        inner.state = target;

        match target {
            DeclineOnboarding => inner.context = self.initial.clone(),
            SetupWallet => inner.setup_error = None,
            FinishOnboarding => inner.context = OnboardingContext::default(),
            _ => {}
        }

        debug!(id = %self.id, %prior, state = %target, ?kind, "onboarding transition");
        transitions.push(self.transition(inner, prior, kind));

        if target == DeclineOnboarding {
            self.enter(inner, ShowIntro, EventKind::Internal, transitions);
        }
    }

    fn transition(&self, inner: &Inner, prior: OnboardingState, kind: EventKind) -> Transition {
        Transition {
            machine: self.id,
            prior,
            state: inner.state,
            context: inner.context.clone(),
            kind,
        }
    }

    fn notify(&self, transitions: &[Transition]) {
        if let Some(listener) = &self.listener {
            for transition in transitions {
                listener.on_transition(transition);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use crate::onboarding::{context::PersonalData, setup::WalletSetupOutcome};

    #[derive(Default)]
    struct CountingSetup {
        runs: Mutex<usize>,
        fail_first: bool,
    }

    #[async_trait]
    impl SetupService for CountingSetup {
        async fn run(&self, context: OnboardingContext) -> Result<WalletSetupOutcome> {
            let runs = {
                let mut runs = self.runs.lock().unwrap();
                *runs += 1;
                *runs
            };
            if self.fail_first && runs == 1 {
                bail!("issuer unavailable")
            }
            assert_eq!(context.pin_code.as_str(), "123456");
            Ok(WalletSetupOutcome {
                credential_hash: "hash".into(),
            })
        }
    }

    fn machine(setup: Arc<CountingSetup>) -> (OnboardingMachine, Arc<Mutex<Vec<Transition>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let machine = OnboardingMachine::new(
            OnboardingOptions::new(setup)
                .with_listener(Arc::new(move |t: &Transition| {
                    recorder.lock().unwrap().push(t.clone())
                })),
        );
        (machine, seen)
    }

    async fn to_verify_personal_details(machine: &OnboardingMachine) {
        machine
            .send_all([
                OnboardingEvent::next(),
                OnboardingEvent::SetTermsAccepted(true),
                OnboardingEvent::SetPrivacyAccepted(true),
                OnboardingEvent::next(),
                OnboardingEvent::SetPersonalData(PersonalData::new(
                    "Ada",
                    "Lovelace",
                    "ada@example.com",
                )),
                OnboardingEvent::next(),
                OnboardingEvent::SetPin("123456".into()),
                OnboardingEvent::next(),
                OnboardingEvent::confirm_pin("123456"),
            ])
            .await
            .unwrap();
        assert_eq!(machine.state(), VerifyPersonalDetails);
    }

    #[test]
    fn email_pattern() {
        for valid in ["ada@example.com", "first.last+tag@mail.example.co.uk"] {
            assert!(EMAIL_ADDRESS.is_match(valid), "{valid}");
        }
        for invalid in ["", "ada", "ada@", "@example.com", "ada@example", "a b@example.com"] {
            assert!(!EMAIL_ADDRESS.is_match(invalid), "{invalid}");
        }
    }

    #[tokio::test]
    async fn agreement_guard() {
        let (machine, _) = machine(Arc::default());
        machine.send(OnboardingEvent::next()).await.unwrap();

        machine
            .send(OnboardingEvent::SetTermsAccepted(true))
            .await
            .unwrap();
        assert!(!machine.can(&OnboardingEvent::next()));
        assert!(machine
            .send(OnboardingEvent::next())
            .await
            .unwrap()
            .is_rejected());
        assert_eq!(machine.state(), AcceptAgreement);

        machine
            .send(OnboardingEvent::SetPrivacyAccepted(true))
            .await
            .unwrap();
        assert!(machine.can(&OnboardingEvent::next()));
    }

    #[tokio::test]
    async fn assignment_events_are_scoped_to_their_screen() {
        let (machine, _) = machine(Arc::default());

        assert_eq!(
            machine.send(OnboardingEvent::SetPin("123456".into())).await,
            Err(OnboardingError::InvalidEvent {
                state: ShowIntro,
                event: "SET_PIN"
            })
        );
        assert_eq!(
            machine.send(OnboardingEvent::Previous).await,
            Err(OnboardingError::InvalidEvent {
                state: ShowIntro,
                event: "PREVIOUS"
            })
        );
        assert!(!machine.can(&OnboardingEvent::Decline));
    }

    #[tokio::test]
    async fn setup_failure_then_retry() {
        let setup = Arc::new(CountingSetup {
            fail_first: true,
            ..Default::default()
        });
        let (machine, seen) = machine(setup.clone());
        to_verify_personal_details(&machine).await;

        let outcome = machine.send(OnboardingEvent::next()).await.unwrap();
        assert_eq!(outcome.snapshot().map(|s| s.state), Some(SetupFailed));
        assert_eq!(machine.setup_error().as_deref(), Some("issuer unavailable"));
        {
            let seen = seen.lock().unwrap();
            let last = seen.last().unwrap();
            assert_eq!((last.prior, last.state), (SetupWallet, SetupFailed));
            assert_eq!(last.kind, EventKind::External);
        }

        machine.send(OnboardingEvent::next()).await.unwrap();
        assert!(machine.is_done());
        assert_eq!(machine.setup_error(), None);
        assert!(machine.context().is_scrubbed());
        assert_eq!(*setup.runs.lock().unwrap(), 2);

        assert_eq!(
            machine.send(OnboardingEvent::Previous).await,
            Err(OnboardingError::InvalidEvent {
                state: FinishOnboarding,
                event: "PREVIOUS"
            })
        );
    }

    #[tokio::test]
    async fn setup_timeout_is_a_failure() {
        struct Stalled;

        #[async_trait]
        impl SetupService for Stalled {
            async fn run(&self, _context: OnboardingContext) -> Result<WalletSetupOutcome> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                bail!("unreachable")
            }
        }

        let machine = OnboardingMachine::new(
            OnboardingOptions::new(Arc::new(Stalled))
                .with_setup_timeout(Duration::from_millis(10))
                .require_custom_navigation_hook(true),
        );
        to_verify_personal_details(&machine).await;

        machine.send(OnboardingEvent::next()).await.unwrap();
        assert_eq!(machine.state(), SetupFailed);
        assert!(machine
            .setup_error()
            .is_some_and(|e| e.contains("timed out")));

        machine.send(OnboardingEvent::Decline).await.unwrap();
        assert_eq!(machine.state(), ShowIntro);
    }

    #[tokio::test]
    async fn stopped_machine_refuses_events() {
        let (machine, seen) = machine(Arc::default());
        machine.stop();

        assert_eq!(
            machine.send(OnboardingEvent::next()).await,
            Err(OnboardingError::Stopped)
        );
        assert!(!machine.can(&OnboardingEvent::next()));
        assert!(seen.lock().unwrap().is_empty());
    }
}
