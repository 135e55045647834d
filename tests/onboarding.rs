
use std::sync::Arc;

use fixtures::*;
use wallet_flows::{
    onboarding::{
        instance, EventKind, IssuingSetupService, OnboardingError, OnboardingEvent,
        OnboardingMachine, OnboardingOptions, OnboardingState, PersonalData, Screen,
    },
    store::{CredentialStore, MemoryCredentialStore},
};

fn machine() -> (OnboardingMachine, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let machine = OnboardingMachine::new(
        OnboardingOptions::new(Arc::new(ImmediateSetup)).with_listener(listener.clone()),
    );
    (machine, listener)
}

#[tokio::test]
async fn agreement_needs_both_flags() {
    let (machine, _) = machine();
    machine.send(OnboardingEvent::next()).await.unwrap();

    for (terms, privacy) in [(false, false), (true, false), (false, true)] {
        machine
            .send_all([
                OnboardingEvent::SetTermsAccepted(terms),
                OnboardingEvent::SetPrivacyAccepted(privacy),
            ])
            .await
            .unwrap();
        assert!(machine
            .send(OnboardingEvent::next())
            .await
            .unwrap()
            .is_rejected());
        assert_eq!(machine.state(), OnboardingState::AcceptAgreement);
    }
}

#[tokio::test]
async fn invalid_personal_data_is_rejected() {
    let (machine, listener) = machine();
    machine.send(OnboardingEvent::next()).await.unwrap();
    machine
        .send_all([
            OnboardingEvent::SetTermsAccepted(true),
            OnboardingEvent::SetPrivacyAccepted(true),
            OnboardingEvent::next(),
        ])
        .await
        .unwrap();

    for data in [
        PersonalData::new("Ada", "Lovelace", "not-an-email"),
        PersonalData::new("Ada", "Lovelace", "ada@"),
        PersonalData::new("", "Lovelace", "ada@example.com"),
        PersonalData::new("Ada", "", "ada@example.com"),
    ] {
        machine
            .send(OnboardingEvent::SetPersonalData(data))
            .await
            .unwrap();
        listener.take();

        assert!(!machine.can(&OnboardingEvent::next()));
        assert!(machine
            .send(OnboardingEvent::next())
            .await
            .unwrap()
            .is_rejected());
        assert_eq!(machine.state(), OnboardingState::EnterPersonalDetails);
        assert!(listener.take().is_empty());
    }
}

#[tokio::test]
async fn pin_confirmation_must_match() {
    let (machine, _) = machine();
    machine.send(OnboardingEvent::next()).await.unwrap();
    machine
        .send_all([
            OnboardingEvent::SetTermsAccepted(true),
            OnboardingEvent::SetPrivacyAccepted(true),
            OnboardingEvent::next(),
            OnboardingEvent::SetPersonalData(personal_data()),
            OnboardingEvent::next(),
        ])
        .await
        .unwrap();

    machine
        .send(OnboardingEvent::SetPin("12345".into()))
        .await
        .unwrap();
    assert!(!machine.can(&OnboardingEvent::next()));

    machine
        .send_all([OnboardingEvent::SetPin("123456".into()), OnboardingEvent::next()])
        .await
        .unwrap();
    assert_eq!(machine.state(), OnboardingState::VerifyPin);

    assert!(machine
        .send(OnboardingEvent::confirm_pin("000000"))
        .await
        .unwrap()
        .is_rejected());
    assert!(machine
        .send(OnboardingEvent::next())
        .await
        .unwrap()
        .is_rejected());
    assert_eq!(machine.state(), OnboardingState::VerifyPin);

    machine
        .send(OnboardingEvent::confirm_pin("123456"))
        .await
        .unwrap();
    assert_eq!(machine.state(), OnboardingState::VerifyPersonalDetails);

    // Going back restarts from PIN entry.
    machine.send(OnboardingEvent::Previous).await.unwrap();
    assert_eq!(machine.state(), OnboardingState::EnterPin);
}

#[tokio::test]
async fn decline_resets_to_intro() {
    let (machine, listener) = machine();
    let initial = machine.context();

    machine.send(OnboardingEvent::next()).await.unwrap();
    machine
        .send_all([
            OnboardingEvent::SetTermsAccepted(true),
            OnboardingEvent::SetPrivacyAccepted(true),
        ])
        .await
        .unwrap();
    listener.take();

    machine.send(OnboardingEvent::Decline).await.unwrap();
    assert_eq!(machine.state(), OnboardingState::ShowIntro);
    assert_eq!(machine.context(), initial);

    let transitions: Vec<_> = listener
        .take()
        .into_iter()
        .map(|t| (t.prior, t.state, t.kind))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (
                OnboardingState::AcceptAgreement,
                OnboardingState::DeclineOnboarding,
                EventKind::External
            ),
            (
                OnboardingState::DeclineOnboarding,
                OnboardingState::ShowIntro,
                EventKind::Internal
            ),
        ]
    );
}

#[tokio::test]
async fn assignments_notify_without_state_change() {
    let (machine, listener) = machine();
    machine.send(OnboardingEvent::next()).await.unwrap();
    listener.take();

    machine
        .send(OnboardingEvent::SetTermsAccepted(true))
        .await
        .unwrap();
    let transitions = listener.take();
    assert_eq!(transitions.len(), 1);
    assert!(!transitions[0].is_state_change());
    assert!(transitions[0].context.terms_accepted);
}

#[tokio::test]
async fn completion_scrubs_context() {
    let (machine, listener) = machine();
    walk_to_summary(&machine).await;

    machine.send(OnboardingEvent::next()).await.unwrap();
    assert!(machine.is_done());

    let context = machine.context();
    assert!(context.pin_code.is_empty());
    assert_eq!(context.personal_data, None);
    assert_eq!(context.credential_draft, None);
    assert!(!context.terms_accepted && !context.privacy_accepted);

    let last = listener.take().pop().unwrap();
    assert_eq!(last.prior, OnboardingState::SetupWallet);
    assert!(last.context.is_scrubbed());

    assert!(matches!(
        machine.send(OnboardingEvent::next()).await,
        Err(OnboardingError::InvalidEvent {
            state: OnboardingState::FinishOnboarding,
            ..
        })
    ));
}

#[tokio::test]
async fn events_are_refused_while_setting_up() {
    let setup = Arc::new(GatedSetup::default());
    let machine = OnboardingMachine::new(
        OnboardingOptions::new(setup.clone()).require_custom_navigation_hook(true),
    );
    walk_to_summary(&machine).await;

    let observer = async {
        while machine.state() != OnboardingState::SetupWallet {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            machine.send(OnboardingEvent::Previous).await,
            Err(OnboardingError::InvalidEvent {
                state: OnboardingState::SetupWallet,
                event: "PREVIOUS"
            })
        );
        assert!(!machine.can(&OnboardingEvent::next()));
        assert_eq!(machine.snapshot().state, OnboardingState::SetupWallet);
        setup.release();
    };

    let (outcome, ()) = tokio::join!(machine.send(OnboardingEvent::next()), observer);
    assert_eq!(
        outcome.unwrap().snapshot().map(|s| s.state),
        Some(OnboardingState::FinishOnboarding)
    );
}

#[tokio::test]
async fn failed_setup_can_be_retried_or_abandoned() {
    let setup = Arc::new(GatedSetup::failing());
    let listener = Arc::new(RecordingListener::default());
    let machine = OnboardingMachine::new(
        OnboardingOptions::new(setup.clone()).with_listener(listener.clone()),
    );
    walk_to_summary(&machine).await;
    listener.take();

    setup.release();
    machine.send(OnboardingEvent::next()).await.unwrap();
    assert_eq!(machine.state(), OnboardingState::SetupFailed);
    assert_eq!(machine.setup_error().as_deref(), Some("setup failed"));

    let transitions = listener.take();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[1].prior, OnboardingState::SetupWallet);
    assert_eq!(transitions[1].kind, EventKind::External);

    machine.send(OnboardingEvent::Previous).await.unwrap();
    assert_eq!(machine.state(), OnboardingState::VerifyPersonalDetails);

    setup.release();
    machine.send(OnboardingEvent::next()).await.unwrap();
    machine.send(OnboardingEvent::Decline).await.unwrap();
    assert_eq!(machine.state(), OnboardingState::ShowIntro);
    assert!(machine.context().personal_data.is_none());
}

#[tokio::test]
async fn stopping_during_setup_drops_the_result() {
    let setup = Arc::new(GatedSetup::default());
    let machine = OnboardingMachine::new(
        OnboardingOptions::new(setup.clone()).require_custom_navigation_hook(true),
    );
    walk_to_summary(&machine).await;

    let stopper = async {
        while machine.state() != OnboardingState::SetupWallet {
            tokio::task::yield_now().await;
        }
        machine.stop();
        setup.release();
    };

    let (outcome, ()) = tokio::join!(machine.send(OnboardingEvent::next()), stopper);
    assert_eq!(outcome, Err(OnboardingError::Stopped));
    assert_eq!(machine.state(), OnboardingState::SetupWallet);
}

#[tokio::test]
async fn process_wide_instance() {
    assert!(!instance::has_instance());
    assert_eq!(
        instance::require_existing().unwrap_err(),
        OnboardingError::NoActiveInstance
    );
    instance::stop();

    let store = Arc::new(MemoryCredentialStore::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let options = OnboardingOptions::new(Arc::new(IssuingSetupService::new(
        Arc::new(UnsignedIssuer),
        store.clone(),
    )))
    .with_navigator(navigator.clone());

    let machine = instance::get_or_create(options.clone());
    assert!(Arc::ptr_eq(&machine, &instance::get_or_create(options.clone())));
    assert!(Arc::ptr_eq(&machine, &instance::require_existing().unwrap()));

    machine.send(OnboardingEvent::next()).await.unwrap();
    machine
        .send(OnboardingEvent::SetTermsAccepted(true))
        .await
        .unwrap();

    // A fresh instance starts over with the initial context.
    instance::stop();
    assert!(machine.is_stopped());
    let fresh = instance::get_or_create(options.clone());
    assert_ne!(fresh.id(), machine.id());
    assert_eq!(fresh.state(), OnboardingState::ShowIntro);
    assert!(!fresh.context().terms_accepted);
    assert!(fresh.context().credential_draft.is_some());

    walk_to_summary(&fresh).await;
    fresh.send(OnboardingEvent::next()).await.unwrap();
    assert!(fresh.is_done());

    // The default navigation listener releases the finished instance.
    assert!(!instance::has_instance());
    assert!(*navigator.finished.lock().unwrap());
    assert_eq!(
        *navigator.screens.lock().unwrap(),
        [
            // First instance.
            Screen::TermsOfService,
            Screen::TermsOfService,
            // Fresh instance.
            Screen::TermsOfService,
            Screen::TermsOfService,
            Screen::TermsOfService,
            Screen::PersonalData,
            Screen::PersonalData,
            Screen::PinCodeSet,
            Screen::PinCodeSet,
            Screen::PinCodeVerify,
            Screen::OnboardingSummary,
            Screen::Loading,
        ]
    );

    let stored = store.fetch_all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].decode().unwrap()["credentialSubject"]["emailAddress"],
        "ada@example.com"
    );

    // A machine stopped through its own handle is not handed out again.
    let stopped = instance::get_or_create(options.clone());
    stopped.stop();
    assert!(!instance::has_instance());
    assert_eq!(
        instance::require_existing().unwrap_err(),
        OnboardingError::NoActiveInstance
    );
    let replacement = instance::get_or_create(options);
    assert_ne!(replacement.id(), stopped.id());
    assert!(replacement.send(OnboardingEvent::next()).await.is_ok());
    instance::stop();
}
