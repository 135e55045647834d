//! Onboarding workflow and credential presentation engines for an SSI wallet.
//!
//! # Onboarding
//!
//! [`OnboardingMachine`] sequences the signup flow: agreements, personal details, PIN
//! entry and confirmation, then an asynchronous wallet setup. Every step is guarded, so
//! the user cannot move on with missing or invalid input.
//!
//! ```ignore
//! use wallet_flows::onboarding::{instance, OnboardingEvent, OnboardingOptions};
//!
//! let machine = instance::get_or_create(
//!     OnboardingOptions::new(setup_service).with_navigator(navigator),
//! );
//!
//! machine.send(OnboardingEvent::next()).await?;
//! machine
//!     .send_all([
//!         OnboardingEvent::SetTermsAccepted(true),
//!         OnboardingEvent::SetPrivacyAccepted(true),
//!         OnboardingEvent::next(),
//!     ])
//!     .await?;
//! ```
//!
//! Transitions are reported to a [`TransitionListener`]. Without one, the default
//! [`NavigationListener`] drives the host's [`Navigator`].
//!
//! [`OnboardingMachine`]: crate::onboarding::OnboardingMachine
//! [`TransitionListener`]: crate::onboarding::TransitionListener
//! [`NavigationListener`]: crate::onboarding::NavigationListener
//! [`Navigator`]: crate::onboarding::Navigator
//!
//! # Presentation
//!
//! Given a DIF Presentation Exchange [`PresentationDefinition`], the
//! [`presentation_exchange`] module finds the held credentials satisfying each input
//! descriptor, and a [`SelectionTracker`] follows the user's picks until the selection
//! satisfies the whole request.
//!
//! ```ignore
//! use wallet_flows::selection::SelectionTracker;
//!
//! let mut tracker =
//!     SelectionTracker::for_request(&store, definition, &config.presentation).await?;
//! tracker.set_selection("identity", &[hash])?;
//!
//! if tracker.is_complete() {
//!     let credentials = tracker.selected_credentials();
//! }
//! ```
//!
//! [`PresentationDefinition`]: crate::core::presentation_definition::PresentationDefinition
//! [`SelectionTracker`]: crate::selection::SelectionTracker
//!
//! # Verification
//!
//! [`verify_credential`] turns the output of a credential verifier into a single
//! [`VerificationResult`], whatever shape the verifier answered with.
//!
//! [`verify_credential`]: crate::verification::verify_credential
//! [`VerificationResult`]: crate::verification::VerificationResult

pub mod config;
pub mod core;
pub mod onboarding;
pub mod presentation_exchange;
pub mod selection;
pub mod store;
pub mod utils;
pub mod verification;

pub use serde_json_path::JsonPath;
