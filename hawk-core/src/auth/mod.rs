//! Account authorization.
//!
//! [`AuthSession`] is the login state machine of one transport. Two entry
//! points drive it: [`AuthSession::authorize_interactively`] for an operator
//! at a console, and [`AccountOnboarding`] for the non-blocking two-call
//! handshake used to add accounts by external user id.

mod onboarding;
mod session;

pub use onboarding::{AccountOnboarding, AuthorizedAccount, session_label};
pub use session::{AuthError, AuthSession, AuthState, CredentialPrompt};
