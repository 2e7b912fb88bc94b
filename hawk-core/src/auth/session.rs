use std::sync::Arc;

use async_trait::async_trait;
use hawk_sdk::objects::UserProfile;
use thiserror::Error;
use tracing::{info, warn};

use crate::transport::{ChatTransport, SignInOutcome, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CodeRequested { phone_code_hash: String },
    PasswordRequired,
    Authorized(UserProfile),
    /// Terminal. A new attempt has to start from [`AuthSession::request_code`].
    Failed(String),
}

impl AuthState {
    fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::CodeRequested { .. } => "code_requested",
            AuthState::PasswordRequired => "password_required",
            AuthState::Authorized(_) => "authorized",
            AuthState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("invalid code")]
    InvalidCode,

    #[error("invalid password")]
    InvalidPassword,

    #[error("failed to read credentials: {0}")]
    Prompt(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AuthError {
    pub fn flood_wait(&self) -> Option<u64> {
        match self {
            AuthError::Transport(e) => e.flood_wait(),
            _ => None,
        }
    }
}

/// Source of login credentials for the interactive flow.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn code(&self, phone: &str) -> Result<String, AuthError>;

    async fn password(&self, phone: &str) -> Result<String, AuthError>;
}

/// Login state machine bound to one transport and phone number.
pub struct AuthSession {
    transport: Arc<dyn ChatTransport>,
    phone: String,
    state: AuthState,
}

impl AuthSession {
    pub fn new(transport: Arc<dyn ChatTransport>, phone: impl Into<String>) -> Self {
        Self {
            transport,
            phone: phone.into(),
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self.state, AuthState::Authorized(_))
    }

    /// Connect and check whether the stored session is already logged in.
    pub async fn connect(&mut self) -> Result<&AuthState, AuthError> {
        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }
        if self.transport.is_authorized().await? {
            let me = self.transport.get_me().await?;
            info!(phone = %self.phone, user_id = me.id, "Session already authorized");
            self.state = AuthState::Authorized(me);
        } else if !matches!(
            self.state,
            AuthState::CodeRequested { .. } | AuthState::PasswordRequired
        ) {
            if self.is_authorized() {
                warn!(phone = %self.phone, "Session is no longer authorized");
            }
            self.state = AuthState::Unauthenticated;
        }
        Ok(&self.state)
    }

    /// Ask the network to send a login code. Returns the code hash.
    pub async fn request_code(&mut self) -> Result<String, AuthError> {
        match self.state {
            AuthState::Unauthenticated | AuthState::Failed(_) => {}
            ref other => {
                return Err(AuthError::InvalidState {
                    action: "request a code",
                    state: other.name(),
                });
            }
        }
        let phone_code_hash = self.transport.send_code(&self.phone).await?;
        info!(phone = %self.phone, "Login code requested");
        self.state = AuthState::CodeRequested {
            phone_code_hash: phone_code_hash.clone(),
        };
        Ok(phone_code_hash)
    }

    /// Submit the login code. Ends in `Authorized` or `PasswordRequired`.
    pub async fn submit_code(&mut self, code: &str) -> Result<&AuthState, AuthError> {
        let AuthState::CodeRequested { phone_code_hash } = &self.state else {
            return Err(AuthError::InvalidState {
                action: "submit a code",
                state: self.state.name(),
            });
        };
        let outcome = self
            .transport
            .sign_in(&self.phone, code.trim(), phone_code_hash)
            .await;

        self.state = match outcome {
            Ok(SignInOutcome::Authorized(user)) => {
                info!(phone = %self.phone, user_id = user.id, "Signed in");
                AuthState::Authorized(user)
            }
            Ok(SignInOutcome::PasswordRequired) => {
                info!(phone = %self.phone, "Two-step verification required");
                AuthState::PasswordRequired
            }
            Err(e) => return Err(self.fail(e, AuthError::InvalidCode)),
        };
        Ok(&self.state)
    }

    /// Complete two-step verification.
    pub async fn submit_password(&mut self, password: &str) -> Result<UserProfile, AuthError> {
        if self.state != AuthState::PasswordRequired {
            return Err(AuthError::InvalidState {
                action: "submit a password",
                state: self.state.name(),
            });
        }
        match self.transport.check_password(password).await {
            Ok(user) => {
                info!(phone = %self.phone, user_id = user.id, "Signed in with password");
                self.state = AuthState::Authorized(user.clone());
                Ok(user)
            }
            Err(e) => Err(self.fail(e, AuthError::InvalidPassword)),
        }
    }

    fn fail(&mut self, error: TransportError, rejected: AuthError) -> AuthError {
        let error = match error {
            TransportError::InvalidCode | TransportError::InvalidPassword => rejected,
            other => AuthError::Transport(other),
        };
        warn!(phone = %self.phone, error = %error, "Authorization failed");
        self.state = AuthState::Failed(error.to_string());
        error
    }

    /// Run the whole login with a human at the other end.
    pub async fn authorize_interactively(
        &mut self,
        prompt: &dyn CredentialPrompt,
    ) -> Result<UserProfile, AuthError> {
        if let AuthState::Authorized(user) = self.connect().await? {
            return Ok(user.clone());
        }

        self.request_code().await?;
        let code = prompt.code(&self.phone).await?;
        if let AuthState::Authorized(user) = self.submit_code(&code).await? {
            return Ok(user.clone());
        }

        let password = prompt.password(&self.phone).await?;
        self.submit_password(&password).await
    }
}
