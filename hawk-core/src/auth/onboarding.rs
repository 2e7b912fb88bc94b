use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use hawk_sdk::objects::{ConnectApiRequest, ConnectApiResponse, UserProfile, VerifyCodeResponse};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::session::{AuthSession, AuthState};
use crate::transport::{ApiCredentials, ChatTransport, TransportFactory};

/// Session label of an onboarding request.
pub fn session_label(user_id: &str, unix_seconds: i64) -> String {
    format!("user_{user_id}_{unix_seconds}")
}

enum LoginStart {
    CodeSent(String),
    AlreadyAuthorized(UserProfile),
}

async fn start_login(session: &mut AuthSession) -> Result<LoginStart, super::AuthError> {
    if let AuthState::Authorized(user) = session.connect().await? {
        return Ok(LoginStart::AlreadyAuthorized(user.clone()));
    }
    Ok(LoginStart::CodeSent(session.request_code().await?))
}

/// A login in progress, keyed by external user id.
struct AuthRequest {
    session: AuthSession,
    session_label: String,
}

/// An account that completed onboarding.
pub struct AuthorizedAccount {
    pub user: UserProfile,
    pub session_label: String,
    pub transport: Arc<dyn ChatTransport>,
}

/// Programmatic two-call login for additional accounts.
///
/// At most one pending request exists per user id; a new `connect_api` for the
/// same id discards (and disconnects) the previous one, even when it fails.
pub struct AccountOnboarding {
    factory: Arc<dyn TransportFactory>,
    pending: Mutex<HashMap<String, AuthRequest>>,
    authorized: Mutex<HashMap<String, AuthorizedAccount>>,
}

impl AccountOnboarding {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            pending: Mutex::new(HashMap::new()),
            authorized: Mutex::new(HashMap::new()),
        }
    }

    /// Start a login: create a transport, connect, and request a code.
    pub async fn connect_api(&self, request: ConnectApiRequest) -> ConnectApiResponse {
        let ConnectApiRequest {
            api_id,
            api_hash,
            phone_number,
            user_id,
        } = request;
        // The new request supersedes the old one whether or not it succeeds.
        let previous = self.pending.lock().await.remove(&user_id);
        if let Some(previous) = previous {
            info!(user_id = %user_id, session = %previous.session_label, "Replacing pending login request");
            let _ = previous.session.transport().disconnect().await;
        }

        let label = session_label(&user_id, time::OffsetDateTime::now_utc().unix_timestamp());
        let credentials = ApiCredentials { api_id, api_hash };

        let transport = match self.factory.create(&credentials, &label).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(user_id = %user_id, phone = %phone_number, error = %e, "Failed to create transport");
                return ConnectApiResponse::failed(format!("Failed to connect: {e}"));
            }
        };
        let mut session = AuthSession::new(transport.clone(), phone_number.clone());

        match start_login(&mut session).await {
            Ok(LoginStart::CodeSent(phone_code_hash)) => {
                let replaced = self.pending.lock().await.insert(
                    user_id.clone(),
                    AuthRequest {
                        session,
                        session_label: label.clone(),
                    },
                );
                if let Some(concurrent) = replaced {
                    let _ = concurrent.session.transport().disconnect().await;
                }
                info!(user_id = %user_id, phone = %phone_number, session = %label, "Login code sent");
                ConnectApiResponse::code_sent(phone_code_hash)
            }
            Ok(LoginStart::AlreadyAuthorized(user)) => {
                self.store_authorized(user_id, user, label, transport).await;
                ConnectApiResponse::already_authorized()
            }
            Err(e) => {
                warn!(user_id = %user_id, phone = %phone_number, error = %e, "Failed to start login");
                let _ = transport.disconnect().await;
                ConnectApiResponse::failed(format!("Failed to connect: {e}"))
            }
        }
    }

    /// Submit the login code of the pending request of `user_id`.
    pub async fn verify_code(&self, user_id: &str, code: &str) -> VerifyCodeResponse {
        let Some(mut request) = self.pending.lock().await.remove(user_id) else {
            return VerifyCodeResponse::failed("No active connection request found");
        };

        let outcome = request.session.submit_code(code).await.map(|state| match state {
            AuthState::Authorized(user) => Some(user.clone()),
            _ => None,
        });
        match outcome {
            Ok(Some(user)) => {
                self.complete(user_id, request, user.clone()).await;
                VerifyCodeResponse::connected(user)
            }
            Ok(None) => {
                self.keep_pending(user_id, request).await;
                VerifyCodeResponse::password_required()
            }
            Err(e) => {
                let _ = request.session.transport().disconnect().await;
                VerifyCodeResponse::failed(e.to_string())
            }
        }
    }

    /// Complete two-step verification of the pending request of `user_id`.
    pub async fn verify_password(&self, user_id: &str, password: &str) -> VerifyCodeResponse {
        let mut pending = self.pending.lock().await;
        let waiting = pending
            .get(user_id)
            .is_some_and(|r| r.session.state() == &AuthState::PasswordRequired);
        let request = if waiting { pending.remove(user_id) } else { None };
        drop(pending);

        let Some(mut request) = request else {
            return VerifyCodeResponse::failed("No pending two-step verification found");
        };

        match request.session.submit_password(password).await {
            Ok(user) => {
                self.complete(user_id, request, user.clone()).await;
                VerifyCodeResponse::connected(user)
            }
            Err(e) => {
                let _ = request.session.transport().disconnect().await;
                VerifyCodeResponse::failed(e.to_string())
            }
        }
    }

    /// Hand over the transport of an onboarded account.
    pub async fn take_authorized(&self, user_id: &str) -> Option<AuthorizedAccount> {
        self.authorized.lock().await.remove(user_id)
    }

    pub async fn has_pending(&self, user_id: &str) -> bool {
        self.pending.lock().await.contains_key(user_id)
    }

    async fn keep_pending(&self, user_id: &str, request: AuthRequest) {
        let mut pending = self.pending.lock().await;
        match pending.entry(user_id.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(request);
            }
            Entry::Occupied(_) => {
                // A newer request arrived while this one was in flight.
                drop(pending);
                let _ = request.session.transport().disconnect().await;
            }
        }
    }

    async fn complete(&self, user_id: &str, request: AuthRequest, user: UserProfile) {
        let transport = request.session.transport().clone();
        self.store_authorized(user_id.to_owned(), user, request.session_label, transport)
            .await;
    }

    async fn store_authorized(
        &self,
        user_id: String,
        user: UserProfile,
        session_label: String,
        transport: Arc<dyn ChatTransport>,
    ) {
        info!(user_id = %user_id, account = user.id, session = %session_label, "Account onboarded");
        let account = AuthorizedAccount {
            user,
            session_label,
            transport,
        };
        if let Some(previous) = self.authorized.lock().await.insert(user_id, account) {
            let _ = previous.transport.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransportFactory;

    fn request(user_id: &str) -> ConnectApiRequest {
        ConnectApiRequest {
            api_id: 1,
            api_hash: "hash".into(),
            phone_number: "+15550002".into(),
            user_id: user_id.into(),
        }
    }

    #[test]
    fn test_session_label() {
        assert_eq!(session_label("42", 1700000000), "user_42_1700000000");
    }

    #[tokio::test]
    async fn test_code_flow_without_two_step() {
        let factory = Arc::new(MockTransportFactory::new("12345", None));
        let onboarding = AccountOnboarding::new(factory.clone());

        let resp = onboarding.connect_api(request("42")).await;
        assert!(resp.success, "{}", resp.message);
        assert!(resp.phone_code_hash.is_some());
        assert!(factory.labels().await[0].starts_with("user_42_"));

        let verified = onboarding.verify_code("42", "12345").await;
        assert!(verified.success);
        assert!(verified.user.is_some());
        assert!(!onboarding.has_pending("42").await);
        assert!(onboarding.take_authorized("42").await.is_some());
    }

    #[tokio::test]
    async fn test_two_step_flow() {
        let factory = Arc::new(MockTransportFactory::new("12345", Some("hunter2")));
        let onboarding = AccountOnboarding::new(factory);

        onboarding.connect_api(request("7")).await;
        let resp = onboarding.verify_code("7", "12345").await;
        assert!(!resp.success);
        assert!(resp.password_required);
        assert_eq!(resp.message, "Two-step verification required");
        assert!(onboarding.has_pending("7").await);

        let resp = onboarding.verify_password("7", "hunter2").await;
        assert!(resp.success);
        assert!(!onboarding.has_pending("7").await);
    }

    #[tokio::test]
    async fn test_missing_request_and_wrong_code() {
        let factory = Arc::new(MockTransportFactory::new("12345", None));
        let onboarding = AccountOnboarding::new(factory);

        let resp = onboarding.verify_code("nobody", "12345").await;
        assert!(!resp.success);
        assert_eq!(resp.message, "No active connection request found");

        onboarding.connect_api(request("9")).await;
        let resp = onboarding.verify_code("9", "99999").await;
        assert!(!resp.success);
        // Discarded: must start over.
        assert!(!onboarding.has_pending("9").await);
        assert!(!onboarding.verify_password("9", "x").await.success);
    }

    #[tokio::test]
    async fn test_new_request_replaces_pending_one() {
        let factory = Arc::new(MockTransportFactory::new("12345", None));
        let onboarding = AccountOnboarding::new(factory.clone());

        onboarding.connect_api(request("5")).await;
        onboarding.connect_api(request("5")).await;

        let transports = factory.transports().await;
        assert_eq!(transports.len(), 2);
        assert!(!transports[0].is_connected());
        assert!(transports[1].is_connected());
        assert!(onboarding.verify_code("5", "12345").await.success);
    }

    #[tokio::test]
    async fn test_failed_request_still_discards_pending_one() {
        let factory = Arc::new(MockTransportFactory::new("12345", None));
        let onboarding = AccountOnboarding::new(factory.clone());

        assert!(onboarding.connect_api(request("5")).await.success);
        factory.fail_next_create();
        let resp = onboarding.connect_api(request("5")).await;
        assert!(!resp.success);

        assert!(!onboarding.has_pending("5").await);
        assert!(!factory.transports().await[0].is_connected());
        assert!(!onboarding.verify_code("5", "12345").await.success);
    }
}
