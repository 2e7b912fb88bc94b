//! Application state shared across all request handlers.

use std::sync::Arc;

use hawk_core::auth::AccountOnboarding;
use hawk_core::events::NotificationSender;
use hawk_sdk::config::ObserverSecret;
use sqlx::PgPool;
use tokio::sync::{RwLock, watch};

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Admin secret hash (can be reloaded via SIGHUP).
    pub admin: Arc<RwLock<ObserverSecret>>,
    /// Observer hub the dispatcher publishes detections on.
    pub notifications: NotificationSender,
    pub onboarding: Arc<AccountOnboarding>,
    /// Flips to `true` once shutdown begins; open WebSockets close on it.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        admin: ObserverSecret,
        notifications: NotificationSender,
        onboarding: AccountOnboarding,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            admin: Arc::new(RwLock::new(admin)),
            notifications,
            onboarding: Arc::new(onboarding),
            shutdown,
        }
    }
}
