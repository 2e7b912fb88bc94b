//! MonitorSupervisor.
//!
//! Owns the transport connection for the whole run. The start sequence is:
//! connect, make sure the session is authorized (interactively if a prompt is
//! attached), resolve the registered sources, subscribe to updates, and spawn
//! the `LiveEventHandler`, `HistoryScanner` and `KeepAlive` tasks.
//!
//! The supervisor then waits for shutdown or for a `TaskFault`:
//! - rate limited: stop the tasks, make no transport call for the mandated
//!   wait, then run the start sequence again;
//! - disconnected: stop the tasks and restart with exponential backoff, giving
//!   up after `MAX_RECONNECT_ATTEMPTS` consecutive failures;
//! - anything else: disconnect and return the error.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::history_scanner::HistoryScanner;
use super::keep_alive::KeepAlive;
use super::live_handler::LiveEventHandler;
use super::pipeline::DetectionPipeline;
use crate::auth::{AuthError, AuthSession, AuthState, CredentialPrompt};
use crate::config::MonitorSettings;
use crate::events::{FaultKind, TaskFault, task_fault_channel};
use crate::registry::SourceRegistry;
use crate::transport::TransportError;

/// Consecutive reconnects allowed before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// A run shorter than this does not reset the reconnect counter.
const STABLE_RUN: Duration = Duration::from_secs(60);

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("session is not authorized, run the login command first")]
    NotAuthorized,

    #[error("authorization failed: {0}")]
    Auth(#[source] AuthError),

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("gave up after {0} reconnect attempts")]
    ReconnectExhausted(u32),

    #[error("monitoring task failed: {0}")]
    Task(String),
}

/// How one run of the start sequence and task set ended.
enum RunOutcome {
    Shutdown,
    RateLimited { seconds: u64 },
    Disconnected,
    Failed(MonitorError),
}

impl RunOutcome {
    fn from_transport(error: TransportError) -> Self {
        match error {
            TransportError::FloodWait { seconds } => RunOutcome::RateLimited { seconds },
            TransportError::Disconnected => RunOutcome::Disconnected,
            other => RunOutcome::Failed(MonitorError::Transport(other)),
        }
    }

    fn from_fault(fault: TaskFault) -> Self {
        match fault.kind {
            FaultKind::RateLimited { seconds } => RunOutcome::RateLimited { seconds },
            FaultKind::StreamClosed => RunOutcome::Disconnected,
            FaultKind::Fatal(e) => RunOutcome::from_transport(e),
        }
    }
}

pub struct MonitorSupervisor {
    session: AuthSession,
    registry: SourceRegistry,
    pipeline: DetectionPipeline,
    settings: MonitorSettings,
    prompt: Option<Arc<dyn CredentialPrompt>>,
}

impl MonitorSupervisor {
    pub fn new(
        session: AuthSession,
        registry: SourceRegistry,
        pipeline: DetectionPipeline,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            session,
            registry,
            pipeline,
            settings,
            prompt: None,
        }
    }

    /// Log in interactively when the stored session is not authorized.
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Monitor until shutdown or a fatal error. Disconnects before returning.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), MonitorError> {
        info!(phone = %self.session.phone(), "MonitorSupervisor started");
        let mut reconnects: u32 = 0;

        let result = loop {
            let started_at = Instant::now();
            match self.run_once(&mut shutdown_rx).await {
                RunOutcome::Shutdown => break Ok(()),
                RunOutcome::RateLimited { seconds } => {
                    warn!(seconds, "Rate limited, suspending all transport calls");
                    let wait = Duration::from_secs(seconds);
                    self.registry.suspend_until(Instant::now() + wait).await;
                    let resumed = self.wait(&mut shutdown_rx, wait).await;
                    self.registry.resume().await;
                    if !resumed {
                        break Ok(());
                    }
                    info!("Rate limit elapsed, restarting");
                }
                RunOutcome::Disconnected => {
                    if started_at.elapsed() >= STABLE_RUN {
                        reconnects = 0;
                    }
                    reconnects += 1;
                    if reconnects > MAX_RECONNECT_ATTEMPTS {
                        break Err(MonitorError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS));
                    }
                    let backoff = reconnect_backoff(reconnects);
                    warn!(attempt = reconnects, backoff_secs = backoff.as_secs(), "Connection lost, reconnecting");
                    if !self.wait(&mut shutdown_rx, backoff).await {
                        break Ok(());
                    }
                }
                RunOutcome::Failed(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            error!(error = %e, details = ?e, phone = %self.session.phone(), "Monitoring stopped on fatal error");
        }
        if let Err(e) = self.session.transport().disconnect().await {
            warn!(error = %e, "Disconnect failed");
        }
        info!("MonitorSupervisor shutdown complete");
        result
    }

    /// Sleep unless shutdown arrives first. Returns `false` on shutdown.
    async fn wait(&self, shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return false;
                    }
                }

                _ = &mut sleep => return true,
            }
        }
    }

    async fn run_once(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> RunOutcome {
        if *shutdown_rx.borrow() {
            return RunOutcome::Shutdown;
        }
        if let Err(outcome) = self.start().await {
            return outcome;
        }

        let transport = self.session.transport().clone();
        let updates = match transport.updates().await {
            Ok(updates) => updates,
            Err(e) => return RunOutcome::from_transport(e),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let (fault_tx, mut fault_rx) = task_fault_channel();
        let tasks: Vec<JoinHandle<()>> = vec![
            tokio::spawn(
                LiveEventHandler::new(self.registry.clone(), self.pipeline.clone(), fault_tx.clone())
                    .run(stop_rx.clone(), updates),
            ),
            tokio::spawn(
                HistoryScanner::new(
                    transport.clone(),
                    self.registry.clone(),
                    self.pipeline.clone(),
                    fault_tx.clone(),
                    self.settings.history_interval,
                    self.settings.history_limit,
                )
                .run(stop_rx.clone()),
            ),
            tokio::spawn(
                KeepAlive::new(transport, fault_tx, self.settings.keep_alive_interval).run(stop_rx),
            ),
        ];

        let outcome = loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break RunOutcome::Shutdown;
                    }
                }

                fault = fault_rx.recv() => break match fault {
                    Some(fault) => {
                        warn!(%fault, "Monitoring task reported a fault");
                        RunOutcome::from_fault(fault)
                    }
                    None => RunOutcome::Failed(MonitorError::Task("all monitoring tasks exited".into())),
                },
            }
        };

        // Abort rather than wait: no task may touch the transport from here on.
        let _ = stop_tx.send(true);
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        outcome
    }

    /// Connect, authorize, and resolve sources.
    async fn start(&mut self) -> Result<(), RunOutcome> {
        let authorized = match self.session.connect().await {
            Ok(AuthState::Authorized(user)) => Some(user.clone()),
            Ok(_) => None,
            Err(e) => return Err(auth_outcome(e)),
        };
        match authorized {
            Some(user) => {
                info!(user_id = user.id, username = ?user.username, "Connected as authorized user");
            }
            None => self.authorize().await?,
        }

        let mut unresolved = 0;
        for (id, result) in self.registry.resolve_pending().await {
            if let Err(e) = result {
                if let Some(seconds) = e.flood_wait() {
                    return Err(RunOutcome::RateLimited { seconds });
                }
                warn!(source = %id, error = %e, "Source left unresolved");
                unresolved += 1;
            }
        }

        let monitored = self.registry.active_resolved().await;
        for source in &monitored {
            info!(
                source = %source.id,
                title = %source.name,
                chat_id = source.entity.id,
                "Monitoring chat"
            );
        }
        if monitored.is_empty() {
            warn!(unresolved, "No resolved sources to monitor");
        } else {
            info!(monitored = monitored.len(), unresolved, "Start sequence complete");
        }
        Ok(())
    }

    async fn authorize(&mut self) -> Result<(), RunOutcome> {
        let Some(prompt) = self.prompt.clone() else {
            return Err(RunOutcome::Failed(MonitorError::NotAuthorized));
        };
        match self.session.authorize_interactively(prompt.as_ref()).await {
            Ok(user) => {
                info!(user_id = user.id, "Interactive login complete");
                Ok(())
            }
            Err(e) => Err(auth_outcome(e)),
        }
    }
}

fn auth_outcome(error: AuthError) -> RunOutcome {
    match error {
        AuthError::Transport(e) => RunOutcome::from_transport(e),
        other => RunOutcome::Failed(MonitorError::Auth(other)),
    }
}

/// `2^attempt` seconds, capped.
fn reconnect_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6)).min(MAX_RECONNECT_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressExtractor;
    use crate::dedup::Deduplicator;
    use crate::events::{DetectionReceiver, detection_channel};
    use crate::registry::MonitoringSource;
    use crate::testing::{MockTransport, PUMP, ScriptedPrompt, message};
    use crate::transport::ChatTransport;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            history_interval: Duration::from_secs(60),
            history_limit: 5,
            keep_alive_interval: Duration::from_secs(300),
            ..MonitorSettings::default()
        }
    }

    async fn supervisor(transport: &Arc<MockTransport>) -> (MonitorSupervisor, DetectionReceiver) {
        transport.add_entity("alpha", -1001, Some("Alpha Calls")).await;
        let registry = SourceRegistry::new(transport.clone());
        registry.add(MonitoringSource::active("alpha")).await.unwrap();
        let (tx, rx) = detection_channel();
        let pipeline = DetectionPipeline::new(
            transport.clone(),
            AddressExtractor::default(),
            Deduplicator::new(),
            tx,
        );
        let session = AuthSession::new(transport.clone(), "+15550001");
        (
            MonitorSupervisor::new(session, registry, pipeline, settings()),
            rx,
        )
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(reconnect_backoff(5), Duration::from_secs(32));
        assert_eq!(reconnect_backoff(30), MAX_RECONNECT_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_without_prompt_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        let (supervisor, _rx) = supervisor(&transport).await;
        let (_tx, shutdown_rx) = watch::channel(false);
        let err = supervisor.run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, MonitorError::NotAuthorized));
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_detection_and_shutdown() {
        let transport = Arc::new(MockTransport::new());
        transport.set_authorized(true);
        let (supervisor, mut detections) = supervisor(&transport).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        transport.wait_for_subscriber().await;
        transport.push_update(message(-1001, 1, PUMP)).await;
        let detection = detections.recv().await.unwrap();
        assert!(detection.delivery.is_live());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactive_login_when_unauthorized() {
        let transport = Arc::new(MockTransport::new());
        transport.set_login("12345", None);
        let (supervisor, _rx) = supervisor(&transport).await;
        let supervisor = supervisor.with_prompt(Arc::new(ScriptedPrompt::new("12345", "")));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        transport.wait_for_subscriber().await;
        assert_eq!(transport.call_count("sign_in"), 1);
        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_suspends_transport_calls() {
        let transport = Arc::new(MockTransport::new());
        transport.set_authorized(true);
        transport
            .fail_history(-1001, TransportError::FloodWait { seconds: 30 })
            .await;
        let (supervisor, _rx) = supervisor(&transport).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(100)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let calls = transport.calls();
        let (flood_index, flood_at) = calls
            .iter()
            .enumerate()
            .find(|(_, (name, _))| *name == "recent_messages")
            .map(|(i, (_, at))| (i, *at))
            .unwrap();
        let after = &calls[flood_index + 1..];
        assert!(!after.is_empty(), "the run loop resumed");
        for (name, at) in after {
            assert!(
                *at >= flood_at + Duration::from_secs(30),
                "{name} called {:?} after the rate limit",
                *at - flood_at
            );
        }
        // Resumed: history was scanned again after the wait.
        assert!(transport.call_count("recent_messages") >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_added_during_rate_limit_waits_for_it() {
        let transport = Arc::new(MockTransport::new());
        transport.set_authorized(true);
        transport
            .fail_history(-1001, TransportError::FloodWait { seconds: 30 })
            .await;
        transport.add_entity("beta", -1002, None).await;
        let (supervisor, _rx) = supervisor(&transport).await;
        let registry = supervisor.registry.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(shutdown_rx));

        while transport.call_count("recent_messages") == 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.is_suspended().await);

        // A reload lands in the middle of the wait.
        assert!(registry.add(MonitoringSource::active("beta")).await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(60)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let calls = transport.calls();
        let flood_at = calls
            .iter()
            .find(|(name, _)| *name == "recent_messages")
            .map(|(_, at)| *at)
            .unwrap();
        let resolutions: Vec<_> = calls
            .iter()
            .filter(|(name, at)| *name == "resolve_entity" && *at > flood_at)
            .collect();
        assert!(!resolutions.is_empty(), "beta was resolved after the wait");
        for (_, at) in resolutions {
            assert!(*at >= flood_at + Duration::from_secs(30));
        }
        assert!(registry.lookup_by_chat(-1002).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_close_reconnects_then_gives_up() {
        let transport = Arc::new(MockTransport::new());
        transport.set_authorized(true);
        transport.close_updates_on_subscribe(true);
        let (supervisor, _rx) = supervisor(&transport).await;
        let (_tx, shutdown_rx) = watch::channel(false);

        let err = supervisor.run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, MonitorError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS)));
        assert_eq!(transport.call_count("updates"), MAX_RECONNECT_ATTEMPTS as usize + 1);
    }
}
