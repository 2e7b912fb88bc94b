//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hawk_sdk::objects::UserProfile;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::action::{ActionError, TradeAction};
use crate::auth::{AuthError, CredentialPrompt};
use crate::entities::discovered_contract::UpsertOutcome;
use crate::entities::{ContractStatus, DiscoveredContract, to_primitive_utc};
use crate::events::{DEFAULT_CHANNEL_BUFFER, Detection};
use crate::message::IncomingMessage;
use crate::store::{DiscoveryStore, StoreError};
use crate::transport::{
    ApiCredentials, ChatEntity, ChatTransport, SignInOutcome, TransportError, TransportFactory,
    UpdateStream,
};

pub const PUMP: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const ME_ID: i64 = 777;

pub fn message(chat_id: i64, id: i32, text: &str) -> IncomingMessage {
    IncomingMessage {
        id,
        chat_id,
        sender_id: None,
        text: text.to_owned(),
        media: None,
        entities: Vec::new(),
        forward: None,
        date: 1_700_000_000 + i64::from(id),
    }
}

fn me() -> UserProfile {
    UserProfile {
        id: ME_ID,
        username: Some("hawk".into()),
        first_name: Some("Token".into()),
        last_name: None,
    }
}

#[derive(Default)]
struct Login {
    code: String,
    password: Option<String>,
}

/// Scripted [`ChatTransport`] that records every network call with its instant.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    authorized: AtomicBool,
    close_on_subscribe: AtomicBool,
    codes_sent: AtomicU32,
    login: Mutex<Login>,
    entities: Mutex<HashMap<String, ChatEntity>>,
    messages: Mutex<HashMap<i64, Vec<IncomingMessage>>>,
    history_failures: Mutex<HashMap<i64, TransportError>>,
    ping_failure: Mutex<Option<TransportError>>,
    updates_tx: Mutex<Option<mpsc::Sender<Result<IncomingMessage, TransportError>>>>,
    calls: Mutex<Vec<(&'static str, Instant)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push((name, Instant::now()));
    }

    pub fn calls(&self) -> Vec<(&'static str, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(n, _)| *n == name).count()
    }

    pub fn set_login(&self, code: &str, password: Option<&str>) {
        *self.login.lock().unwrap() = Login {
            code: code.to_owned(),
            password: password.map(str::to_owned),
        };
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub fn close_updates_on_subscribe(&self, close: bool) {
        self.close_on_subscribe.store(close, Ordering::SeqCst);
    }

    pub async fn add_entity(&self, handle: &str, chat_id: i64, title: Option<&str>) {
        self.entities.lock().unwrap().insert(
            handle.to_owned(),
            ChatEntity {
                id: chat_id,
                title: title.map(str::to_owned),
                username: Some(handle.to_owned()),
            },
        );
    }

    /// Store a message for history and single-message lookups.
    pub async fn put_message(&self, message: IncomingMessage) {
        self.messages
            .lock()
            .unwrap()
            .entry(message.chat_id)
            .or_default()
            .push(message);
    }

    /// Make the next history fetch of `chat_id` fail.
    pub async fn fail_history(&self, chat_id: i64, error: TransportError) {
        self.history_failures.lock().unwrap().insert(chat_id, error);
    }

    pub fn fail_next_ping(&self, error: TransportError) {
        *self.ping_failure.lock().unwrap() = Some(error);
    }

    pub async fn push_update(&self, message: IncomingMessage) {
        let tx = self.updates_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(Ok(message)).await.unwrap();
        }
    }

    pub async fn close_updates(&self) {
        self.updates_tx.lock().unwrap().take();
    }

    pub async fn wait_for_subscriber(&self) {
        loop {
            let subscribed = self.updates_tx.lock().unwrap().is_some();
            if subscribed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record("connect");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.record("disconnect");
        self.connected.store(false, Ordering::SeqCst);
        self.updates_tx.lock().unwrap().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        self.record("is_authorized");
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn send_code(&self, _phone: &str) -> Result<String, TransportError> {
        self.record("send_code");
        let n = self.codes_sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("hash-{n}"))
    }

    async fn sign_in(
        &self,
        _phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, TransportError> {
        self.record("sign_in");
        let login = self.login.lock().unwrap();
        if !phone_code_hash.starts_with("hash-") || code != login.code {
            return Err(TransportError::InvalidCode);
        }
        if login.password.is_some() {
            return Ok(SignInOutcome::PasswordRequired);
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(SignInOutcome::Authorized(me()))
    }

    async fn check_password(&self, password: &str) -> Result<UserProfile, TransportError> {
        self.record("check_password");
        if self.login.lock().unwrap().password.as_deref() != Some(password) {
            return Err(TransportError::InvalidPassword);
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(me())
    }

    async fn get_me(&self) -> Result<UserProfile, TransportError> {
        self.record("get_me");
        Ok(me())
    }

    async fn updates(&self) -> Result<UpdateStream, TransportError> {
        self.record("updates");
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        if !self.close_on_subscribe.load(Ordering::SeqCst) {
            *self.updates_tx.lock().unwrap() = Some(tx);
        }
        Ok(rx)
    }

    async fn resolve_entity(&self, handle: &str) -> Result<ChatEntity, TransportError> {
        self.record("resolve_entity");
        self.entities
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| TransportError::InvalidHandle(handle.to_owned()))
    }

    async fn recent_messages(
        &self,
        entity: &ChatEntity,
        limit: u32,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        self.record("recent_messages");
        if let Some(error) = self.history_failures.lock().unwrap().remove(&entity.id) {
            return Err(error);
        }
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(&entity.id)
            .map(|all| all.iter().rev().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_message(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Option<IncomingMessage>, TransportError> {
        self.record("get_message");
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&chat_id)
            .and_then(|all| all.iter().find(|m| m.id == message_id).cloned()))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.record("ping");
        match self.ping_failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Hands out [`MockTransport`]s sharing one login script.
pub struct MockTransportFactory {
    code: String,
    password: Option<String>,
    fail_next: AtomicBool,
    created: tokio::sync::Mutex<Vec<(String, Arc<MockTransport>)>>,
}

impl MockTransportFactory {
    pub fn new(code: &str, password: Option<&str>) -> Self {
        Self {
            code: code.to_owned(),
            password: password.map(str::to_owned),
            fail_next: AtomicBool::new(false),
            created: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn labels(&self) -> Vec<String> {
        self.created.lock().await.iter().map(|(l, _)| l.clone()).collect()
    }

    pub async fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        _credentials: &ApiCredentials,
        session_label: &str,
    ) -> Result<Arc<dyn ChatTransport>, TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        let transport = Arc::new(MockTransport::new());
        transport.set_login(&self.code, self.password.as_deref());
        self.created
            .lock()
            .await
            .push((session_label.to_owned(), transport.clone()));
        Ok(transport)
    }
}

pub struct ScriptedPrompt {
    code: String,
    password: String,
}

impl ScriptedPrompt {
    pub fn new(code: &str, password: &str) -> Self {
        Self {
            code: code.to_owned(),
            password: password.to_owned(),
        }
    }
}

#[async_trait]
impl CredentialPrompt for ScriptedPrompt {
    async fn code(&self, _phone: &str) -> Result<String, AuthError> {
        Ok(self.code.clone())
    }

    async fn password(&self, _phone: &str) -> Result<String, AuthError> {
        Ok(self.password.clone())
    }
}

/// [`DiscoveryStore`] over a map.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DiscoveredContract>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn status(&self, address: &str) -> Option<ContractStatus> {
        self.records.lock().unwrap().get(address).map(|r| r.status)
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn upsert(&self, detection: &Detection) -> Result<UpsertOutcome, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock().unwrap();
        let next_id = records.len() as i64 + 1;
        let mut inserted = false;
        let record = records
            .entry(detection.address.to_string())
            .or_insert_with(|| {
                inserted = true;
                DiscoveredContract {
                    id: next_id,
                    address: detection.address.to_string(),
                    source_name: detection.source_name.clone(),
                    status: ContractStatus::Found,
                    discovered_at: to_primitive_utc(detection.detected_at),
                }
            })
            .clone();
        Ok(UpsertOutcome { record, inserted })
    }

    async fn set_status(&self, address: &str, status: ContractStatus) -> Result<(), StoreError> {
        match self.records.lock().unwrap().get_mut(address) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(address.to_owned())),
        }
    }
}

/// [`TradeAction`] that remembers the addresses it was called with.
#[derive(Default)]
pub struct RecordingAction {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeAction for RecordingAction {
    async fn execute(&self, detection: &Detection) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(detection.address.to_string());
        if self.fail {
            return Err(ActionError::Rejected {
                status: 503,
                body: "exchange unavailable".into(),
            });
        }
        Ok(())
    }
}
