//! In-memory fakes for every collaborator of the registration handler.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use muster_registration::bpickle::{dumps, Value};
use muster_registration::{
    CloudMetadataResolver, Collaborators, ConfigStore, EndpointSink, EventSink, Exchanger,
    FetchError, Identity, MemoryIdentityStore, MessageStore, MetadataFetcher, OutboundMessage,
    RegistrationEvent, RegistrationHandler, RegistrationResult, SharedIdentity,
    METADATA_API_BASE,
};

pub const HOSTNAME: &str = "ooga";

#[derive(Default)]
pub struct FakeMessageStore {
    accepted: Mutex<HashSet<String>>,
    messages: Mutex<Vec<serde_json::Value>>,
}

impl FakeMessageStore {
    pub fn set_accepted_types(&self, types: &[&str]) {
        *self.accepted.lock().unwrap() = types.iter().map(|t| t.to_string()).collect();
    }

    pub fn accept(&self, message_type: &str) {
        self.accepted
            .lock()
            .unwrap()
            .insert(message_type.to_string());
    }

    /// Queue an arbitrary record, as other broker plugins would.
    pub fn push_raw(&self, message: serde_json::Value) {
        self.messages.lock().unwrap().push(message);
    }
}

impl MessageStore for FakeMessageStore {
    fn add(&self, message: &OutboundMessage) -> RegistrationResult<()> {
        let value = serde_json::to_value(message).unwrap();
        self.messages.lock().unwrap().push(value);
        Ok(())
    }

    fn reset(&self) -> RegistrationResult<()> {
        self.messages.lock().unwrap().clear();
        Ok(())
    }

    fn accepted_types(&self) -> HashSet<String> {
        self.accepted.lock().unwrap().clone()
    }

    fn pending_messages(&self) -> Vec<serde_json::Value> {
        self.messages.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct CountingExchanger {
    calls: AtomicUsize,
}

impl CountingExchanger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Exchanger for CountingExchanger {
    fn exchange(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    fired: Mutex<Vec<RegistrationEvent>>,
}

impl RecordingEvents {
    pub fn fired(&self) -> Vec<RegistrationEvent> {
        self.fired.lock().unwrap().clone()
    }

    pub fn count(&self, event: RegistrationEvent) -> usize {
        self.fired().iter().filter(|e| **e == event).count()
    }
}

impl EventSink for RecordingEvents {
    fn fire(&self, event: RegistrationEvent) {
        self.fired.lock().unwrap().push(event);
    }
}

/// Stands in for both the live transport/pinger URLs and persisted config.
#[derive(Default)]
pub struct RecordingUrls {
    pub exchange_url: Mutex<Option<String>>,
    pub ping_url: Mutex<Option<String>>,
}

impl RecordingUrls {
    pub fn exchange_url(&self) -> Option<String> {
        self.exchange_url.lock().unwrap().clone()
    }

    pub fn ping_url(&self) -> Option<String> {
        self.ping_url.lock().unwrap().clone()
    }
}

impl EndpointSink for RecordingUrls {
    fn set_exchange_url(&self, url: &str) {
        *self.exchange_url.lock().unwrap() = Some(url.to_string());
    }

    fn set_ping_url(&self, url: &str) {
        *self.ping_url.lock().unwrap() = Some(url.to_string());
    }
}

impl ConfigStore for RecordingUrls {
    fn set_exchange_url(&self, url: &str) -> RegistrationResult<()> {
        *self.exchange_url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    fn set_ping_url(&self, url: &str) -> RegistrationResult<()> {
        *self.ping_url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }
}

/// Metadata service keyed by path below [`METADATA_API_BASE`].
pub struct StubFetcher {
    responses: HashMap<String, Result<String, FetchError>>,
}

impl StubFetcher {
    /// A healthy instance with a single OTP at launch index 0.
    pub fn healthy() -> Self {
        Self::with_user_data(user_data(&["otp1"]))
    }

    pub fn with_user_data(user_data: Result<String, FetchError>) -> Self {
        let mut responses = HashMap::new();
        responses.insert("/user-data".to_string(), user_data);
        for (path, value) in [
            ("/meta-data/instance-id", "key1"),
            ("/meta-data/reservation-id", "res1"),
            ("/meta-data/local-hostname", "ooga.local"),
            ("/meta-data/public-hostname", "ooga.amazon.com"),
            ("/meta-data/ami-launch-index", "0"),
            ("/meta-data/kernel-id", "kernel1"),
            ("/meta-data/ramdisk-id", "ram1"),
            ("/meta-data/ami-id", "image1"),
        ] {
            responses.insert(path.to_string(), Ok(value.to_string()));
        }
        Self { responses }
    }

    pub fn set(mut self, path: &str, value: &str) -> Self {
        self.responses
            .insert(path.to_string(), Ok(value.to_string()));
        self
    }

    pub fn fail(mut self, path: &str, error: FetchError) -> Self {
        self.responses.insert(path.to_string(), Err(error));
        self
    }

    /// Every document fails with the same error.
    pub fn unreachable(error: FetchError) -> Self {
        let mut stub = Self::healthy();
        for value in stub.responses.values_mut() {
            *value = Err(error.clone());
        }
        stub
    }
}

#[async_trait]
impl MetadataFetcher for StubFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = url.strip_prefix(METADATA_API_BASE).unwrap_or(url);
        self.responses
            .get(path)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound { url: url.to_string() }))
            .map(String::into_bytes)
    }
}

pub fn user_data(otps: &[&str]) -> Result<String, FetchError> {
    Ok(encode(&Value::dict([
        ("otps", Value::str_list(otps.iter().copied())),
        (
            "exchange-url",
            Value::from("https://example.com/message-system"),
        ),
        ("ping-url", Value::from("http://example.com/ping")),
    ])))
}

pub fn encode(value: &Value) -> String {
    String::from_utf8(dumps(value)).unwrap()
}

pub fn not_found(path: &str) -> FetchError {
    FetchError::NotFound {
        url: format!("{}{}", METADATA_API_BASE, path),
    }
}

/// Wires fakes together the way a broker service would.
pub struct Harness {
    pub identity: SharedIdentity,
    pub store: Arc<FakeMessageStore>,
    pub exchanger: Arc<CountingExchanger>,
    pub events: Arc<RecordingEvents>,
    pub endpoints: Arc<RecordingUrls>,
    pub config: Arc<RecordingUrls>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            identity: Identity::new(Arc::new(MemoryIdentityStore::new())).into_shared(),
            store: Arc::new(FakeMessageStore::default()),
            exchanger: Arc::new(CountingExchanger::default()),
            events: Arc::new(RecordingEvents::default()),
            endpoints: Arc::new(RecordingUrls::default()),
            config: Arc::new(RecordingUrls::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            message_store: self.store.clone(),
            exchanger: self.exchanger.clone(),
            events: self.events.clone(),
            endpoints: self.endpoints.clone(),
            config_store: self.config.clone(),
        }
    }

    pub fn handler(&self) -> RegistrationHandler {
        RegistrationHandler::new(self.identity.clone(), self.collaborators())
            .with_hostname(HOSTNAME)
    }

    /// Cloud-mode handler with a server that accepts `register-cloud-vm`.
    pub fn cloud_handler(&self, fetcher: StubFetcher) -> RegistrationHandler {
        self.store.accept("register-cloud-vm");
        self.handler()
            .with_cloud(CloudMetadataResolver::new(Arc::new(fetcher)))
    }

    pub fn configure(
        &self,
        computer_title: Option<&str>,
        account_name: Option<&str>,
        registration_password: Option<&str>,
    ) {
        let mut identity = self.identity.write().unwrap();
        identity.computer_title = computer_title.map(String::from);
        identity.account_name = account_name.map(String::from);
        identity.registration_password = registration_password.map(String::from);
    }

    /// The usual conventionally registered host.
    pub fn configure_account(&self) {
        self.store.accept("register");
        self.configure(Some("Computer Title"), Some("account_name"), None);
    }

    pub fn secure_id(&self) -> Option<String> {
        self.identity.read().unwrap().secure_id().map(String::from)
    }

    pub fn insecure_id(&self) -> Option<String> {
        self.identity.read().unwrap().insecure_id().map(String::from)
    }
}

/// The cloud message a healthy [`StubFetcher`] leads to.
pub fn expected_cloud_message() -> serde_json::Value {
    serde_json::json!({
        "type": "register-cloud-vm",
        "otp": "otp1",
        "hostname": HOSTNAME,
        "local_hostname": "ooga.local",
        "public_hostname": "ooga.amazon.com",
        "instance_key": "key1",
        "reservation_key": "res1",
        "ramdisk_key": "ram1",
        "kernel_key": "kernel1",
        "launch_index": 0,
        "image_key": "image1",
        "account_name": null,
        "registration_password": null,
    })
}

#[derive(Clone, Default)]
pub struct MockWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MockWriter {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MockWriter {
    type Writer = MockWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture log output on this thread until the guard drops.
pub fn capture_logs() -> (MockWriter, tracing::subscriber::DefaultGuard) {
    let writer = MockWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (writer, tracing::subscriber::set_default(subscriber))
}
