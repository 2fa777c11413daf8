//! Scripted collaborators shared by unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{FetchError, Result};
use crate::models::{ProxyRecord, ValidationResult};
use crate::proxy::source::ProxySource;
use crate::proxy::transport::{HttpTransport, TransportRequest, TransportResponse};
use crate::proxy::validator::ProxyValidator;

/// Key used for requests sent without a proxy
pub const DIRECT: &str = "direct";

#[derive(Debug, Clone)]
enum Outcome {
    Respond(u16, Bytes),
    Connect(String),
    Timeout(String),
    Transport(String),
}

impl Outcome {
    fn from_error(err: FetchError) -> Self {
        match err {
            FetchError::Connect(m) => Outcome::Connect(m),
            FetchError::Timeout(m) => Outcome::Timeout(m),
            other => Outcome::Transport(other.to_string()),
        }
    }

    fn resolve(self, request: &TransportRequest) -> Result<TransportResponse> {
        match self {
            Outcome::Respond(status, body) => Ok(TransportResponse {
                status,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    vec!["text/plain".to_string()],
                )]),
                body,
                final_url: request.url.clone(),
            }),
            Outcome::Connect(m) => Err(FetchError::Connect(m)),
            Outcome::Timeout(m) => Err(FetchError::Timeout(m)),
            Outcome::Transport(m) => Err(FetchError::Transport(m)),
        }
    }
}

/// Transport whose outcomes are scripted per proxy address or as a queue.
///
/// Queued outcomes take precedence; then per-address (or per-URL) outcomes;
/// anything else is a connection failure.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Outcome>>,
    by_key: Mutex<HashMap<String, Outcome>>,
    sent: Mutex<Vec<TransportRequest>>,
    closed: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_for(&self, key: &str, status: u16) {
        self.respond_body_for(key, status, "ok");
    }

    pub fn respond_body_for(&self, key: &str, status: u16, body: &str) {
        self.by_key.lock().insert(
            key.to_string(),
            Outcome::Respond(status, Bytes::from(body.to_string())),
        );
    }

    pub fn fail_for(&self, key: &str, err: FetchError) {
        self.by_key
            .lock()
            .insert(key.to_string(), Outcome::from_error(err));
    }

    pub fn push_response(&self, status: u16) {
        self.queue
            .lock()
            .push_back(Outcome::Respond(status, Bytes::from_static(b"ok")));
    }

    pub fn push_error(&self, err: FetchError) {
        self.queue.lock().push_back(Outcome::from_error(err));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.sent.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.sent.lock().push(request.clone());

        if let Some(outcome) = self.queue.lock().pop_front() {
            return outcome.resolve(&request);
        }

        let key = request
            .proxy
            .as_ref()
            .map(ProxyRecord::address)
            .unwrap_or_else(|| DIRECT.to_string());
        let outcome = {
            let by_key = self.by_key.lock();
            by_key
                .get(&key)
                .or_else(|| by_key.get(&request.url))
                .cloned()
        };

        outcome
            .unwrap_or_else(|| Outcome::Connect(format!("no route to {}", key)))
            .resolve(&request)
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Validator that passes a fixed set of addresses
#[derive(Default)]
pub struct ScriptedValidator {
    passing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub fn passing(addresses: &[&str]) -> Self {
        Self {
            passing: Mutex::new(addresses.iter().map(|a| a.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_passing(&self, address: &str, passing: bool) {
        let mut set = self.passing.lock();
        if passing {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyValidator for ScriptedValidator {
    async fn validate(&self, proxy: &ProxyRecord) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.passing.lock().contains(&proxy.address()) {
            ValidationResult::success(50)
        } else {
            ValidationResult::failure("scripted failure")
        }
    }
}

/// Source returning a fixed candidate list and counting fetches
pub struct ScriptedSource {
    name: String,
    priority: i32,
    enabled: bool,
    proxies: Vec<ProxyRecord>,
    fetches: AtomicUsize,
    log: Option<std::sync::Arc<Mutex<Vec<String>>>>,
}

impl ScriptedSource {
    pub fn new(name: &str, priority: i32, addresses: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            priority,
            enabled: true,
            proxies: addresses
                .iter()
                .map(|a| ProxyRecord::parse(a).expect("valid test address"))
                .collect(),
            fetches: AtomicUsize::new(0),
            log: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Record the source name into `log` on every fetch
    pub fn logging_to(mut self, log: std::sync::Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxySource for ScriptedSource {
    async fn fetch(&self) -> Vec<ProxyRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        self.proxies.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
