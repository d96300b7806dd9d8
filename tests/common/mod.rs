#![allow(dead_code)]

use async_trait::async_trait;
use guldan_client::cache::{PullRequest, PullResponse};
use guldan_client::{ClientConfig, Error, GuldanClient, NotifyCallback, Result, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Remote {
    Present { version: String, body: String },
    Status(u16),
}

/// In-memory Guldan server holding a single item
pub struct ScriptedTransport {
    remote: Mutex<Remote>,
    required_token: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn present(version: &str, body: &str) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(Remote::Present {
                version: version.to_string(),
                body: body.to_string(),
            }),
            required_token: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn status(code: u16) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(Remote::Status(code)),
            required_token: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn publish(&self, version: &str, body: &str) {
        *self.remote.lock().unwrap() = Remote::Present {
            version: version.to_string(),
            body: body.to_string(),
        };
    }

    pub fn fail_with(&self, code: u16) {
        *self.remote.lock().unwrap() = Remote::Status(code);
    }

    /// Answer 403 to any request not carrying `token`
    pub fn require_token(&self, token: &str) {
        *self.required_token.lock().unwrap() = Some(token.to_string());
    }

    /// Hold every answer back by `delay` on the test clock
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let required = self.required_token.lock().unwrap().clone();
        if required.is_some() && required != request.token {
            return Ok(PullResponse {
                status: 403,
                version: None,
                body: String::new(),
            });
        }

        let remote = self.remote.lock().unwrap().clone();
        Ok(match remote {
            Remote::Present { version, body } => {
                let body = if version == request.local_version {
                    String::new()
                } else {
                    body
                };
                PullResponse {
                    status: 200,
                    version: Some(version),
                    body,
                }
            }
            Remote::Status(status) => PullResponse {
                status,
                version: None,
                body: String::new(),
            },
        })
    }
}

pub fn client(transport: &Arc<ScriptedTransport>) -> GuldanClient {
    let config = ClientConfig {
        refresh_interval: INTERVAL,
        ..ClientConfig::default()
    };
    GuldanClient::with_transport(&config, transport.clone())
}

/// One `(error, key, value)` notification, error rendered as text
pub type Notification = (Option<String>, String, String);

pub fn recorder() -> (NotifyCallback, Arc<Mutex<Vec<Notification>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let notify: NotifyCallback = Arc::new(move |err: Option<&Error>, key: &str, value: &str| {
        sink.lock()
            .unwrap()
            .push((err.map(ToString::to_string), key.to_string(), value.to_string()));
    });
    (notify, seen)
}

/// Sleep just past `cycles` poll intervals on the paused test clock
pub async fn after_polls(cycles: u32) {
    tokio::time::sleep(INTERVAL * cycles + Duration::from_millis(10)).await;
}
