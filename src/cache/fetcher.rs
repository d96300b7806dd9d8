use super::item::Item;
use crate::config::{CLIENT_VERSION, Settings, TOKEN_HEADER, VERSION_HEADER};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Everything one pull sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub address: String,
    pub group: String,
    pub project: String,
    pub name: String,
    pub gray: bool,
    pub client_version: String,
    pub pid: u32,
    pub role: String,
    /// Version the caller already holds, empty on a first pull
    pub local_version: String,
    pub token: Option<String>,
}

impl PullRequest {
    /// Endpoint for the item, without the query string
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}/api/puller/{}/{}/{}",
            self.address, self.group, self.project, self.name,
        )
    }

    /// Query parameters, left unencoded for the transport to encode
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("grey", self.gray.to_string()),
            ("cver", format!("rs{}", self.client_version)),
            ("cid", self.pid.to_string()),
            ("ctype", self.role.clone()),
            ("lver", self.local_version.clone()),
        ]
    }
}

/// The parts of a pull response the protocol looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResponse {
    pub status: u16,
    pub version: Option<String>,
    /// Left empty when the version matches the request's `local_version`
    pub body: String,
}

/// Carries a `PullRequest` to the remote store.
///
/// Implementations own framing, TLS and any socket-level retries; they must
/// not interpret status codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse>;
}

/// `Transport` over HTTP(S) with reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        let mut builder = self.client.get(request.url()).query(&request.query());
        if let Some(token) = request.token.as_deref() {
            builder = builder.header(TOKEN_HEADER, token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string);

        let unchanged = version.as_deref() == Some(request.local_version.as_str());
        let body = if status == 200 && version.is_some() && !unchanged {
            response.text().await?
        } else {
            String::new()
        };

        Ok(PullResponse {
            status,
            version,
            body,
        })
    }
}

/// What a successful pull means for the item that was sent
#[derive(Debug, Clone)]
pub enum PullOutcome {
    /// Server version equals the baseline
    Unchanged,
    /// A new version whose body passed the item's checker
    Updated(Arc<Item>),
    /// A new version whose body the item's checker refused
    Rejected,
}

/// Versioned conditional pull. Reads settings, never touches the registries.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    settings: Arc<Settings>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: Arc<Settings>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    #[must_use]
    pub fn request_for(&self, item: &Item) -> PullRequest {
        PullRequest {
            address: self.settings.address().to_string(),
            group: item.id.group.clone(),
            project: item.id.project.clone(),
            name: item.id.name.clone(),
            gray: item.gray,
            client_version: CLIENT_VERSION.to_string(),
            pid: std::process::id(),
            role: self.settings.role().to_string(),
            local_version: item.version.clone(),
            token: Some(item.token.clone()).filter(|t| !t.is_empty()),
        }
    }

    /// Pull `item` once, using its version as the baseline.
    ///
    /// # Errors
    ///
    /// `NotFound` on 404, `Forbidden` on 403, `Status` on any other non-200,
    /// `Protocol` when the version header is missing, and `Http` when the
    /// transport itself fails.
    pub async fn pull(&self, item: &Item) -> Result<PullOutcome> {
        let request = self.request_for(item);
        let response = self.transport.pull(&request).await?;

        match response.status {
            200 => {}
            404 => return Err(Error::NotFound),
            403 => return Err(Error::Forbidden),
            code => return Err(Error::Status(code)),
        }

        let Some(version) = response.version else {
            return Err(Error::Protocol(format!("response lost {VERSION_HEADER}")));
        };

        if version == item.version {
            return Ok(PullOutcome::Unchanged);
        }

        if !item.accepts(&response.body) {
            debug!("Checker refused version {} of {}", version, item.id.id);
            return Ok(PullOutcome::Rejected);
        }

        Ok(PullOutcome::Updated(Arc::new(
            item.next_version(response.body, version),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::CheckCallback;
    use crate::cache::key::ItemId;
    use std::sync::Mutex;

    struct FixedTransport {
        response: PullResponse,
        seen: Mutex<Vec<PullRequest>>,
    }

    impl FixedTransport {
        fn new(status: u16, version: Option<&str>, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: PullResponse {
                    status,
                    version: version.map(ToString::to_string),
                    body: body.to_string(),
                },
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn fetcher(transport: Arc<FixedTransport>) -> Fetcher {
        Fetcher::new(transport, Arc::new(Settings::default()))
    }

    fn probe() -> Item {
        Item::probe(ItemId::parse("g.p.n").unwrap(), "", false)
    }

    #[test]
    fn test_request_url() {
        let transport = FixedTransport::new(200, Some("v1"), "");
        let mut item = Item::probe(ItemId::parse("g.p.n").unwrap(), "secret", true);
        item.version = "v0".to_string();

        let request = fetcher(transport).request_for(&item);
        assert_eq!(request.url(), "http://localhost:7888/api/puller/g/p/n");
        assert_eq!(
            request.query(),
            vec![
                ("grey", "true".to_string()),
                ("cver", format!("rs{CLIENT_VERSION}")),
                ("cid", std::process::id().to_string()),
                ("ctype", "client".to_string()),
                ("lver", "v0".to_string()),
            ]
        );
        assert_eq!(request.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_token_is_not_sent() {
        let request = fetcher(FixedTransport::new(200, None, "")).request_for(&probe());
        assert!(request.token.is_none());
        assert!(request.query().contains(&("lver", String::new())));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [(404, "not found"), (403, "forbidden"), (500, "error status code 500")];
        for (status, message) in cases {
            let err = fetcher(FixedTransport::new(status, Some("v1"), ""))
                .pull(&probe())
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }

    #[tokio::test]
    async fn test_missing_version_is_protocol_error() {
        let err = fetcher(FixedTransport::new(200, None, "body"))
            .pull(&probe())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_same_version_is_unchanged() {
        let transport = FixedTransport::new(200, Some("v1"), "");
        let base = probe().next_version("X".to_string(), "v1".to_string());
        let outcome = fetcher(transport.clone()).pull(&base).await.unwrap();

        assert!(matches!(outcome, PullOutcome::Unchanged));
        assert_eq!(transport.seen.lock().unwrap()[0].local_version, "v1");
    }

    #[tokio::test]
    async fn test_identical_content_new_version_is_update() {
        let base = probe().next_version("X".to_string(), "v1".to_string());
        let outcome = fetcher(FixedTransport::new(200, Some("v2"), "X"))
            .pull(&base)
            .await
            .unwrap();

        let PullOutcome::Updated(next) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(next.value, "X");
        assert_eq!(next.version, "v2");
    }

    #[tokio::test]
    async fn test_checker_gates_update() {
        let checker: CheckCallback = Arc::new(|body: &str| body.len() > 3);
        let base = probe().with_hooks(Some(checker), None);

        let rejected = fetcher(FixedTransport::new(200, Some("v1"), "no"))
            .pull(&base)
            .await
            .unwrap();
        assert!(matches!(rejected, PullOutcome::Rejected));

        let accepted = fetcher(FixedTransport::new(200, Some("v1"), "long enough"))
            .pull(&base)
            .await
            .unwrap();
        let PullOutcome::Updated(next) = accepted else {
            panic!("expected an update, got {accepted:?}");
        };
        assert!(next.checker.is_some());
        assert_eq!(next.value, "long enough");
    }
}
