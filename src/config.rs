/**
 * Client configuration: compile-time defaults, the plain `ClientConfig` value
 * callers hand to `GuldanClient::configure`, and the shared `Settings` the
 * façade, fetcher and pollers read at runtime.
 */
use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Reported to the server as `cver=rs<version>`
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Remote store used when nothing else is configured
pub const DEFAULT_ADDRESS: &str = "http://localhost:7888";

/// Seconds a poller sleeps between pulls
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5;

/// Role reported to the server as `ctype`
pub const DEFAULT_ROLE: &str = "client";

/// Miss cache TTL in seconds, 0 disables negative caching
pub const DEFAULT_MISS_CACHE_SECS: u64 = 0;

/// Request header carrying the opaque credential
pub const TOKEN_HEADER: &str = "X-Guldan-Token";

/// Response header carrying the version token
pub const VERSION_HEADER: &str = "X-Guldan-Version";

const _: () = {
    assert!(DEFAULT_REFRESH_INTERVAL_SECS > 0, "DEFAULT_REFRESH_INTERVAL_SECS must be greater than 0");
    assert!(!DEFAULT_ADDRESS.is_empty(), "DEFAULT_ADDRESS must not be empty");
};

/// Diagnostic sink for poller failures that have nowhere else to go
pub type PrintCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub address: String,
    pub refresh_interval: Duration,
    pub role: String,
    /// Zero disables the miss cache
    pub miss_cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            role: DEFAULT_ROLE.to_string(),
            miss_cache_ttl: Duration::from_secs(DEFAULT_MISS_CACHE_SECS),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `GULDAN_ADDRESS`, `GULDAN_REFRESH_SECS`,
    /// `GULDAN_ROLE` and `GULDAN_MISS_CACHE_SECS` when they are set.
    ///
    /// Unparseable numbers are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(address) = lookup("GULDAN_ADDRESS").filter(|a| !a.is_empty()) {
            config.address = address;
        }
        if let Some(role) = lookup("GULDAN_ROLE").filter(|r| !r.is_empty()) {
            config.role = role;
        }
        if let Some(secs) = parse_secs(&lookup, "GULDAN_REFRESH_SECS") {
            if secs > 0 {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = parse_secs(&lookup, "GULDAN_MISS_CACHE_SECS") {
            config.miss_cache_ttl = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

/// Runtime settings shared by the client and every poller.
///
/// Each field is replaced as a whole value, so readers never observe a
/// partially written address or role.
pub struct Settings {
    address: ArcSwap<String>,
    role: ArcSwap<String>,
    refresh_interval_ms: AtomicU64,
    miss_cache_ms: AtomicU64,
    printer: ArcSwapOption<PrintCallback>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("address", &self.address())
            .field("role", &self.role())
            .field("refresh_interval", &self.refresh_interval())
            .field("miss_cache_ttl", &self.miss_cache_ttl())
            .field("printer", &self.printer.load().is_some())
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Settings {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let settings = Self {
            address: ArcSwap::from_pointee(String::new()),
            role: ArcSwap::from_pointee(String::new()),
            refresh_interval_ms: AtomicU64::new(0),
            miss_cache_ms: AtomicU64::new(0),
            printer: ArcSwapOption::empty(),
        };
        settings.apply(config);
        settings
    }

    pub fn apply(&self, config: &ClientConfig) {
        self.set_address(&config.address);
        self.set_role(&config.role);
        self.set_refresh_interval(config.refresh_interval);
        self.set_miss_cache_ttl(config.miss_cache_ttl);
    }

    #[must_use]
    pub fn address(&self) -> Arc<String> {
        self.address.load_full()
    }

    pub fn set_address(&self, address: &str) {
        self.address
            .store(Arc::new(address.trim_end_matches('/').to_string()));
    }

    #[must_use]
    pub fn role(&self) -> Arc<String> {
        self.role.load_full()
    }

    pub fn set_role(&self, role: &str) {
        self.role.store(Arc::new(role.to_string()));
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.load(Ordering::Acquire))
    }

    pub fn set_refresh_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.refresh_interval_ms.store(ms, Ordering::Release);
    }

    #[must_use]
    pub fn miss_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.miss_cache_ms.load(Ordering::Acquire))
    }

    pub fn set_miss_cache_ttl(&self, ttl: Duration) {
        let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.miss_cache_ms.store(ms, Ordering::Release);
    }

    #[must_use]
    pub fn miss_cache_enabled(&self) -> bool {
        self.miss_cache_ms.load(Ordering::Acquire) > 0
    }

    pub fn set_printer(&self, printer: Option<PrintCallback>) {
        self.printer.store(printer.map(Arc::new));
    }

    /// Forward a message to the diagnostic sink, if one is installed
    pub fn print(&self, message: &str) {
        let printer = self.printer.load();
        if let Some(printer) = &*printer {
            printer(message);
        }
    }
}
