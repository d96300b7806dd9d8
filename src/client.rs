/**
Caching client for the Guldan configuration store

`GuldanClient` answers reads from its item registry when asked to, remembers
"not found" / "forbidden" answers for a configurable time, and keeps watched
items fresh with one background poller per key.
*/
use crate::cache::{
    CheckCallback, Fetcher, HttpTransport, Item, ItemId, ItemRegistry, MissCache, MissReason,
    NotifyCallback, Poller, PullOutcome, Transport, WatchSet, partition_key,
};
use crate::config::{ClientConfig, PrintCallback, Settings};
use crate::error::{Error, Result};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

/// Process-wide client, see [`instance`]
static INSTANCE: OnceLock<GuldanClient> = OnceLock::new();

/// Shared client configured from the environment on first use.
///
/// Code that can pass a `GuldanClient` around should construct its own
/// instead; this exists for callers with no place to keep one.
#[must_use]
pub fn instance() -> &'static GuldanClient {
    INSTANCE.get_or_init(|| GuldanClient::new(&ClientConfig::from_env()))
}

/// Cheap to clone: clones share settings, registries and pollers
#[derive(Debug, Clone)]
pub struct GuldanClient {
    settings: Arc<Settings>,
    fetcher: Fetcher,
    items: ItemRegistry,
    missed: MissCache,
    watched: WatchSet,
}

impl Default for GuldanClient {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl GuldanClient {
    /// Client talking HTTP to `config.address`
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::default()))
    }

    #[must_use]
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let settings = Arc::new(Settings::new(config));
        Self {
            fetcher: Fetcher::new(transport, settings.clone()),
            settings,
            items: ItemRegistry::new(),
            missed: MissCache::new(),
            watched: WatchSet::new(),
        }
    }

    /// Replace every setting at once. Running pollers pick up the new
    /// interval after their current sleep.
    pub fn configure(&self, config: &ClientConfig) {
        self.settings.apply(config);
    }

    pub fn set_address(&self, address: &str) {
        self.settings.set_address(address);
    }

    pub fn set_refresh_interval(&self, interval: Duration) {
        self.settings.set_refresh_interval(interval);
    }

    pub fn set_role(&self, role: &str) {
        self.settings.set_role(role);
    }

    /// Sink for poller failures other than not-found / forbidden
    pub fn set_printer(&self, printer: Option<PrintCallback>) {
        self.settings.set_printer(printer);
    }

    /// Remember not-found / forbidden answers for `ttl`; zero turns it off
    pub fn set_miss_cache(&self, ttl: Duration) {
        self.settings.set_miss_cache_ttl(ttl);
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fetch an item, consulting and filling the caches when `cached` is set.
    ///
    /// At most one round trip; a registry hit is returned as-is, keeping it
    /// fresh is the job of a watch.
    ///
    /// # Errors
    ///
    /// `InvalidId` for a malformed id, `BadConfigFormat` if a checker refused
    /// the payload, otherwise whatever the pull failed with. A remembered miss
    /// returns its original `NotFound` / `Forbidden` without a round trip.
    pub async fn raw_get(&self, id: &str, token: &str, cached: bool, gray: bool) -> Result<Arc<Item>> {
        let key = partition_key(id, token, gray);

        if cached {
            if let Some(item) = self.items.get(&key) {
                return Ok(item);
            }
            if self.settings.miss_cache_enabled() {
                if let Some(reason) = self.missed.lookup(&key) {
                    return Err(reason.into_error());
                }
            }
        }

        let probe = Item::probe(ItemId::parse(id)?, token, gray);
        match self.fetcher.pull(&probe).await {
            Err(err) => {
                let ttl = self.settings.miss_cache_ttl();
                if let Some(reason) = MissReason::from_error(&err).filter(|_| !ttl.is_zero()) {
                    self.missed.put(&key, reason, ttl);
                }
                Err(err)
            }
            // a probe has no version, so Unchanged would mean a broken server
            Ok(PullOutcome::Rejected | PullOutcome::Unchanged) => Err(Error::BadConfigFormat),
            Ok(PullOutcome::Updated(item)) => {
                if cached {
                    self.items.put(&key, item.clone());
                    if self.settings.miss_cache_enabled() {
                        self.missed.remove(&key);
                    }
                }
                Ok(item)
            }
        }
    }

    /// Value of an item, see [`GuldanClient::raw_get`]
    ///
    /// # Errors
    ///
    /// Same as [`GuldanClient::raw_get`]
    pub async fn get(&self, id: &str, token: &str, cached: bool, gray: bool) -> Result<String> {
        let item = self.raw_get(id, token, cached, gray).await?;
        Ok(item.value.clone())
    }

    /// [`GuldanClient::get`] without a credential
    ///
    /// # Errors
    ///
    /// Same as [`GuldanClient::raw_get`]
    pub async fn get_public(&self, id: &str, cached: bool, gray: bool) -> Result<String> {
        self.get(id, "", cached, gray).await
    }

    /// Keep an item fresh in the background and report its changes.
    ///
    /// Only the first call for a given id/token/channel does anything; later
    /// ones return `Ok(())`. `notify` receives `(None, key, value)` on every
    /// accepted new version and `(Some(err), key, "")` once when the item
    /// disappears or access is revoked. `checker` gates new versions.
    ///
    /// # Errors
    ///
    /// Fails, and leaves the key unwatched, when the item is not cached and
    /// the initial fetch fails. Dropping the future before it completes also
    /// leaves the key unwatched.
    pub async fn watch(
        &self,
        id: &str,
        token: &str,
        gray: bool,
        notify: Option<NotifyCallback>,
        checker: Option<CheckCallback>,
    ) -> Result<()> {
        let key = partition_key(id, token, gray);
        let Some(claim) = self.watched.claim(&key) else {
            debug!("Already watching {}", key);
            return Ok(());
        };

        // the claim is given back if this fails or the caller stops waiting
        let current = match self.items.get(&key) {
            Some(item) => item,
            None => self.raw_get(id, token, true, gray).await?,
        };

        info!("👀 Watching {} from version {:?}", key, current.version);
        let baseline = Arc::new(current.with_hooks(checker, notify));
        self.items.put(&key, baseline.clone());
        Poller::new(
            key,
            baseline,
            self.fetcher.clone(),
            self.items.clone(),
            self.missed.clone(),
            self.settings.clone(),
            claim.into_token(),
        )
        .spawn();

        Ok(())
    }

    /// [`GuldanClient::watch`] without a credential
    ///
    /// # Errors
    ///
    /// Same as [`GuldanClient::watch`]
    pub async fn watch_public(
        &self,
        id: &str,
        gray: bool,
        notify: Option<NotifyCallback>,
        checker: Option<CheckCallback>,
    ) -> Result<()> {
        self.watch(id, "", gray, notify, checker).await
    }

    /// Stop the poller for a key so it can be watched again later.
    ///
    /// The cached item stays in the registry. Returns false if the key was
    /// not being watched.
    pub fn unwatch(&self, id: &str, token: &str, gray: bool) -> bool {
        let key = partition_key(id, token, gray);
        let stopped = self.watched.release(&key);
        if stopped {
            info!("Stopped watching {}", key);
        }
        stopped
    }

    /// Stop every poller; returns how many were running
    pub fn shutdown(&self) -> usize {
        let stopped = self.watched.release_all();
        info!("Stopped {} poller(s)", stopped);
        stopped
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    #[must_use]
    pub fn is_cached(&self, id: &str, token: &str, gray: bool) -> bool {
        self.items.contains(&partition_key(id, token, gray))
    }

    /// Whether a live not-found / forbidden answer is remembered for the key
    #[must_use]
    pub fn is_miss_cached(&self, id: &str, token: &str, gray: bool) -> bool {
        self.missed.lookup(&partition_key(id, token, gray)).is_some()
    }
}
