use super::item::{Item, MissItem, MissReason};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Latest known item per partition key
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    items: Arc<DashMap<String, Arc<Item>>>,
}

impl ItemRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Item>> {
        let hit = self.items.get(key).map(|entry| entry.value().clone());
        if hit.is_some() {
            debug!("🎯 Cache HIT: {}", key);
        } else {
            debug!("❌ Cache MISS: {}", key);
        }
        hit
    }

    pub fn put(&self, key: &str, item: Arc<Item>) {
        debug!("💾 Cache STORE: {} (version {})", key, item.version);
        self.items.insert(key.to_string(), item);
    }

    /// Returns the evicted item, `None` if the key was already gone
    pub fn remove(&self, key: &str) -> Option<Arc<Item>> {
        self.items.remove(key).map(|(_, item)| item)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Recent "not found" / "forbidden" answers, each with an absolute expiry
#[derive(Debug, Clone, Default)]
pub struct MissCache {
    missed: Arc<DashMap<String, MissItem>>,
}

impl MissCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The remembered answer for `key` while it is still live.
    ///
    /// An expired entry is evicted and reported as absent.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<MissReason> {
        let miss = *self.missed.get(key)?;
        if miss.is_expired() {
            debug!("🔄 Miss cache EXPIRED: {}", key);
            self.missed.remove_if(key, |_, current| current.is_expired());
            return None;
        }
        debug!("🚫 Miss cache HIT: {} ({:?})", key, miss.reason);
        Some(miss.reason)
    }

    pub fn put(&self, key: &str, reason: MissReason, ttl: Duration) {
        debug!("💾 Miss cache STORE: {} ({:?}, TTL: {}s)", key, reason, ttl.as_secs());
        self.missed.insert(key.to_string(), MissItem::new(reason, ttl));
    }

    pub fn remove(&self, key: &str) {
        self.missed.remove(key);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.missed.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.missed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missed.is_empty()
    }
}

#[derive(Debug)]
struct Claim {
    id: u64,
    cancel: CancellationToken,
}

/// Keys with a live poller, each holding the token that stops it.
///
/// Claiming a key is the only way to start a poller, so a key never has two.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    watched: Arc<DashMap<String, Claim>>,
    next_id: Arc<AtomicU64>,
}

impl WatchSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` when another caller already holds it.
    ///
    /// The claim is given back when the returned guard drops, unless it was
    /// handed to a poller with [`WatchClaim::into_token`] first.
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<WatchClaim> {
        match self.watched.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                slot.insert(Claim {
                    id,
                    cancel: cancel.clone(),
                });
                Some(WatchClaim {
                    watched: self.clone(),
                    key: key.to_string(),
                    id,
                    cancel,
                    armed: true,
                })
            }
        }
    }

    /// Drop a claim and stop whatever it guards.
    ///
    /// Returns false when `key` was not claimed.
    pub fn release(&self, key: &str) -> bool {
        self.watched.remove(key).is_some_and(|(_, claim)| {
            claim.cancel.cancel();
            true
        })
    }

    pub fn release_all(&self) -> usize {
        let keys: Vec<String> = self.watched.iter().map(|entry| entry.key().clone()).collect();
        keys.iter().filter(|key| self.release(key)).count()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.watched.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

/// A key claimed in a [`WatchSet`] that has no poller yet.
///
/// Dropping it releases the key, so a watch that fails or is abandoned
/// mid-fetch never leaves a claim behind with nothing polling.
#[derive(Debug)]
pub struct WatchClaim {
    watched: WatchSet,
    key: String,
    id: u64,
    cancel: CancellationToken,
    armed: bool,
}

impl WatchClaim {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Keep the claim and hand its stop token to the poller that now owns it
    #[must_use]
    pub fn into_token(mut self) -> CancellationToken {
        self.armed = false;
        self.cancel.clone()
    }
}

impl Drop for WatchClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // only our own claim; the key may have been released and claimed again
        let removed = self
            .watched
            .watched
            .remove_if(&self.key, |_, claim| claim.id == self.id);
        if removed.is_some() {
            self.cancel.cancel();
            debug!("🔓 Released unused watch claim: {}", self.key);
        }
    }
}
