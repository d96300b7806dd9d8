use super::key::{ItemId, partition_key};
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Decides whether a freshly pulled body is acceptable
pub type CheckCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Called by a poller with `(error, key, value)` on update or removal
pub type NotifyCallback = Arc<dyn Fn(Option<&Error>, &str, &str) + Send + Sync>;

/// One cached configuration value.
///
/// Never mutated after construction: a newer version is a new `Item`, and the
/// registry swaps the `Arc` it holds.
#[derive(Clone)]
pub struct Item {
    pub id: ItemId,
    pub token: String,
    pub gray: bool,
    pub value: String,
    pub version: String,
    pub checker: Option<CheckCallback>,
    pub notify: Option<NotifyCallback>,
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id.id)
            .field("gray", &self.gray)
            .field("version", &self.version)
            .field("value_len", &self.value.len())
            .field("checker", &self.checker.is_some())
            .field("notify", &self.notify.is_some())
            .finish_non_exhaustive()
    }
}

impl Item {
    /// A probe with no value and an empty baseline version
    #[must_use]
    pub fn probe(id: ItemId, token: &str, gray: bool) -> Self {
        Self {
            id,
            token: token.to_string(),
            gray,
            value: String::new(),
            version: String::new(),
            checker: None,
            notify: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        partition_key(&self.id.id, &self.token, self.gray)
    }

    /// Next revision of this item; credential, channel and hooks carry over
    #[must_use]
    pub fn next_version(&self, value: String, version: String) -> Self {
        Self {
            value,
            version,
            ..self.clone()
        }
    }

    /// Same revision with the hooks a watcher supplied
    #[must_use]
    pub fn with_hooks(&self, checker: Option<CheckCallback>, notify: Option<NotifyCallback>) -> Self {
        Self {
            checker,
            notify,
            ..self.clone()
        }
    }

    /// True when no checker is attached or the checker accepts `body`
    #[must_use]
    pub fn accepts(&self, body: &str) -> bool {
        self.checker.as_ref().is_none_or(|check| check(body))
    }

    pub fn notify(&self, err: Option<&Error>, key: &str, value: &str) {
        if let Some(notify) = &self.notify {
            notify(err, key, value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NotFound,
    Forbidden,
}

impl MissReason {
    #[must_use]
    pub const fn from_error(err: &Error) -> Option<Self> {
        match err {
            Error::NotFound => Some(Self::NotFound),
            Error::Forbidden => Some(Self::Forbidden),
            _ => None,
        }
    }

    #[must_use]
    pub const fn into_error(self) -> Error {
        match self {
            Self::NotFound => Error::NotFound,
            Self::Forbidden => Error::Forbidden,
        }
    }
}

/// A remembered negative answer and when it stops counting
#[derive(Debug, Clone, Copy)]
pub struct MissItem {
    pub reason: MissReason,
    pub expires_at: Instant,
}

impl MissItem {
    #[must_use]
    pub fn new(reason: MissReason, ttl: Duration) -> Self {
        Self {
            reason,
            expires_at: Instant::now() + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item() -> Item {
        Item::probe(ItemId::parse("a.b.c").unwrap(), "tok", true)
    }

    #[test]
    fn test_next_version_carries_hooks() {
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let notify: NotifyCallback = Arc::new(move |_: Option<&Error>, _: &str, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let checker: CheckCallback = Arc::new(|body: &str| body.starts_with('{'));

        let base = item().with_hooks(Some(checker), Some(notify));
        let next = base.next_version("{}".to_string(), "v2".to_string());

        assert_eq!(next.version, "v2");
        assert_eq!(next.value, "{}");
        assert_eq!(next.token, "tok");
        assert!(next.gray);
        assert!(next.accepts("{\"a\":1}"));
        assert!(!next.accepts("plain"));

        next.notify(None, &next.key(), &next.value);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        // the original is untouched
        assert_eq!(base.version, "");
    }

    #[test]
    fn test_accepts_without_checker() {
        assert!(item().accepts("anything"));
        item().notify(None, "a.b.c", "no hook, no panic");
    }

    #[test]
    fn test_key_matches_partition_key() {
        assert_eq!(item().key(), "a.b.c:tok:gray");
    }

    #[test]
    fn test_miss_reason_roundtrip() {
        assert_eq!(MissReason::from_error(&Error::Forbidden), Some(MissReason::Forbidden));
        assert_eq!(MissReason::from_error(&Error::Status(500)), None);
        assert!(matches!(MissReason::NotFound.into_error(), Error::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_item_expiry() {
        let miss = MissItem::new(MissReason::NotFound, Duration::from_secs(10));
        assert!(!miss.is_expired());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!miss.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(miss.is_expired());
    }
}
