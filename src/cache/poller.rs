/**
 * Background refresh loop for one watched key.
 *
 * Sleeps for the configured interval, pulls with the last accepted item as the
 * baseline, and pushes whatever changed into the registries and the item's
 * notifier. Runs until its cancellation token fires.
 */
use super::fetcher::{Fetcher, PullOutcome};
use super::item::Item;
use super::registry::{ItemRegistry, MissCache};
use crate::config::Settings;
use crate::error::Error;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Poller {
    key: String,
    baseline: Arc<Item>,
    fetcher: Fetcher,
    items: ItemRegistry,
    missed: MissCache,
    settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl Poller {
    #[must_use]
    pub const fn new(
        key: String,
        baseline: Arc<Item>,
        fetcher: Fetcher,
        items: ItemRegistry,
        missed: MissCache,
        settings: Arc<Settings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            baseline,
            fetcher,
            items,
            missed,
            settings,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("🔍 Poller started for {} at version {:?}", self.key, self.baseline.version);

        loop {
            let interval = self.settings.refresh_interval();
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = sleep(interval) => {}
            }

            let result = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.fetcher.pull(&self.baseline) => result,
            };

            match result {
                Ok(outcome) => self.apply(outcome),
                Err(err) => self.handle_error(&err),
            }
        }

        info!("🛑 Poller for {} shutting down", self.key);
    }

    fn apply(&mut self, outcome: PullOutcome) {
        match outcome {
            PullOutcome::Updated(next) => {
                info!("⚡ {} updated {:?} -> {:?}", self.key, self.baseline.version, next.version);
                self.items.put(&self.key, next.clone());
                if self.settings.miss_cache_enabled() {
                    self.missed.remove(&self.key);
                }
                self.baseline.notify(None, &self.key, &next.value);
                self.baseline = next;
            }
            PullOutcome::Unchanged => {}
            PullOutcome::Rejected => {
                debug!("Keeping version {:?} of {}, new payload refused", self.baseline.version, self.key);
            }
        }
    }

    fn handle_error(&self, err: &Error) {
        if err.is_miss_cacheable() {
            // only the poller that actually evicts the item reports it
            if self.items.remove(&self.key).is_some() {
                info!("🗑️  {} removed from cache: {}", self.key, err);
                self.baseline.notify(Some(err), &self.key, "");
            }
            return;
        }

        warn!("❌ Poll of {} failed: {}", self.key, err);
        self.settings.print(&format!("update {} failed: {}", self.key, err));
    }
}
