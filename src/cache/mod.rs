pub mod fetcher;
pub mod item;
pub mod key;
pub mod poller;
pub mod registry;

pub use fetcher::{Fetcher, HttpTransport, PullOutcome, PullRequest, PullResponse, Transport};
pub use item::{CheckCallback, Item, MissItem, MissReason, NotifyCallback};
pub use key::{ItemId, partition_key};
pub use poller::Poller;
pub use registry::{ItemRegistry, MissCache, WatchClaim, WatchSet};
