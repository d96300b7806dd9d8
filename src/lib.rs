//! Client-side cache for the Guldan versioned configuration store.
//!
//! Values are pulled with a version-conditional request, optionally cached
//! per (id, credential, channel), kept fresh by per-key background pollers,
//! and "not found" / "forbidden" answers can be remembered for a while so a
//! missing item doesn't turn every read into a round trip.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;

pub use cache::{CheckCallback, HttpTransport, Item, NotifyCallback, Transport};
pub use client::{GuldanClient, instance};
pub use config::{ClientConfig, PrintCallback};
pub use error::{Error, Result};
