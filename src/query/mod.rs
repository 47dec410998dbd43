//! Keyed polling cache.
//!
//! Every key owns one [`CacheEntry`] shared by all of its subscribers. Requests
//! carry a per-key sequence number and the epoch they were issued in; a response
//! only lands if it is the newest seen so far and the query has not been
//! disabled or abandoned since it was issued.

mod client;
mod entry;
mod key;
mod options;

pub use client::{query_fn, QueryClient, QueryFn, QueryHandle};
pub use entry::CacheEntry;
pub use key::{KeyPart, QueryKey};
pub use options::{QueryOptions, RetryPolicy};
