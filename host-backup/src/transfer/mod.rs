//! Network transfer of the archive artifact.

pub mod client;
pub mod http;
pub mod progress;
pub mod progress_stream;
pub mod retry;

pub use client::{TransferClient, Transport};
pub use http::HttpTransport;
pub use retry::{with_retry, Exhausted, RetryPolicy};
