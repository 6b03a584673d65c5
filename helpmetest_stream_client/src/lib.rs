//! # HelpMeTest Event Stream Client
//!
//! Long-lived subscription to the HelpMeTest streaming endpoint. The server
//! answers `POST {base}/api/stream/{pattern}` with a never-ending body of
//! UTF-8 text in which JSON records are separated by a blank line (`\n\n`).
//!
//! - [`records::RecordSplitter`] reassembles records from arbitrary chunk
//!   boundaries and [`records::parse_record`] decodes them best-effort.
//! - [`backoff::ReconnectBackoff`] computes the reconnect delay
//!   `min(1000ms * 2^(n-1), 60s)` for the n-th consecutive failure.
//! - [`client::EventStreamClient`] connects, pumps records into a
//!   [`client::RecordHandler`] and reconnects forever.
//!
//! ```no_run
//! use helpmetest_stream_client::client::{EventStreamClient, RecordHandler, StreamConfig};
//! use serde_json::{Map, Value};
//! use std::sync::Arc;
//! use url::Url;
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl RecordHandler for Printer {
//!     async fn handle_record(&self, record: Map<String, Value>) {
//!         println!("{record:?}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::new(Url::parse("https://helpmetest.com")?, "acme", "token");
//! let client = EventStreamClient::new(config)?;
//! let _task = client.spawn(Arc::new(Printer));
//! # Ok(())
//! # }
//! ```

/// Reconnect delay policy.
pub mod backoff;
/// Streaming connection and reconnect loop.
pub mod client;
/// Error types for the stream client.
pub mod error;
/// Record reassembly and decoding.
pub mod records;
