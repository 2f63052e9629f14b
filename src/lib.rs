//! Reliable telemetry shipping over a local byte-stream socket.
//!
//! `logship` forwards DJSON-encoded records to a collector daemon over a
//! Unix domain socket (or loopback TCP) and retransmits anything the
//! collector does not acknowledge in time. The collector may disappear and
//! return at any moment; the socket client reconnects transparently with
//! jittered exponential backoff, and every blocking operation can be
//! cancelled promptly.
//!
//! Two usage modes are provided:
//!
//! - [`BufferedShipper`]: asynchronous. `add` enqueues and returns;
//!   dedicated threads send, read acks, and resend.
//! - [`DirectShipper`]: synchronous. The caller's thread sends inline
//!   while acks and resends are handled in the background.
//!
//! ```no_run
//! use std::time::Duration;
//! use logship::{BufferedShipper, DjsonBuilder, Endpoint, ShipperConfig};
//!
//! # fn main() -> Result<(), logship::ShipError> {
//! let config = ShipperConfig::new(Endpoint::unix("/var/run/collector.sock")?)
//!     .with_ack_timeout(Duration::from_secs(60))
//!     .with_resend_interval(Duration::from_secs(5))
//!     .with_buffer_limit(10_000);
//! let shipper = BufferedShipper::new(config)?;
//! let record = DjsonBuilder::new("syslog")
//!     .time_field("timestamp", 1475129808, 541868180)
//!     .str_field("message", "This is a message")
//!     .build()?;
//! shipper.add(record);
//! shipper.wait_until_all_sent(Duration::from_secs(1));
//! # Ok(())
//! # }
//! ```
//!
//! Delivery is at-least-once: a record may reach the collector more than
//! once, and consumers must tolerate duplicates. There is no durable
//! buffering; records are lost on process crash.

mod cache;
mod client;
mod error;
mod queue;
mod reader;
mod record;
mod resender;
mod schema;
mod sender;
mod shipper;

pub use cache::PendingCache;
pub use client::{Endpoint, ReadOutcome, SocketClient, MAX_UNIX_PATH_LEN};
pub use error::ShipError;
pub use queue::BoundedQueue;
pub use record::{DjsonBuilder, FieldValue, Record};
pub use schema::SchemaRegistry;
pub use shipper::{
    BufferedShipper, DirectShipper, ShipperConfig, DEFAULT_CONNECT_RETRY_TIMEOUT,
    DEFAULT_RESEND_INTERVAL,
};
