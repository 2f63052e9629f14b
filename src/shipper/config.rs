//! Shipper configuration.

use std::time::Duration;

use crate::client::Endpoint;
use crate::error::ShipError;

/// Default period of the resend loop.
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_secs(30);
/// Default per-connect retry budget.
pub const DEFAULT_CONNECT_RETRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Options accepted by [`BufferedShipper`](super::BufferedShipper) and
/// [`DirectShipper`](super::DirectShipper).
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    /// Collector destination.
    pub endpoint: Endpoint,
    /// How long to wait for an ack before a cached record is dropped as
    /// lost. Zero disables caching and resending entirely.
    pub ack_timeout: Duration,
    /// Period of the resend loop. Must be non-zero when caching is enabled.
    pub resend_interval: Duration,
    /// Retry budget for each connect. Must be non-zero.
    pub connect_retry_timeout: Duration,
    /// Ingestion queue cap; zero means unbounded. Ignored by the direct
    /// shipper.
    pub buffer_limit: usize,
}

impl ShipperConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ack_timeout: Duration::ZERO,
            resend_interval: DEFAULT_RESEND_INTERVAL,
            connect_retry_timeout: DEFAULT_CONNECT_RETRY_TIMEOUT,
            buffer_limit: 0,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_resend_interval(mut self, resend_interval: Duration) -> Self {
        self.resend_interval = resend_interval;
        self
    }

    pub fn with_connect_retry_timeout(mut self, connect_retry_timeout: Duration) -> Self {
        self.connect_retry_timeout = connect_retry_timeout;
        self
    }

    pub fn with_buffer_limit(mut self, buffer_limit: usize) -> Self {
        self.buffer_limit = buffer_limit;
        self
    }

    /// Whether records are cached for ack-driven retry.
    pub fn caching_enabled(&self) -> bool {
        !self.ack_timeout.is_zero()
    }

    pub(crate) fn validate(&self) -> Result<(), ShipError> {
        if self.connect_retry_timeout.is_zero() {
            return Err(ShipError::InvalidArgument(
                "connect retry timeout must be greater than zero".into(),
            ));
        }
        if self.caching_enabled() && self.resend_interval.is_zero() {
            return Err(ShipError::InvalidArgument(
                "resend interval must be greater than zero when caching is enabled".into(),
            ));
        }
        Ok(())
    }
}
