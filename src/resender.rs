//! Worker that periodically retransmits unacknowledged records.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::cache::PendingCache;
use crate::client::SocketClient;
use crate::error::ShipError;

/// Every `resend_interval`, evicts cache entries older than the ack timeout
/// and retransmits the rest. The resender only reads and removes from the
/// cache; it never inserts.
pub(crate) struct ResendWorker {
    client: Arc<SocketClient>,
    cache: Arc<PendingCache>,
    ack_timeout_ms: u64,
    resend_interval: Duration,
    timer: Mutex<()>,
    timer_cv: Condvar,
    stop: AtomicBool,
    resends: AtomicUsize,
}

impl ResendWorker {
    pub fn new(
        client: Arc<SocketClient>,
        cache: Arc<PendingCache>,
        ack_timeout: Duration,
        resend_interval: Duration,
    ) -> Result<Self, ShipError> {
        if ack_timeout.is_zero() {
            return Err(ShipError::InvalidArgument(
                "ack timeout must be greater than zero".into(),
            ));
        }
        if resend_interval.is_zero() {
            return Err(ShipError::InvalidArgument(
                "resend interval must be greater than zero".into(),
            ));
        }
        Ok(Self {
            client,
            cache,
            ack_timeout_ms: ack_timeout.as_millis() as u64,
            resend_interval,
            timer: Mutex::new(()),
            timer_cv: Condvar::new(),
            stop: AtomicBool::new(false),
            resends: AtomicUsize::new(0),
        })
    }

    /// Wake the interval wait and notify the loop to stop.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _timer = self.timer.lock();
        self.timer_cv.notify_all();
    }

    /// Total records retransmitted across all passes.
    pub fn resends(&self) -> usize {
        self.resends.load(Ordering::Relaxed)
    }

    /// Run the resend loop until stopped. Returns the number of completed
    /// passes, for tests.
    pub fn run(&self) -> usize {
        let mut passes = 0usize;
        loop {
            self.wait_for_next_pass();
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if !self.cache.is_empty() {
                self.resend_pass();
            }
            passes += 1;
        }
        debug!("ResendWorker: finished after {passes} passes");
        passes
    }

    fn wait_for_next_pass(&self) {
        let deadline = Instant::now() + self.resend_interval;
        let mut timer = self.timer.lock();
        while !self.stop.load(Ordering::Relaxed) {
            if self.timer_cv.wait_until(&mut timer, deadline).timed_out() {
                break;
            }
        }
    }

    /// One pass: age out, then retransmit what is left. Scan and send are
    /// decoupled through snapshots so no cache lock is held during network
    /// I/O; an ack landing between the two snapshots simply skips that
    /// resend.
    fn resend_pass(&self) {
        let expired = self
            .cache
            .filter_keys(|record| record.age_ms() > self.ack_timeout_ms);
        if !expired.is_empty() {
            let removed = self.cache.erase_many(&expired);
            debug!("ResendWorker: dropped {removed} records older than the ack deadline");
            for tag in &expired {
                trace!("ResendWorker: expired tag '{tag}' dropped");
            }
        }

        for record in self.cache.snapshot().values() {
            if let Err(err) = self.client.send(record.wire_bytes()) {
                debug!("ResendWorker: resend failed, ending this pass: {err}");
                return;
            }
            self.resends.fetch_add(1, Ordering::Relaxed);
        }
        trace!("ResendWorker: total resends {}", self.resends());
    }
}
