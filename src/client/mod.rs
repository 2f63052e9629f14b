//! Socket client owning the single collector connection.
//!
//! The client presents one logical connection whose lifetime is
//! transparently re-established on loss: `send` lazily connects with
//! jittered exponential backoff, a reader waits on the fd-ready condition
//! variable, and [`SocketClient::stop`] cancels every blocked operation
//! within the backoff granularity.

mod backoff;
mod endpoint;

pub use endpoint::{Endpoint, MAX_UNIX_PATH_LEN};

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::ShipError;
use backoff::BackoffState;
use endpoint::ActiveConnection;

/// Cancellation is observed at least this often while sleeping.
const CANCEL_GRANULARITY: Duration = Duration::from_millis(100);

/// Result of [`SocketClient::read`].
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The client was stopped; no further reads will succeed.
    Stopped,
    /// Number of bytes read. Zero means the peer half-closed or nothing was
    /// available.
    Bytes(usize),
}

/// Client side of the collector connection.
///
/// Reads and writes are independent; writes are serialised by the send
/// mutex, and connection setup/teardown by the fd mutex. The cancellation
/// flag is atomic and checked without locking.
pub struct SocketClient {
    endpoint: Endpoint,
    conn: Mutex<Option<ActiveConnection>>,
    conn_ready: Condvar,
    connect_lock: Mutex<()>,
    send_lock: Mutex<()>,
    backoff: Mutex<BackoffState>,
    retry_timeout: Duration,
    stopped: AtomicBool,
    connect_attempts: AtomicUsize,
}

enum Wait {
    Stopped,
    Ready(ActiveConnection),
}

impl SocketClient {
    /// Create a client for `endpoint`. `connect_retry_timeout` bounds each
    /// connect's retry loop and must be non-zero.
    pub fn new(endpoint: Endpoint, connect_retry_timeout: Duration) -> Result<Self, ShipError> {
        if connect_retry_timeout.is_zero() {
            return Err(ShipError::InvalidArgument(
                "connect retry timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            endpoint,
            conn: Mutex::new(None),
            conn_ready: Condvar::new(),
            connect_lock: Mutex::new(()),
            send_lock: Mutex::new(()),
            backoff: Mutex::new(BackoffState::new()),
            retry_timeout: connect_retry_timeout,
            stopped: AtomicBool::new(false),
            connect_attempts: AtomicUsize::new(0),
        })
    }

    /// Ensure a live connection, retrying with backoff until success, the
    /// retry budget expires, or the client is stopped. Budget expiry is not
    /// an error here; a following `send` or `read` will report the missing
    /// connection.
    pub fn connect(&self) {
        if self.is_stopped() || self.conn.lock().is_some() {
            return;
        }
        let _connecting = self.connect_lock.lock();
        if self.conn.lock().is_some() {
            return;
        }
        let start = Instant::now();
        while !self.is_stopped() {
            let attempt = self.connect_attempts.fetch_add(1, Ordering::Relaxed);
            match self.endpoint.connect() {
                Ok(conn) => {
                    let mut slot = self.conn.lock();
                    if self.is_stopped() {
                        conn.shutdown();
                        return;
                    }
                    debug!("SocketClient: connected to {}", self.endpoint);
                    *slot = Some(conn);
                    self.conn_ready.notify_all();
                    return;
                }
                Err(err) => {
                    debug!("SocketClient: connect to {} failed: {err}", self.endpoint);
                    let elapsed = start.elapsed();
                    if elapsed >= self.retry_timeout {
                        warn!(
                            "SocketClient: connect retries exhausted after {:?}",
                            self.retry_timeout
                        );
                        return;
                    }
                    let delay = self
                        .backoff
                        .lock()
                        .next_delay(attempt, self.retry_timeout - elapsed);
                    trace!("SocketClient: backing off {delay:?} before reconnect");
                    self.sleep_cancellable(delay);
                    if start.elapsed() >= self.retry_timeout {
                        warn!(
                            "SocketClient: connect retries exhausted after {:?}",
                            self.retry_timeout
                        );
                        return;
                    }
                }
            }
        }
    }

    /// Write the whole buffer. A zero-length send is a no-op. Connects
    /// first; any write failure closes the connection and is reported as a
    /// socket error.
    pub fn send(&self, bytes: &[u8]) -> Result<(), ShipError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.connect();
        let mut stream = {
            let slot = self.conn.lock();
            match slot.as_ref() {
                Some(conn) => conn
                    .try_clone()
                    .map_err(|err| ShipError::socket("clone", err))?,
                None => {
                    return Err(ShipError::socket(
                        "send",
                        io::Error::new(io::ErrorKind::NotConnected, "no active connection"),
                    ))
                }
            }
        };
        let _sending = self.send_lock.lock();
        match stream.write_all(bytes) {
            Ok(()) => {
                trace!("SocketClient: sent {} bytes", bytes.len());
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(ShipError::socket("send", err))
            }
        }
    }

    /// Read once into `buf`. Waits up to `timeout` for a connection to
    /// appear, then blocks until data arrives, the peer half-closes (zero
    /// bytes, connection closed), or the client is stopped.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome, ShipError> {
        if buf.is_empty() {
            return Err(ShipError::InvalidArgument(
                "read buffer must not be empty".into(),
            ));
        }
        if self.is_stopped() {
            return Ok(ReadOutcome::Stopped);
        }
        let mut stream = match self.wait_for_connection(timeout)? {
            Wait::Stopped => return Ok(ReadOutcome::Stopped),
            Wait::Ready(stream) => stream,
        };
        match stream.read(buf) {
            Ok(0) => {
                debug!("SocketClient: peer closed the connection");
                self.close();
                Ok(ReadOutcome::Bytes(0))
            }
            Ok(n) => {
                trace!("SocketClient: read {n} bytes");
                Ok(ReadOutcome::Bytes(n))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::Bytes(0)),
            Err(err) => {
                self.close();
                Err(ShipError::socket("read", err))
            }
        }
    }

    /// Set the cancellation flag, wake fd-ready waiters, and close the
    /// connection. Idempotent; callable from any thread.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("SocketClient: stop");
        }
        {
            let _slot = self.conn.lock();
            self.conn_ready.notify_all();
        }
        self.close();
    }

    /// Shut down and release the connection, if any.
    pub fn close(&self) {
        let mut slot = self.conn.lock();
        if let Some(conn) = slot.take() {
            debug!("SocketClient: shutdown and close connection");
            conn.shutdown();
        }
    }

    /// Number of connect attempts made so far. Exposed for tests.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn wait_for_connection(&self, timeout: Duration) -> Result<Wait, ShipError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.conn.lock();
        while slot.is_none() && !self.is_stopped() {
            if self.conn_ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        if self.is_stopped() {
            return Ok(Wait::Stopped);
        }
        match slot.as_ref() {
            Some(conn) => conn
                .try_clone()
                .map(Wait::Ready)
                .map_err(|err| ShipError::socket("clone", err)),
            None => Err(ShipError::socket(
                "read",
                io::Error::new(io::ErrorKind::TimedOut, "socket not ready"),
            )),
        }
    }

    fn sleep_cancellable(&self, total: Duration) {
        let mut remaining = total;
        while !self.is_stopped() && !remaining.is_zero() {
            let slice = remaining.min(CANCEL_GRANULARITY);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.stop();
    }
}
