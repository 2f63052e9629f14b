//! Worker consuming acknowledgment frames from the collector.
//!
//! Ack frames are newline-delimited: either a bare `<tag>` or
//! `<tag>:<status>`. Status `0` is success; any other status is logged but
//! the tag is still considered resolved and removed from the pending-ack
//! cache.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};

use crate::cache::PendingCache;
use crate::client::{ReadOutcome, SocketClient};
use crate::error::Interrupted;

const READ_BUF_LEN: usize = 512;
/// How long each loop iteration waits for a connection before retrying.
const READ_READY_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) struct AckReader {
    client: Arc<SocketClient>,
    cache: Option<Arc<PendingCache>>,
    stop: AtomicBool,
    tags_read: AtomicUsize,
}

impl AckReader {
    pub fn new(client: Arc<SocketClient>, cache: Option<Arc<PendingCache>>) -> Self {
        Self {
            client,
            cache,
            stop: AtomicBool::new(false),
            tags_read: AtomicUsize::new(0),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Total ack items processed, successful or not.
    pub fn tags_read(&self) -> usize {
        self.tags_read.load(Ordering::Relaxed)
    }

    pub fn run(&self) {
        match self.run_inner() {
            Ok(()) => debug!("AckReader: socket client stopped, reader exiting"),
            Err(Interrupted) => debug!("AckReader: interrupted, reader exiting"),
        }
    }

    fn run_inner(&self) -> Result<(), Interrupted> {
        let mut pending = String::new();
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            self.interrupt_point()?;
            match self.client.read(&mut buf, READ_READY_TIMEOUT) {
                Ok(ReadOutcome::Stopped) => return Ok(()),
                Ok(ReadOutcome::Bytes(0)) => {}
                Ok(ReadOutcome::Bytes(n)) => {
                    self.interrupt_point()?;
                    pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                    self.drain_lines(&mut pending);
                }
                Err(err) => {
                    // The socket client reconnects on the send side; just
                    // keep polling.
                    debug!("AckReader: read failed, will retry: {err}");
                }
            }
        }
    }

    /// Process every complete line in `pending`, keeping the trailing
    /// partial line for the next read.
    fn drain_lines(&self, pending: &mut String) {
        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            self.process_ack(line.trim_end_matches('\n'));
        }
    }

    fn process_ack(&self, item: &str) {
        if item.is_empty() {
            warn!("AckReader: unexpected empty ack item");
            return;
        }
        self.tags_read.fetch_add(1, Ordering::Relaxed);
        match item.split_once(':') {
            None => self.resolve_tag(item),
            Some((tag, status)) => {
                if status.is_empty() {
                    warn!("AckReader: unexpected empty ack status for tag '{tag}'");
                    return;
                }
                if status != "0" {
                    error!(
                        "AckReader: collector reported {} for tag '{tag}'",
                        ack_status_name(status)
                    );
                }
                self.resolve_tag(tag);
            }
        }
    }

    fn resolve_tag(&self, tag: &str) {
        if tag.is_empty() {
            warn!("AckReader: unexpected empty tag");
            return;
        }
        if let Some(cache) = &self.cache {
            if cache.erase(tag) != 1 {
                warn!("AckReader: acked tag '{tag}' not found in the pending cache");
            }
        }
    }

    fn interrupt_point(&self) -> Result<(), Interrupted> {
        if self.stop.load(Ordering::Relaxed) {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

fn ack_status_name(code: &str) -> &'static str {
    match code {
        "0" => "ACK_SUCCESS",
        "1" => "ACK_FAILED",
        "2" => "ACK_UNKNOWN_SCHEMA_ID",
        "3" => "ACK_DECODE_ERROR",
        "4" => "ACK_INVALID_SOURCE",
        "5" => "ACK_DUPLICATE_SCHEMA_ID",
        _ => "ACK_UNKNOWN_CODE",
    }
}
