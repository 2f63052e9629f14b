//! Asynchronous shipper: callers enqueue, worker threads deliver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::cache::PendingCache;
use crate::client::SocketClient;
use crate::error::ShipError;
use crate::queue::BoundedQueue;
use crate::reader::AckReader;
use crate::record::Record;
use crate::resender::ResendWorker;
use crate::sender::SendWorker;

use super::config::ShipperConfig;

/// Buffered, asynchronous shipper.
///
/// `add` enqueues and returns; a sender thread drains the queue to the
/// collector, a reader thread consumes acks, and, when caching is enabled,
/// a resender thread retransmits anything unacknowledged. Workers start on
/// the first `add` and are stopped and joined on drop.
pub struct BufferedShipper {
    client: Arc<SocketClient>,
    cache: Option<Arc<PendingCache>>,
    queue: Arc<BoundedQueue<Arc<Record>>>,
    sender: Arc<SendWorker>,
    resender: Option<Arc<ResendWorker>>,
    reader: Arc<AckReader>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sender_done_tx: Mutex<Option<Sender<()>>>,
    sender_done_rx: Receiver<()>,
    start: Once,
    started: AtomicBool,
}

impl BufferedShipper {
    pub fn new(config: ShipperConfig) -> Result<Self, ShipError> {
        config.validate()?;
        let client = Arc::new(SocketClient::new(
            config.endpoint.clone(),
            config.connect_retry_timeout,
        )?);
        let cache = config
            .caching_enabled()
            .then(|| Arc::new(PendingCache::new()));
        let queue = Arc::new(BoundedQueue::new(config.buffer_limit));
        let sender = Arc::new(SendWorker::new(
            Arc::clone(&client),
            cache.clone(),
            Arc::clone(&queue),
        ));
        let resender = match &cache {
            Some(cache) => Some(Arc::new(ResendWorker::new(
                Arc::clone(&client),
                Arc::clone(cache),
                config.ack_timeout,
                config.resend_interval,
            )?)),
            None => None,
        };
        let reader = Arc::new(AckReader::new(Arc::clone(&client), cache.clone()));
        let (sender_done_tx, sender_done_rx) = bounded(1);
        Ok(Self {
            client,
            cache,
            queue,
            sender,
            resender,
            reader,
            workers: Mutex::new(Vec::new()),
            sender_done_tx: Mutex::new(Some(sender_done_tx)),
            sender_done_rx,
            start: Once::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Enqueue a record. Starts the worker threads on first use. When the
    /// queue is bounded and full, the oldest queued record is dropped to
    /// make room, observable only through the send counters.
    pub fn add(&self, record: Record) {
        self.start.call_once(|| self.start_workers());
        self.queue.push(Arc::new(record));
    }

    /// Mark the ingestion queue terminal and wait for the sender thread to
    /// drain it. Returns `true` when the sender finished within `timeout`.
    pub fn wait_until_all_sent(&self, timeout: Duration) -> bool {
        self.queue.stop_once_drained();
        if !self.started.load(Ordering::Acquire) {
            return true;
        }
        match self.sender_done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Total ack items processed by the reader.
    pub fn tags_read(&self) -> usize {
        self.reader.tags_read()
    }

    /// Total send attempts, sender and resender combined.
    pub fn total_send(&self) -> usize {
        self.sender.attempts() + self.total_resend()
    }

    /// Successful sends by the sender thread.
    pub fn total_send_success(&self) -> usize {
        self.sender.successes()
    }

    /// Records retransmitted by the resender.
    pub fn total_resend(&self) -> usize {
        self.resender.as_ref().map_or(0, |r| r.resends())
    }

    /// Records currently awaiting an ack.
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    fn start_workers(&self) {
        let mut workers = self.workers.lock();

        let sender = Arc::clone(&self.sender);
        let done_tx = self.sender_done_tx.lock().take();
        workers.push(thread::spawn(move || {
            sender.run();
            if let Some(tx) = done_tx {
                let _ = tx.send(());
            }
        }));

        let reader = Arc::clone(&self.reader);
        workers.push(thread::spawn(move || reader.run()));

        if let Some(resender) = &self.resender {
            let resender = Arc::clone(resender);
            workers.push(thread::spawn(move || {
                resender.run();
            }));
        }

        debug!("BufferedShipper: started {} worker threads", workers.len());
        self.started.store(true, Ordering::Release);
    }

    /// Stop everything in dependency order and join the workers.
    fn shutdown(&self) {
        self.client.stop();
        self.queue.stop_once_drained();
        self.sender.stop();
        if let Some(resender) = &self.resender {
            resender.stop();
        }
        self.reader.stop();

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("BufferedShipper: worker thread panicked");
            }
        }
    }
}

impl Drop for BufferedShipper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
