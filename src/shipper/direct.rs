//! Synchronous shipper: the caller's thread sends inline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};
use parking_lot::Mutex;

use crate::cache::PendingCache;
use crate::client::SocketClient;
use crate::error::ShipError;
use crate::reader::AckReader;
use crate::record::Record;
use crate::resender::ResendWorker;

use super::config::ShipperConfig;

/// Synchronous shipper.
///
/// Sends happen on the caller's thread, with the same caching discipline
/// the buffered sender uses; the ack reader and, when caching is enabled,
/// the resender run in the background. If an inline send fails, the entry
/// just inserted into the cache is erased again so the caller can retry
/// without duplicating.
pub struct DirectShipper {
    client: Arc<SocketClient>,
    cache: Option<Arc<PendingCache>>,
    reader: Arc<AckReader>,
    resender: Option<Arc<ResendWorker>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    start: Once,
    total_send: AtomicUsize,
}

impl DirectShipper {
    pub fn new(config: ShipperConfig) -> Result<Self, ShipError> {
        config.validate()?;
        let client = Arc::new(SocketClient::new(
            config.endpoint.clone(),
            config.connect_retry_timeout,
        )?);
        let cache = config
            .caching_enabled()
            .then(|| Arc::new(PendingCache::new()));
        let reader = Arc::new(AckReader::new(Arc::clone(&client), cache.clone()));
        let resender = match &cache {
            Some(cache) => Some(Arc::new(ResendWorker::new(
                Arc::clone(&client),
                Arc::clone(cache),
                config.ack_timeout,
                config.resend_interval,
            )?)),
            None => None,
        };
        Ok(Self {
            client,
            cache,
            reader,
            resender,
            workers: Mutex::new(Vec::new()),
            start: Once::new(),
            total_send: AtomicUsize::new(0),
        })
    }

    /// Send a record built from a pre-composed `schemaId,schemaArray,
    /// dataArray` body. Returns `true` on success; any failure is logged
    /// and reported as `false`.
    pub fn send_djson(&self, source: &str, schema_and_data: &str) -> bool {
        if source.is_empty() {
            error!("DirectShipper: unexpected empty source name");
            return false;
        }
        if schema_and_data.is_empty() {
            error!("DirectShipper: unexpected empty record body");
            return false;
        }
        match Record::djson(source, schema_and_data)
            .and_then(|record| self.send_record(record))
        {
            Ok(()) => true,
            Err(err) => {
                error!("DirectShipper: send failed: {err}");
                false
            }
        }
    }

    /// Send one record inline, caching it first when caching is enabled.
    pub fn send_record(&self, record: Record) -> Result<(), ShipError> {
        self.start.call_once(|| self.start_workers());
        let record = Arc::new(record);
        match &self.cache {
            None => {
                self.client.send(record.wire_bytes())?;
                self.total_send.fetch_add(1, Ordering::Relaxed);
            }
            Some(cache) => {
                // Cache before sending, then re-fetch: the reader must be
                // able to observe the entry before any ack for it can
                // arrive.
                record.touch();
                let tag = record.tag().to_owned();
                cache.insert(tag.clone(), record);
                let Some(cached) = cache.get(&tag) else {
                    return Ok(());
                };
                if let Err(err) = self.client.send(cached.wire_bytes()) {
                    let erased = cache.erase(&tag);
                    trace!(
                        "DirectShipper: send failed for tag '{tag}', erased={erased} so the caller can retry"
                    );
                    return Err(err);
                }
                self.total_send.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Total ack items processed by the reader.
    pub fn tags_read(&self) -> usize {
        self.reader.tags_read()
    }

    /// Total sends, inline and resender combined.
    pub fn total_send(&self) -> usize {
        self.total_send.load(Ordering::Relaxed) + self.total_resend()
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

        let reader = Arc::clone(&self.reader);
        workers.push(thread::spawn(move || reader.run()));

        if let Some(resender) = &self.resender {
            let resender = Arc::clone(resender);
            workers.push(thread::spawn(move || {
                resender.run();
            }));
        }
        debug!("DirectShipper: started {} worker threads", workers.len());
    }

    fn shutdown(&self) {
        self.client.stop();
        if let Some(resender) = &self.resender {
            resender.stop();
        }
        self.reader.stop();

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("DirectShipper: worker thread panicked");
            }
        }
    }
}

impl Drop for DirectShipper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
