//! Worker draining the ingestion queue into the socket client.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::cache::PendingCache;
use crate::client::SocketClient;
use crate::error::Interrupted;
use crate::queue::BoundedQueue;
use crate::record::Record;

/// Pops records off the shared queue and sends them, caching each one
/// first when a pending-ack cache is configured. A send failure is counted
/// but does not stop the loop; the cached record stays behind for the
/// resender.
pub(crate) struct SendWorker {
    client: Arc<SocketClient>,
    cache: Option<Arc<PendingCache>>,
    queue: Arc<BoundedQueue<Arc<Record>>>,
    stop: AtomicBool,
    attempts: AtomicUsize,
    successes: AtomicUsize,
}

impl SendWorker {
    pub fn new(
        client: Arc<SocketClient>,
        cache: Option<Arc<PendingCache>>,
        queue: Arc<BoundedQueue<Arc<Record>>>,
    ) -> Self {
        Self {
            client,
            cache,
            queue,
            stop: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
        }
    }

    /// Notify the loop to stop. Typically called from a thread other than
    /// the one running [`run`](Self::run).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Total send attempts, failures included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Total successful sends.
    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn run(&self) {
        match self.run_inner() {
            Ok(()) => debug!("SendWorker: ingestion queue drained, sender exiting"),
            Err(Interrupted) => debug!("SendWorker: interrupted, sender exiting"),
        }
    }

    fn run_inner(&self) -> Result<(), Interrupted> {
        while !self.stop.load(Ordering::Relaxed) {
            let Some(record) = self.queue.wait_and_pop() else {
                break;
            };
            self.interrupt_point()?;

            match &self.cache {
                None => self.send_one(&record),
                Some(cache) => {
                    // Cache before sending, then re-fetch: the reader must
                    // be able to observe the entry before any ack for it
                    // can arrive.
                    record.touch();
                    let tag = record.tag().to_owned();
                    cache.insert(tag.clone(), record);
                    if let Some(cached) = cache.get(&tag) {
                        self.interrupt_point()?;
                        self.send_one(&cached);
                    }
                }
            }
            self.interrupt_point()?;
        }
        Ok(())
    }

    fn send_one(&self, record: &Record) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match self.client.send(record.wire_bytes()) {
            Ok(()) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                debug!(
                    "SendWorker: send failed for tag '{}', leaving it for the resender: {err}",
                    record.tag()
                );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Endpoint;
    use rstest::rstest;
    use std::thread;
    use std::time::Duration;

    fn dead_client() -> Arc<SocketClient> {
        Arc::new(
            SocketClient::new(
                Endpoint::unix("/tmp/logship-sender-test-no-socket").expect("endpoint"),
                Duration::from_millis(1),
            )
            .expect("client"),
        )
    }

    fn record(n: usize) -> Arc<Record> {
        Arc::new(Record::djson("src", format!("1,[],[{n}]")).expect("record"))
    }

    #[rstest]
    fn failed_sends_count_attempts_but_not_successes() {
        let queue = Arc::new(BoundedQueue::new(0));
        let cache = Arc::new(PendingCache::new());
        for i in 0..5 {
            queue.push(record(i));
        }
        queue.stop_once_drained();

        let worker = SendWorker::new(dead_client(), Some(Arc::clone(&cache)), queue);
        worker.run();

        assert_eq!(worker.attempts(), 5);
        assert_eq!(worker.successes(), 0);
        assert_eq!(cache.len(), 5, "failed records must stay cached");
    }

    #[rstest]
    fn without_a_cache_nothing_is_retained() {
        let queue = Arc::new(BoundedQueue::new(0));
        for i in 0..3 {
            queue.push(record(i));
        }
        queue.stop_once_drained();

        let worker = SendWorker::new(dead_client(), None, queue);
        worker.run();
        assert_eq!(worker.attempts(), 3);
    }

    #[rstest]
    fn stop_interrupts_a_blocked_pop() {
        let queue: Arc<BoundedQueue<Arc<Record>>> = Arc::new(BoundedQueue::new(0));
        let worker = Arc::new(SendWorker::new(dead_client(), None, Arc::clone(&queue)));
        let handle = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.run())
        };
        thread::sleep(Duration::from_millis(50));
        worker.stop();
        queue.stop_once_drained();
        handle.join().expect("sender thread joins");
    }
}
