//! Minimal collector double.
//!
//! Listens on a Unix domain socket, parses the length-prefixed DJSON frames
//! the shipper emits, records every distinct data payload, and writes back a
//! `<tag>\n` ack per frame. `disconnect`/`resume` simulate a collector
//! outage while keeping the accumulated counters, so a test can assert on
//! everything seen across a restart.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Default)]
struct Shared {
    total_bytes: AtomicUsize,
    tags_acked: AtomicUsize,
    payloads: Mutex<HashSet<String>>,
}

pub struct MockCollector {
    path: PathBuf,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    conn_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockCollector {
    pub fn start(path: impl AsRef<Path>) -> Self {
        let mut collector = Self {
            path: path.as_ref().to_path_buf(),
            shared: Arc::new(Shared::default()),
            stop: Arc::new(AtomicBool::new(false)),
            accept_thread: None,
            conn_threads: Arc::new(Mutex::new(Vec::new())),
        };
        collector.bind_and_accept();
        collector
    }

    /// Close the listener and all live connections. Counters are kept.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            handle.join().expect("accept thread");
        }
        let mut conns = self.conn_threads.lock().expect("conn threads lock");
        for handle in conns.drain(..) {
            handle.join().expect("connection thread");
        }
        let _ = std::fs::remove_file(&self.path);
    }

    /// Bind the socket again after a `disconnect`.
    pub fn resume(&mut self) {
        self.bind_and_accept();
    }

    pub fn unique_payloads(&self) -> usize {
        self.shared.payloads.lock().expect("payloads lock").len()
    }

    pub fn has_payload_containing(&self, needle: &str) -> bool {
        self.shared
            .payloads
            .lock()
            .expect("payloads lock")
            .iter()
            .any(|p| p.contains(needle))
    }

    pub fn tags_acked(&self) -> usize {
        self.shared.tags_acked.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> usize {
        self.shared.total_bytes.load(Ordering::SeqCst)
    }

    fn bind_and_accept(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path).expect("bind mock collector socket");
        listener
            .set_nonblocking(true)
            .expect("nonblocking listener");
        self.stop.store(false, Ordering::SeqCst);

        let stop = Arc::clone(&self.stop);
        let shared = Arc::clone(&self.shared);
        let conns = Arc::clone(&self.conn_threads);
        self.accept_thread = Some(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let stop = Arc::clone(&stop);
                        let shared = Arc::clone(&shared);
                        let handle = thread::spawn(move || serve_connection(stream, shared, stop));
                        conns.lock().expect("conn threads lock").push(handle);
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        }));
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn serve_connection(mut stream: UnixStream, shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    stream
        .set_nonblocking(false)
        .expect("blocking connection stream");
    stream
        .set_read_timeout(Some(Duration::from_millis(50)))
        .expect("read timeout");
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                shared.total_bytes.fetch_add(n, Ordering::SeqCst);
                pending.extend_from_slice(&buf[..n]);
                while let Some((tag, payload, consumed)) = parse_frame(&pending) {
                    pending.drain(..consumed);
                    shared
                        .payloads
                        .lock()
                        .expect("payloads lock")
                        .insert(payload);
                    if stream.write_all(format!("{tag}\n").as_bytes()).is_ok() {
                        shared.tags_acked.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Parse one `<len>\n<body>` frame, returning the record's tag, its data
/// array rendered as a string, and the bytes consumed.
fn parse_frame(pending: &[u8]) -> Option<(String, String, usize)> {
    let newline = pending.iter().position(|b| *b == b'\n')?;
    let len: usize = std::str::from_utf8(&pending[..newline]).ok()?.parse().ok()?;
    let start = newline + 1;
    if pending.len() < start + len {
        return None;
    }
    let body = std::str::from_utf8(&pending[start..start + len]).expect("frame body is UTF-8");
    let value: serde_json::Value = serde_json::from_str(body).expect("frame body is JSON");
    let array = value.as_array().expect("frame body is a JSON array");
    assert_eq!(array.len(), 5, "DJSON record must have 5 elements");
    Some((array[1].to_string(), array[4].to_string(), start + len))
}
