//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod mock_collector;

use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` elapses. Returns the final
/// evaluation.
pub fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
