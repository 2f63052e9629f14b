//! End-to-end tests for the synchronous shipper.

#![cfg(unix)]

mod support;

use std::time::Duration;

use logship::{DirectShipper, DjsonBuilder, Endpoint, ShipperConfig};
use support::{mock_collector::MockCollector, wait_for};

fn cached_config(path: &std::path::Path) -> ShipperConfig {
    ShipperConfig::new(Endpoint::unix(path).expect("endpoint"))
        .with_ack_timeout(Duration::from_secs(100))
        .with_resend_interval(Duration::from_millis(100))
        .with_connect_retry_timeout(Duration::from_millis(100))
}

#[test]
fn inline_send_is_acked_and_leaves_the_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("direct-sock");
    let collector = MockCollector::start(&path);
    let shipper = DirectShipper::new(cached_config(&path)).expect("shipper");

    assert!(shipper.send_djson("testsource", "1,[[\"msg\",\"FT_STRING\"]],[\"hello\"]"));
    assert!(
        wait_for(|| shipper.cache_len() == 0, Duration::from_secs(5)),
        "the ack must clear the cache"
    );
    assert!(shipper.tags_read() >= 1);
    assert!(shipper.total_send() >= 1);
    assert_eq!(collector.unique_payloads(), 1);
}

#[test]
fn typed_records_send_inline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("typed-sock");
    let collector = MockCollector::start(&path);
    let shipper = DirectShipper::new(cached_config(&path)).expect("shipper");

    let record = DjsonBuilder::new("testsource")
        .int64_field("count", 9)
        .str_field("msg", "typed")
        .build()
        .expect("build record");
    shipper.send_record(record).expect("inline send");
    assert!(wait_for(|| shipper.cache_len() == 0, Duration::from_secs(5)));
    assert!(collector.has_payload_containing("typed"));
}

#[test]
fn failed_inline_send_is_erased_so_the_caller_can_retry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("down-sock");
    let config = ShipperConfig::new(Endpoint::unix(&path).expect("endpoint"))
        .with_ack_timeout(Duration::from_secs(100))
        .with_resend_interval(Duration::from_secs(60))
        .with_connect_retry_timeout(Duration::from_millis(1));
    let shipper = DirectShipper::new(config).expect("shipper");

    assert!(!shipper.send_djson("testsource", "1,[[\"msg\",\"FT_STRING\"]],[\"lost\"]"));
    assert_eq!(
        shipper.cache_len(),
        0,
        "a failed inline send must not leave its record cached"
    );
    assert_eq!(shipper.total_send(), 0);
}

#[test]
fn empty_inputs_are_rejected_without_sending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("unused-sock");
    let config = ShipperConfig::new(Endpoint::unix(&path).expect("endpoint"))
        .with_connect_retry_timeout(Duration::from_millis(1));
    let shipper = DirectShipper::new(config).expect("shipper");

    assert!(!shipper.send_djson("", "1,[],[]"));
    assert!(!shipper.send_djson("testsource", ""));
    assert_eq!(shipper.total_send(), 0);
}
