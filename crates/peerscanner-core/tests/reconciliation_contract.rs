//! Contract Test: Startup Reconciliation
//!
//! Constraints verified:
//! - Group records matched to a host are never deleted
//! - Every unmatched group record receives exactly one delete, including
//!   records whose content is not an address
//! - A failed delete does not stop sibling deletes
//! - Lifecycle tasks start only after all deletes finished
//! - A failed zone listing is fatal
//! - The result does not depend on listing order

mod common;

use common::*;
use peerscanner_core::{Error, HostKey, HostRegistry, RotationGroup};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Registry whose hosts never get past their first probe
fn frozen_registry(zone: Vec<peerscanner_core::Record>) -> (Arc<HostRegistry>, Arc<MockDnsProvider>, Journal) {
    let journal = Journal::default();
    let provider = Arc::new(MockDnsProvider::new(zone, journal.clone()));
    let prober = Arc::new(PendingProber::new(journal.clone()));
    let registry = registry_with(provider.clone(), prober, fast_lifecycle());
    (registry, provider, journal)
}

#[tokio::test]
async fn peer_with_matching_group_record_is_kept() {
    // Scenario A
    let peer = "a".repeat(32);
    let (registry, provider, journal) = frozen_registry(vec![
        record("1", &peer, "1.2.3.4"),
        record("2", "atest_apeers", "1.2.3.4"),
    ]);

    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.hosts, 1);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.orphans, 0);
    assert_eq!(provider.destroy_call_count(), 0);
    assert!(journal.destroyed_ids().is_empty());

    let host = registry.get(&peer, ip("1.2.3.4")).expect("host loaded");
    assert_eq!(host.record().await.map(|r| r.id), Some("1".to_string()));

    let memberships = host.memberships().await;
    let peers = memberships
        .iter()
        .find(|m| m.group == RotationGroup::Peers)
        .expect("peer hosts belong to the peers group");
    assert_eq!(peers.existing.as_ref().map(|r| r.id.as_str()), Some("2"));
    let round_robin = memberships
        .iter()
        .find(|m| m.group == RotationGroup::RoundRobin)
        .unwrap();
    assert!(round_robin.existing.is_none());
}

#[tokio::test]
async fn orphaned_fallback_group_record_is_deleted() {
    // Scenario B
    let (registry, provider, journal) =
        frozen_registry(vec![record("9", "atest_fallbacks", "9.9.9.9")]);

    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.hosts, 0);
    assert_eq!(summary.orphans, 1);
    assert_eq!(summary.orphans_removed, 1);
    assert!(registry.is_empty());
    assert_eq!(journal.destroyed_ids(), vec!["9".to_string()]);
    assert!(provider.zone().is_empty());
}

#[tokio::test]
async fn each_orphan_is_deleted_exactly_once() {
    let (registry, provider, journal) = frozen_registry(vec![
        record("h1", "peer-one", "10.0.0.1"),
        record("h2", "fl-two", "10.0.0.2"),
        record("rr1", "atest_roundrobin", "10.0.0.1"),
        record("rr2", "atest_roundrobin", "10.0.0.2"),
        record("rr3", "atest_roundrobin", "10.0.0.3"),
        record("p1", "atest_apeers", "10.0.0.1"),
        // Peers group entry for a fallback's address has no matching membership
        record("p2", "atest_apeers", "10.0.0.2"),
        record("f2", "atest_fallbacks", "10.0.0.2"),
        record("f4", "atest_fallbacks", "10.0.0.4"),
        record("www", "www", "10.0.0.9"),
    ]);

    let summary = assert_ok!(registry.load().await);

    let mut destroyed = journal.destroyed_ids();
    destroyed.sort();
    assert_eq!(destroyed, vec!["f4", "p2", "rr3"]);
    assert_eq!(provider.destroy_call_count(), 3);
    assert_eq!(summary.matched, 4);
    assert_eq!(summary.unrecognized, 1);
    assert_eq!(registry.len(), 2);

    // The unrecognized record is left alone
    assert_eq!(provider.find("www", "10.0.0.9").len(), 1);
}

#[tokio::test]
async fn failed_delete_does_not_abort_siblings() {
    let journal = Journal::default();
    let provider = Arc::new(
        MockDnsProvider::new(
            vec![
                record("o1", "atest_roundrobin", "1.1.1.1"),
                record("o2", "atest_roundrobin", "2.2.2.2"),
                record("o3", "atest_apeers", "3.3.3.3"),
            ],
            journal.clone(),
        )
        .fail_destroy_of("o2"),
    );
    let registry = registry_with(
        provider.clone(),
        Arc::new(PendingProber::new(journal.clone())),
        fast_lifecycle(),
    );

    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.orphans, 3);
    assert_eq!(summary.orphans_removed, 2);
    assert_eq!(provider.destroy_call_count(), 3);
    let remaining: Vec<String> = provider.zone().into_iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec!["o2".to_string()]);
}

#[tokio::test]
async fn hosts_start_only_after_all_deletes_finish() {
    let journal = Journal::default();
    let provider = Arc::new(
        MockDnsProvider::new(
            vec![
                record("h1", "peer-one", "10.0.0.1"),
                record("h2", "peer-two", "10.0.0.2"),
                record("o1", "atest_roundrobin", "10.1.0.1"),
                record("o2", "atest_apeers", "10.1.0.2"),
            ],
            journal.clone(),
        )
        .with_destroy_delay(Duration::from_millis(100)),
    );
    let prober = Arc::new(ScriptedProber::new(true, journal.clone()));
    let registry = registry_with(provider.clone(), prober, fast_lifecycle());

    assert_ok!(registry.load().await);
    assert!(eventually(|| journal.probe_count() >= 2).await);

    let ops = journal.ops();
    let last_destroy = ops
        .iter()
        .rposition(|op| matches!(op, Op::Destroy { .. }))
        .expect("orphans destroyed");
    let first_probe = ops
        .iter()
        .position(|op| matches!(op, Op::Probe { .. }))
        .expect("hosts probed");
    assert!(
        last_destroy < first_probe,
        "lifecycle started before orphan cleanup finished: {:?}",
        ops
    );
}

#[tokio::test]
async fn deletes_run_concurrently() {
    let journal = Journal::default();
    let zone = (0..10)
        .map(|i| record(&format!("o{i}"), "atest_roundrobin", &format!("10.2.0.{i}")))
        .collect();
    let provider = Arc::new(
        MockDnsProvider::new(zone, journal.clone()).with_destroy_delay(Duration::from_millis(200)),
    );
    let registry = registry_with(
        provider.clone(),
        Arc::new(PendingProber::new(journal.clone())),
        fast_lifecycle(),
    );

    let started = std::time::Instant::now();
    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.orphans_removed, 10);
    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "deletes appear to be sequential: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let journal = Journal::default();
    let provider = Arc::new(
        MockDnsProvider::new(vec![record("o1", "atest_apeers", "1.1.1.1")], journal.clone())
            .fail_listing(),
    );
    let registry = registry_with(
        provider.clone(),
        Arc::new(PendingProber::new(journal.clone())),
        fast_lifecycle(),
    );

    let err = assert_err!(registry.load().await);
    assert!(matches!(err, Error::Reconcile(_)));
    assert!(registry.is_empty());
    assert_eq!(provider.destroy_call_count(), 0);
}

#[tokio::test]
async fn zone_loads_only_once() {
    let (registry, _provider, _journal) =
        frozen_registry(vec![record("h1", "peer-one", "10.0.0.1")]);

    assert_ok!(registry.load().await);
    let err = assert_err!(registry.load().await);
    assert!(matches!(err, Error::Reconcile(_)));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn non_address_host_records_are_ignored() {
    let (registry, provider, _journal) = frozen_registry(vec![
        record("c1", "peer-alias", "target.example.org"),
    ]);

    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.hosts, 0);
    assert_eq!(summary.unrecognized, 1);
    assert_eq!(provider.destroy_call_count(), 0);
}

#[tokio::test]
async fn non_address_group_record_is_deleted_once() {
    let (registry, provider, journal) = frozen_registry(vec![
        record("h1", "peer-one", "10.0.0.1"),
        record("p1", "atest_apeers", "10.0.0.1"),
        record("g1", "atest_apeers", "not-an-ip"),
    ]);

    let summary = assert_ok!(registry.load().await);

    assert_eq!(summary.hosts, 1);
    assert_eq!(summary.orphans, 1);
    assert_eq!(summary.orphans_removed, 1);
    assert_eq!(provider.destroy_call_count(), 1);
    assert_eq!(journal.destroyed_ids(), vec!["g1".to_string()]);
    assert!(provider.find("atest_apeers", "not-an-ip").is_empty());
}

#[tokio::test]
async fn reconciliation_is_invariant_under_listing_order() {
    let zone = vec![
        record("h1", "peer-one", "10.0.0.1"),
        record("h2", "fl-two", "10.0.0.2"),
        record("h3", &"b".repeat(32), "10.0.0.3"),
        record("rr1", "atest_roundrobin", "10.0.0.1"),
        record("rr2", "atest_roundrobin", "10.0.0.2"),
        record("rr5", "atest_roundrobin", "10.0.0.5"),
        record("p3", "atest_apeers", "10.0.0.3"),
        record("p6", "atest_apeers", "10.0.0.6"),
        record("f2", "atest_fallbacks", "10.0.0.2"),
        record("f7", "atest_fallbacks", "10.0.0.7"),
        record("mx", "mail", "10.0.0.8"),
    ];

    let mut outcomes = Vec::new();
    for rotation in 0..zone.len() {
        let mut permuted = zone.clone();
        permuted.rotate_left(rotation);
        if rotation % 2 == 1 {
            permuted.reverse();
        }

        let (registry, _provider, journal) = frozen_registry(permuted);
        assert_ok!(registry.load().await);

        let hosts: BTreeSet<HostKey> = registry.hosts().iter().map(|h| h.key().clone()).collect();
        let deleted: BTreeSet<String> = journal.destroyed_ids().into_iter().collect();
        outcomes.push((hosts, deleted));
    }

    let (first_hosts, first_deleted) = &outcomes[0];
    assert_eq!(first_hosts.len(), 3);
    assert_eq!(
        first_deleted,
        &["f7", "p6", "rr5"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
    );
    for (hosts, deleted) in &outcomes[1..] {
        assert_eq!(hosts, first_hosts);
        assert_eq!(deleted, first_deleted);
    }
}
