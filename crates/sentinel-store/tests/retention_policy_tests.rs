//! Integration tests for retention eviction.

use sentinel_core::capture_filename;
use sentinel_store::{ImageStore, RetentionPolicy};
use time::{Duration, OffsetDateTime};

fn names(count: usize) -> Vec<String> {
    let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    (0..count)
        .map(|index| capture_filename(start + Duration::milliseconds(index as i64 * 250)))
        .collect()
}

#[test]
fn retention_policy_tests_keeps_k_most_recent() {
    for (keep, captures) in [(1_usize, 4_usize), (3, 10), (5, 6), (10, 25)] {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = ImageStore::new(dir.path().join("captures"));
        let policy = RetentionPolicy::new(keep);
        let written = names(captures);

        for name in &written {
            store.write(name, name.as_bytes()).expect("write should succeed");
            let report = policy.apply(&store).expect("retention should succeed");
            assert!(report.kept <= keep);
            assert_eq!(report.failed, 0);
        }

        let remaining: Vec<String> = store
            .list()
            .expect("list should succeed")
            .into_iter()
            .map(|image| image.filename)
            .collect();
        let expected: Vec<String> = written.iter().rev().take(keep).cloned().collect();
        assert_eq!(remaining, expected, "keep={keep} captures={captures}");
    }
}

#[test]
fn retention_policy_tests_below_capacity_evicts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());
    for name in names(2) {
        store.write(&name, b"jpeg").unwrap();
    }

    let report = RetentionPolicy::new(5).apply(&store).unwrap();
    assert_eq!(report.kept, 2);
    assert_eq!(report.evicted, 0);
}

#[test]
fn retention_policy_tests_shrinking_keep_applies_on_next_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());
    let policy = RetentionPolicy::new(10);
    let written = names(6);
    for name in &written {
        store.write(name, b"jpeg").unwrap();
    }
    assert_eq!(policy.apply(&store).unwrap().evicted, 0);

    policy.set_keep(3);
    let report = policy.apply(&store).unwrap();
    assert_eq!(report.evicted, 3);
    assert_eq!(store.list().unwrap()[0].filename, written[5]);
}
