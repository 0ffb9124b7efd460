//! 冷却存储集成测试：多个独立实例竞争同一个键

use std::sync::{Arc, Barrier};
use std::thread;

use ccdc_alert::{AlertFingerprint, CooldownDecision, CooldownStore, LockMode, Severity};
use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

#[test]
fn test_concurrent_submissions_allow_exactly_one() {
    let temp = tempdir().unwrap();
    let dir = temp.path().to_path_buf();
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let dir = dir.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // 每个线程一个独立实例，模拟独立进程
                let store = CooldownStore::with_mode(dir, LockMode::Exclusive);
                let fp = AlertFingerprint::of("hostA", "ssh brute force");
                barrier.wait();
                store.should_send(Severity::Critical, &fp, 300)
            })
        })
        .collect();

    let allowed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|allowed| *allowed)
        .count();

    assert_eq!(allowed, 1);
}

#[test]
fn test_distinct_keys_do_not_interfere() {
    let temp = tempdir().unwrap();
    let store = CooldownStore::with_mode(temp.path(), LockMode::Exclusive);
    let fp = AlertFingerprint::of("hostA", "ssh brute force");
    let other = AlertFingerprint::of("hostB", "ssh brute force");

    assert!(store.should_send(Severity::Critical, &fp, 300));
    assert!(store.should_send(Severity::Warning, &fp, 300));
    assert!(store.should_send(Severity::Critical, &other, 300));
    assert!(!store.should_send(Severity::Critical, &fp, 300));
}

#[test]
fn test_window_timeline() {
    let temp = tempdir().unwrap();
    let store = CooldownStore::with_mode(temp.path(), LockMode::Exclusive);
    let fp = AlertFingerprint::of("hostA", "disk full");
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert_eq!(
        store.decide_at(Severity::Warning, &fp, 300, t0),
        CooldownDecision::Allowed
    );
    assert!(matches!(
        store.decide_at(Severity::Warning, &fp, 300, t0 + Duration::seconds(100)),
        CooldownDecision::Suppressed { remaining_secs: 200 }
    ));
    assert_eq!(
        store.decide_at(Severity::Warning, &fp, 300, t0 + Duration::seconds(301)),
        CooldownDecision::Allowed
    );
    // 新窗口从 301s 开始
    assert!(!store
        .decide_at(Severity::Warning, &fp, 300, t0 + Duration::seconds(400))
        .is_allowed());
}

#[test]
fn test_record_file_format() {
    let temp = tempdir().unwrap();
    let store = CooldownStore::with_mode(temp.path(), LockMode::Exclusive);
    let fp = AlertFingerprint::of("hostA", "disk full");

    assert!(store.should_send(Severity::Info, &fp, 300));

    let path = temp
        .path()
        .join(format!("last_alert_info_{}.json", fp.as_str()));
    let content = std::fs::read_to_string(path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    assert!(value["datetime"].is_string());
}
