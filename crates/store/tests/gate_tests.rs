//! Gate behavior under concurrent first-use provisioning.
//!
//! No database needed: the provision closure is a counter, and the assertion
//! is that a storm of parallel callers runs it exactly once.

use silo_store::{ResourceLedger, StateError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_parallel_cold_start_provisions_once() {
    let ledger = ResourceLedger::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let ledger = Arc::clone(&ledger);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            ledger
                .ensure_exists("T:public-acme-state", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Hold the gate long enough for every other task to queue.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_resources_provision_independently() {
    let ledger = ResourceLedger::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for tenant in ["alpha", "beta", "gamma", "delta"] {
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            let calls = Arc::clone(&calls);
            let key = format!("T:public-{tenant}-state");
            handles.push(tokio::spawn(async move {
                ledger
                    .ensure_exists(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // One provisioning run per distinct resource key.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_invalidation_forces_reprovisioning() {
    let ledger = ResourceLedger::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let provision = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    };

    let claim = ledger
        .ensure_exists("S:acme-public", provision.clone())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A live ledger entry short-circuits.
    ledger
        .ensure_exists("S:acme-public", provision.clone())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // After invalidation (e.g. the schema was found missing mid-write), the
    // next caller must provision again.
    claim.invalidate().await;
    ledger
        .ensure_exists("S:acme-public", provision)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_provisioning_failure_is_retryable() {
    let ledger = ResourceLedger::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let result = {
        let attempts = Arc::clone(&attempts);
        ledger
            .ensure_exists("T:public-flaky-state", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(StateError::ResourceMissing(
                    "\"public\".\"flaky-state\"".to_string(),
                ))
            })
            .await
    };
    assert!(result.is_err());

    // The failure left no ledger entry, so the retry provisions again and
    // succeeds.
    let attempts_clone = Arc::clone(&attempts);
    ledger
        .ensure_exists("T:public-flaky-state", move || async move {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
