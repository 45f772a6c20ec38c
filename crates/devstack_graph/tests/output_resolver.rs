//! Tests for `OutputResolver` single-fire semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use devstack_graph::output::{Delivery, OutputResolver};
use devstack_graph::resource::{Outputs, ResourceId, keys};
use parking_lot::Mutex;

fn address(addr: &str) -> Outputs {
    Outputs::new().with(keys::ADDRESS, addr)
}

#[test]
fn every_early_subscriber_fires_exactly_once_in_order() {
    let resolver = OutputResolver::new();
    let id = ResourceId::from("broker");
    let log = Arc::new(Mutex::new(Vec::new()));

    for n in 0..5 {
        let log = Arc::clone(&log);
        assert_eq!(
            resolver.subscribe(&id, move |_| log.lock().push(n)),
            Delivery::Queued
        );
    }

    resolver.publish(&id, address("172.18.0.5"));
    assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);

    // Late subscriber sees the same outputs and earlier ones do not fire again.
    let late = Arc::clone(&log);
    resolver.subscribe(&id, move |out| {
        assert_eq!(out.address(), Some("172.18.0.5"));
        late.lock().push(99);
    });
    assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4, 99]);
}

#[test]
fn handles_share_the_published_value() {
    let resolver = OutputResolver::new();
    let id = ResourceId::from("mtz");
    let a = resolver.handle(&id);
    let b = resolver.handle(&id);
    assert!(!a.is_resolved());

    resolver.publish(&id, address("172.18.0.2"));
    let first = a.get().unwrap();
    let second = b.get().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.get(&id).unwrap().address(), Some("172.18.0.2"));
}

#[test]
fn subscribe_all_waits_for_every_resource() {
    let resolver = OutputResolver::new();
    let ids: Vec<ResourceId> = ["b1", "b2", "b3"].into_iter().map(Into::into).collect();
    let result = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&result);
    resolver.subscribe_all(&ids, move |outputs| {
        let addresses: Vec<String> = outputs
            .iter()
            .filter_map(|out| out.address().map(str::to_owned))
            .collect();
        *sink.lock() = Some(addresses);
    });

    resolver.publish(&ids[2], address("10.0.0.3"));
    resolver.publish(&ids[0], address("10.0.0.1"));
    assert!(result.lock().is_none());

    resolver.publish(&ids[1], address("10.0.0.2"));
    assert_eq!(
        result.lock().clone(),
        Some(vec![
            "10.0.0.1".to_string(),
            "10.0.0.2".to_string(),
            "10.0.0.3".to_string()
        ])
    );
}

#[test]
fn subscribe_all_never_fires_when_one_is_abandoned() {
    let resolver = OutputResolver::new();
    let ids: Vec<ResourceId> = ["b1", "b2"].into_iter().map(Into::into).collect();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    resolver.subscribe_all(&ids, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    resolver.publish(&ids[0], address("10.0.0.1"));
    resolver.abandon(&ids[1]);

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wait_suspends_until_publish() {
    let resolver = Arc::new(OutputResolver::new());
    let id = ResourceId::from("zk");
    let handle = resolver.handle(&id);

    let publisher = {
        let resolver = Arc::clone(&resolver);
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resolver.publish(&id, address("172.18.0.9"));
        })
    };

    let outputs = handle.wait().await.expect("published");
    assert_eq!(outputs.address(), Some("172.18.0.9"));
    publisher.await.unwrap();
}

#[tokio::test]
async fn wait_returns_none_when_abandoned() {
    let resolver = Arc::new(OutputResolver::new());
    let id = ResourceId::from("broken");
    let handle = resolver.handle(&id);

    let abandoner = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.abandon_pending();
        })
    };

    assert!(handle.wait().await.is_none());
    abandoner.await.unwrap();
}

#[tokio::test]
async fn wait_all_collects_in_request_order() {
    let resolver = Arc::new(OutputResolver::new());
    let ids: Vec<ResourceId> = ["b1", "b2"].into_iter().map(Into::into).collect();

    let publisher = {
        let resolver = Arc::clone(&resolver);
        let ids = ids.clone();
        tokio::spawn(async move {
            resolver.publish(&ids[1], address("10.0.0.2"));
            tokio::time::sleep(Duration::from_millis(5)).await;
            resolver.publish(&ids[0], address("10.0.0.1"));
        })
    };

    let outputs = resolver.wait_all(&ids).await.expect("all published");
    assert_eq!(outputs[0].address(), Some("10.0.0.1"));
    assert_eq!(outputs[1].address(), Some("10.0.0.2"));
    publisher.await.unwrap();
}

#[test]
fn concurrent_late_subscribers_each_fire_once() {
    let resolver = Arc::new(OutputResolver::new());
    let id = ResourceId::from("shared");
    let count = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let id = id.clone();
            let count = Arc::clone(&count);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let count = Arc::clone(&count);
                    resolver.subscribe(&id, move |_| {
                        count.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    resolver.publish(&id, address("10.0.0.1"));
    for thread in threads {
        thread.join().expect("subscriber thread panicked");
    }

    assert_eq!(count.load(Ordering::SeqCst), 400);
}
