//! Object lifecycle: subscribe guard, dispose drain and error handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actorbus::{
    ActiveObject, AoManager, DisposeObjects, Event, EventBus, EventFilter, EventRef, Lifecycle,
    ObjectError, ObjectHandle, RuntimeConfig, SubscriptionComplete,
};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
struct Item(u32);
impl Event for Item {}

#[derive(Default)]
struct Record {
    items: Mutex<Vec<u32>>,
    destroyed: AtomicUsize,
    items_at_destroy: AtomicUsize,
}

/// Slow consumer of `Item`s.
struct Sink {
    record: Arc<Record>,
}

#[async_trait]
impl ActiveObject for Sink {
    fn filter(&self) -> EventFilter {
        EventFilter::new().with::<Item>()
    }

    async fn on_event(&mut self, event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(item) = event.downcast_ref::<Item>() {
            self.record.items.lock().push(item.0);
        }
        Ok(())
    }

    async fn on_destroy(&mut self) -> anyhow::Result<()> {
        let seen = self.record.items.lock().len();
        self.record.items_at_destroy.store(seen, Ordering::SeqCst);
        self.record.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_bus() -> EventBus {
    EventBus::with_config(RuntimeConfig {
        dispose_poll_interval: Duration::from_millis(2),
        ..RuntimeConfig::default()
    })
}

async fn running(object: impl ActiveObject, bus: &EventBus) -> (ObjectHandle, AoManager) {
    let handle = ObjectHandle::new(object, bus);
    let manager = AoManager::new(vec![handle.clone()], bus);
    manager.start_initialization().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
        .await
        .expect("ready")
        .unwrap();
    (handle, manager)
}

#[tokio::test]
async fn test_dispose_drains_queue_then_destroys_once() {
    let bus = fast_bus();
    let record = Arc::new(Record::default());
    let (sink, _manager) = running(
        Sink {
            record: record.clone(),
        },
        &bus,
    )
    .await;

    for i in 0..5 {
        bus.publish(Item(i)).await.unwrap();
    }
    bus.publish(DisposeObjects).await.unwrap();

    let mut life = sink.watch_lifecycle();
    tokio::time::timeout(
        Duration::from_secs(2),
        life.wait_for(|l| matches!(l, Lifecycle::Draining | Lifecycle::Disposed)),
    )
    .await
    .expect("dispose started")
    .unwrap();

    // Published after dispose: dropped.
    for i in 100..103 {
        bus.publish(Item(i)).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(2), sink.wait_disposed())
        .await
        .expect("disposed")
        .unwrap();

    assert_eq!(*record.items.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(record.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(record.items_at_destroy.load(Ordering::SeqCst), 5);
    assert!(matches!(sink.lifecycle(), Lifecycle::Disposed));

    // A second dispose request reaches no one and changes nothing.
    bus.publish(DisposeObjects).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(record.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispose_stops_only_the_disposed_objects() {
    let bus = fast_bus();
    let record = Arc::new(Record::default());
    let (sink, manager) = running(
        Sink {
            record: record.clone(),
        },
        &bus,
    )
    .await;

    bus.publish(DisposeObjects).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), sink.wait_disposed())
        .await
        .expect("sink disposed")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), manager.handle().wait_disposed())
        .await
        .expect("manager disposed")
        .unwrap();

    // The bus itself keeps working.
    bus.publish(Item(1)).await.unwrap();
    assert!(record.items.lock().is_empty());
}

#[tokio::test]
async fn test_second_subscribe_fails_and_changes_nothing() {
    let bus = EventBus::new();
    let mut rx = bus.receiver();
    let sink = ObjectHandle::new(
        Sink {
            record: Arc::default(),
        },
        &bus,
    );

    sink.subscribe().await.unwrap();
    let err = sink.subscribe().await.unwrap_err();
    assert!(matches!(err, ObjectError::AlreadySubscribed { .. }));
    assert!(matches!(sink.lifecycle(), Lifecycle::Subscribed));

    let mut announcements = 0;
    while let Ok(ev) = rx.try_recv() {
        if ev.is::<SubscriptionComplete>() {
            announcements += 1;
        }
    }
    assert_eq!(announcements, 1);
}

/// Fails on every item; optionally recovers.
struct Flaky {
    recover: bool,
    panic: bool,
    errors: Arc<AtomicUsize>,
}

#[async_trait]
impl ActiveObject for Flaky {
    fn filter(&self) -> EventFilter {
        EventFilter::new().with::<Item>()
    }

    async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
        if self.panic {
            panic!("boom");
        }
        anyhow::bail!("bad item")
    }

    async fn handle_error(&mut self, error: ObjectError) -> Result<(), ObjectError> {
        self.errors.fetch_add(1, Ordering::SeqCst);
        if self.recover {
            Ok(())
        } else {
            Err(error)
        }
    }
}

#[tokio::test]
async fn test_unrecovered_error_is_fatal_and_retained() {
    let bus = fast_bus();
    let errors = Arc::new(AtomicUsize::new(0));
    let (flaky, _manager) = running(
        Flaky {
            recover: false,
            panic: false,
            errors: errors.clone(),
        },
        &bus,
    )
    .await;

    bus.publish(Item(1)).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), flaky.wait_disposed())
        .await
        .expect("stopped")
        .unwrap_err();
    assert_eq!(err.as_label(), "object_handler");
    assert!(err.to_string().contains("bad item"));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recovered_errors_keep_the_object_running() {
    let bus = fast_bus();
    let errors = Arc::new(AtomicUsize::new(0));
    let (flaky, _manager) = running(
        Flaky {
            recover: true,
            panic: false,
            errors: errors.clone(),
        },
        &bus,
    )
    .await;

    for i in 0..3 {
        bus.publish(Item(i)).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(2), async {
        while errors.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("three errors handled");
    assert!(matches!(flaky.lifecycle(), Lifecycle::Running));
}

#[tokio::test]
async fn test_panicking_hook_is_reported_as_error() {
    let bus = fast_bus();
    let errors = Arc::new(AtomicUsize::new(0));
    let (flaky, _manager) = running(
        Flaky {
            recover: false,
            panic: true,
            errors: errors.clone(),
        },
        &bus,
    )
    .await;

    bus.publish(Item(1)).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), flaky.wait_disposed())
        .await
        .expect("stopped")
        .unwrap_err();
    assert!(matches!(*err, ObjectError::Panicked(ref msg) if msg.contains("boom")));
}
