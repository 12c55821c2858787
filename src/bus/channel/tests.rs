use super::*;
use crate::test_utils::{make_event, wire, CountingHandler, RecordingHandler};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_channel_publish_no_receivers() {
    let bus = ChannelEventBus::new();

    // Should not error even with no receivers
    let result = bus.publish(wire(&make_event("e1", "u1"))).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_channel_subscribe_and_receive() {
    let bus = ChannelEventBus::new();

    let handler = CountingHandler::new();
    let count = handler.count();
    bus.subscribe(Arc::new(handler)).await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(wire(&make_event("e1", "u1"))).await.unwrap();

    // Give handler time to process
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_state_transitions() {
    let bus = ChannelEventBus::new();
    assert_eq!(bus.state(), ConsumerState::Disconnected);

    bus.subscribe(Arc::new(CountingHandler::new())).await.unwrap();
    bus.start_consuming().await.unwrap();
    assert_eq!(bus.state(), ConsumerState::Running);

    bus.shutdown().await;
    assert_eq!(bus.state(), ConsumerState::Disconnected);
}

#[tokio::test]
async fn test_channel_start_consuming_twice_is_noop() {
    let bus = ChannelEventBus::new();

    let handler = CountingHandler::new();
    let count = handler.count();
    bus.subscribe(Arc::new(handler)).await.unwrap();
    bus.start_consuming().await.unwrap();
    bus.start_consuming().await.unwrap();

    bus.publish(wire(&make_event("e1", "u1"))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A second consumer loop would have doubled the count
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_assigns_increasing_offsets() {
    let bus = ChannelEventBus::new();

    let handler = RecordingHandler::new();
    let deliveries = handler.deliveries();
    bus.subscribe(Arc::new(handler)).await.unwrap();
    bus.start_consuming().await.unwrap();

    for i in 0..3 {
        bus.publish(wire(&make_event(&format!("e{}", i), "u1")))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let offsets: Vec<i64> = deliveries.lock().await.iter().map(|d| d.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_channel_shared_sender() {
    let publisher = ChannelEventBus::new();
    let subscriber = publisher.with_shared_channel();

    let handler = CountingHandler::new();
    let count = handler.count();
    subscriber.subscribe(Arc::new(handler)).await.unwrap();
    subscriber.start_consuming().await.unwrap();

    // Publish via publisher, receive via subscriber
    publisher.publish(wire(&make_event("e1", "u1"))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_shutdown_stops_delivery() {
    let bus = ChannelEventBus::new();

    let handler = CountingHandler::new();
    let count = handler.count();
    bus.subscribe(Arc::new(handler)).await.unwrap();
    bus.start_consuming().await.unwrap();
    bus.shutdown().await;

    bus.publish(wire(&make_event("e1", "u1"))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

/// Handler that holds each delivery until a permit is released.
struct GatedHandler {
    gate: Arc<tokio::sync::Semaphore>,
    count: Arc<std::sync::atomic::AtomicUsize>,
}

impl MessageHandler for GatedHandler {
    fn handle(&self, _delivery: Delivery) -> futures::future::BoxFuture<'static, ()> {
        let gate = Arc::clone(&self.gate);
        let count = Arc::clone(&self.count);
        Box::pin(async move {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[tokio::test]
async fn test_channel_publish_waits_for_slow_consumer() {
    let bus = ChannelEventBus::new();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    bus.subscribe(Arc::new(GatedHandler {
        gate: Arc::clone(&gate),
        count: Arc::clone(&count),
    }))
    .await
    .unwrap();
    bus.start_consuming().await.unwrap();

    // One message held by the handler plus a full channel behind it.
    for i in 0..=CHANNEL_CAPACITY {
        tokio::time::timeout(
            Duration::from_secs(1),
            bus.publish(wire(&make_event(&format!("e{}", i), "u1"))),
        )
        .await
        .expect("publish should fit in the channel")
        .unwrap();
    }

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        bus.publish(wire(&make_event("overflow", "u1"))),
    )
    .await;
    assert!(blocked.is_err(), "publish should wait while the channel is full");
    assert_eq!(bus.state(), ConsumerState::Running);

    gate.add_permits(CHANNEL_CAPACITY + 2);
    tokio::time::timeout(
        Duration::from_secs(1),
        bus.publish(wire(&make_event("after", "u1"))),
    )
    .await
    .expect("publish should resume once the consumer drains")
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while count.load(Ordering::SeqCst) < CHANNEL_CAPACITY + 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("every accepted message should be delivered");
    assert_eq!(bus.state(), ConsumerState::Running);

    bus.shutdown().await;
}

#[tokio::test]
async fn test_channel_shutdown_releases_waiting_publisher() {
    let bus = ChannelEventBus::new();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    bus.subscribe(Arc::new(GatedHandler {
        gate: Arc::clone(&gate),
        count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    }))
    .await
    .unwrap();
    bus.start_consuming().await.unwrap();

    for i in 0..=CHANNEL_CAPACITY {
        bus.publish(wire(&make_event(&format!("e{}", i), "u1")))
            .await
            .unwrap();
    }

    // Let the in-flight message finish so the consumer can stop.
    gate.add_permits(1);
    bus.shutdown().await;

    tokio::time::timeout(
        Duration::from_secs(1),
        bus.publish(wire(&make_event("late", "u1"))),
    )
    .await
    .expect("publish should not wait on a stopped consumer")
    .unwrap();
}
