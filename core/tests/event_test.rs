use eventually_core::{BusConfig, EventBus, Result, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed")
}

async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let extra = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(
        extra.is_err() || extra.as_ref().unwrap().is_none(),
        "unexpected delivery: {:?}",
        extra
    );
}

#[tokio::test]
async fn subscribe_and_post_basic() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = bus
        .on("topic.test", move |msg: String| {
            let _ = tx.send(msg);
        })
        .await?;
    assert_eq!(sub.topic(), "topic.test");
    assert!(!sub.is_once());

    bus.post("topic.test", ("hello",)).await?;
    assert_eq!(recv(&mut rx).await, "hello");
    Ok(())
}

#[tokio::test]
async fn once_receives_a_single_message() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut total = 0;
    let sub = bus
        .once("ping", move |msg: i64| {
            total += msg;
            let _ = tx.send(total);
        })
        .await?;
    assert!(sub.is_once());

    bus.post("ping", (99,)).await?;
    bus.post("ping", (99,)).await?;

    assert_eq!(recv(&mut rx).await, 99);
    // worker exits after its single delivery, closing the channel
    assert_quiet(&mut rx).await;
    assert_eq!(bus.subscriber_count("ping").await?, 0);
    Ok(())
}

#[tokio::test]
async fn once_is_removed_when_delivery_is_enqueued() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.once("ping", move |n: i64| {
        let _ = tx.send(n);
    })
    .await?;
    assert_eq!(bus.subscriber_count("ping").await?, 1);

    bus.post("ping", (1,)).await?;
    // the count request is ordered after the publish
    assert_eq!(bus.subscriber_count("ping").await?, 0);
    assert_eq!(recv(&mut rx).await, 1);
    Ok(())
}

#[tokio::test]
async fn heartbeat_unsubscribe_stops_deliveries() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (once_tx, mut once_rx) = mpsc::unbounded_channel();
    let (on_tx, mut on_rx) = mpsc::unbounded_channel();

    bus.once("heartbeat", move |msg: String| {
        let _ = once_tx.send(msg);
    })
    .await?;
    let listener = bus
        .on("heartbeat", move |msg: String| {
            let _ = on_tx.send(msg);
        })
        .await?;

    bus.post("heartbeat", ("1",)).await?;
    bus.post("heartbeat", ("2",)).await?;
    bus.unsubscribe("heartbeat", &listener).await?;
    bus.post("heartbeat", ("3",)).await?;

    assert_eq!(recv(&mut on_rx).await, "1");
    assert_eq!(recv(&mut on_rx).await, "2");
    assert_quiet(&mut on_rx).await;

    assert_eq!(recv(&mut once_rx).await, "1");
    assert_quiet(&mut once_rx).await;
    Ok(())
}

#[tokio::test]
async fn every_subscriber_receives_one_copy() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    for n in 0..5_u32 {
        let tx = tx.clone();
        bus.on("fanout", move |payload: i64| {
            let _ = tx.send((n, payload));
        })
        .await?;
    }
    drop(tx);

    bus.post("fanout", (7,)).await?;

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(recv(&mut rx).await);
    }
    seen.sort();
    assert_eq!(seen, (0..5).map(|n| (n, 7)).collect::<Vec<_>>());

    // each subscriber got exactly one copy
    assert_quiet(&mut rx).await;
    let stats = bus.stats().await?;
    assert_eq!(stats.total_enqueued, 5);
    assert_eq!(stats.active_subscriptions, 5);
    Ok(())
}

#[tokio::test]
async fn per_subscriber_order_matches_post_order() -> Result<()> {
    let bus = EventBus::new(BusConfig::default().with_queue_length(2)).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.on("seq", move |n: i64| {
        let _ = tx.send(n);
    })
    .await?;

    for n in 0..100 {
        bus.post("seq", (n,)).await?;
    }
    for n in 0..100 {
        assert_eq!(recv(&mut rx).await, n);
    }
    Ok(())
}

#[tokio::test]
async fn double_unsubscribe_is_harmless() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();

    let fired = bus
        .once("ping", move |n: i64| {
            let _ = tx.send(n);
        })
        .await?;
    bus.on("ping", move |n: i64| {
        let _ = other_tx.send(n);
    })
    .await?;

    bus.post("ping", (1,)).await?;
    assert_eq!(recv(&mut rx).await, 1);

    // once already fired, then unknown topic, then twice more
    bus.unsubscribe("ping", &fired).await?;
    bus.unsubscribe("pong", &fired).await?;
    bus.unsubscribe("ping", &fired).await?;

    bus.post("ping", (2,)).await?;
    assert_eq!(recv(&mut other_rx).await, 1);
    assert_eq!(recv(&mut other_rx).await, 2);
    assert_eq!(bus.subscriber_count("ping").await?, 1);
    Ok(())
}

#[tokio::test]
async fn post_without_subscribers_is_ok() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    bus.post("nobody.home", ()).await?;
    bus.post("nobody.home", vec![Value::from(1), Value::from("x")])
        .await?;

    let stats = bus.stats().await?;
    assert_eq!(stats.total_published, 2);
    assert_eq!(stats.total_enqueued, 0);
    assert_eq!(stats.topics, 0);
    Ok(())
}

#[tokio::test]
async fn stats_track_deliveries() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.on("count", move |a: i64, b: i64| {
        let _ = tx.send(a + b);
    })
    .await?;
    for n in 0..3 {
        bus.post("count", (n, n)).await?;
    }
    for n in 0..3 {
        assert_eq!(recv(&mut rx).await, n + n);
    }

    // worker bumps the counter right after the callback returns
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = bus.stats().await?;
    assert_eq!(stats.total_published, 3);
    assert_eq!(stats.total_enqueued, 3);
    assert_eq!(stats.total_delivered, 3);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.active_subscriptions, 1);
    assert_eq!(stats.topics, 1);
    Ok(())
}

#[tokio::test]
async fn unsubscribe_uses_the_subscription_topic() -> Result<()> {
    let bus = EventBus::with_defaults().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = bus
        .on("alpha", move |n: i64| {
            let _ = tx.send(n);
        })
        .await?;
    bus.post("alpha", (1,)).await?;
    assert_eq!(recv(&mut rx).await, 1);

    // wrong topic argument still removes the handle's own subscription
    bus.unsubscribe("beta", &sub).await?;
    assert_eq!(bus.subscriber_count("alpha").await?, 0);

    bus.post("alpha", (2,)).await?;
    assert_quiet(&mut rx).await;
    Ok(())
}
