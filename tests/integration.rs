//! End-to-end tests against a live Redis instance (§8 of the design).
//!
//! Reads `REDIS_URL`, defaulting to `redis://127.0.0.1/` the same way the
//! reference stack's own storage tests do. Each test flushes the database
//! before and after itself for isolation, since these all share the default
//! `exq` namespace.

use std::time::Duration;

use redq::handler::from_fn;
use redq::{Config, Gateway, HandlerRegistry, Manager};
use tokio::sync::mpsc;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

async fn flushdb() {
    let client = redis::Client::open(redis_url()).expect("valid redis url");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("redis must be reachable for integration tests");
    let _: () = redis::cmd("FLUSHDB")
        .query_async(&mut conn)
        .await
        .expect("FLUSHDB");
}

async fn test_manager(registry: HandlerRegistry) -> Manager {
    test_manager_with(registry, Config::default().set_queues(["default"])).await
}

async fn test_manager_with(registry: HandlerRegistry, config: Config) -> Manager {
    let gateway = Gateway::connect(redis_url()).await.expect("connect to redis");
    Manager::spawn(config.set_poll_timeout(Duration::from_millis(5)), gateway, registry)
}

async fn poll_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

async fn raw_conn() -> redis::aio::MultiplexedConnection {
    redis::Client::open(redis_url())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

#[tokio::test]
async fn round_trip_success() {
    flushdb().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new().register(
        "SendWorker",
        from_fn(move |_args| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(());
                Ok(())
            }
        }),
    );
    let manager = test_manager(registry).await;

    manager.enqueue("default", "SendWorker", vec![]).await.unwrap();
    rx.recv().await.expect("handler signaled the harness");

    let mut conn = raw_conn().await;
    poll_until(|| async {
        let processed: Option<String> = redis::cmd("GET")
            .arg("exq:stat:processed")
            .query_async(&mut conn)
            .await
            .unwrap();
        processed.as_deref() == Some("1")
    })
    .await;

    let mut conn = raw_conn().await;
    let failed: Option<String> = redis::cmd("GET")
        .arg("exq:stat:failed")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(failed, None);

    let remaining: i64 = redis::cmd("LLEN")
        .arg("exq:queue:default")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    manager.stop();
    flushdb().await;
}

#[tokio::test]
async fn failure_recording() {
    flushdb().await;

    let registry = HandlerRegistry::new().register(
        "BoomWorker",
        from_fn(|_args| async move { Err("boom".to_string()) }),
    );
    let manager = test_manager(registry).await;

    let jid = manager.enqueue("default", "BoomWorker", vec![]).await.unwrap();

    poll_until(|| {
        let manager = &manager;
        let jid = jid.clone();
        async move { manager.find_failed(jid).await.unwrap().is_some() }
    })
    .await;

    let (job, idx) = manager.find_failed(jid.clone()).await.unwrap().expect("failed entry");
    assert_eq!(idx, 0);
    assert_eq!(job.jid, jid);
    assert_eq!(job.error_message.as_deref(), Some("boom"));

    let mut conn = raw_conn().await;
    let failed: String = redis::cmd("GET")
        .arg("exq:stat:failed")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(failed, "1");

    manager.stop();
    flushdb().await;
}

#[tokio::test]
async fn queue_priority() {
    flushdb().await;

    let registry = HandlerRegistry::new();
    let manager = test_manager_with(
        registry,
        Config::default().set_queues(["hi", "lo"]).set_concurrency(0),
    )
    .await;

    manager.enqueue("lo", "Noop", vec![]).await.unwrap();
    manager.enqueue("hi", "Noop", vec![]).await.unwrap();

    // concurrency=0 keeps the manager from dequeuing anything itself; dequeue
    // order is exercised directly against the queue engine instead.
    let config = std::sync::Arc::new(Config::default());
    let gateway = Gateway::connect(redis_url()).await.unwrap();
    let queue_engine = redq::QueueEngine::new(gateway, config);
    let queues = vec!["hi".to_string(), "lo".to_string()];
    let raw = queue_engine.dequeue(&queues).await.unwrap().expect("a job");
    let job: redq::Job = serde_json::from_str(&raw).unwrap();
    assert_eq!(job.queue, "hi");

    manager.stop();
    flushdb().await;
}

#[tokio::test]
async fn concurrency_cap() {
    flushdb().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new().register(
        "SlowWorker",
        from_fn(move |_args| {
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = tx.send(());
                Ok(())
            }
        }),
    );
    let manager = test_manager_with(registry, Config::default().set_queues(["default"]).set_concurrency(2)).await;

    for _ in 0..5 {
        manager.enqueue("default", "SlowWorker", vec![]).await.unwrap();
    }

    let mut conn = raw_conn().await;
    let mut saw_two = false;
    for _ in 0..50 {
        let busy: i64 = redis::cmd("SCARD")
            .arg("exq:processes")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(busy <= 2, "busy workers exceeded the concurrency cap: {busy}");
        if busy == 2 {
            saw_two = true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_two, "expected to observe the concurrency cap reached");

    for _ in 0..5 {
        rx.recv().await.expect("all five jobs eventually complete");
    }

    manager.stop();
    flushdb().await;
}

#[tokio::test]
async fn remove_from_queue() {
    flushdb().await;

    let registry = HandlerRegistry::new();
    let manager = test_manager_with(registry, Config::default().set_queues(["default"]).set_concurrency(0)).await;

    manager.enqueue("default", "A", vec![]).await.unwrap();
    let jid_b = manager.enqueue("default", "B", vec![]).await.unwrap();
    manager.enqueue("default", "C", vec![]).await.unwrap();

    let config = std::sync::Arc::new(Config::default());
    let gateway = Gateway::connect(redis_url()).await.unwrap();
    let queue_engine = redq::QueueEngine::new(gateway, config);

    let removed = queue_engine.remove_job("default", &jid_b).await.unwrap();
    assert!(removed);

    let queues = vec!["default".to_string()];
    let first = queue_engine.dequeue(&queues).await.unwrap().expect("job A");
    let first: redq::Job = serde_json::from_str(&first).unwrap();
    assert_eq!(first.class, "A");

    let mut conn = raw_conn().await;
    let len: i64 = redis::cmd("LLEN")
        .arg("exq:queue:default")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 1);

    let second = queue_engine.dequeue(&queues).await.unwrap().expect("job C");
    let second: redq::Job = serde_json::from_str(&second).unwrap();
    assert_eq!(second.class, "C");

    manager.stop();
    flushdb().await;
}

#[tokio::test]
async fn process_table_cleanup() {
    flushdb().await;

    let registry = HandlerRegistry::new().register(
        "SleepThenBoom",
        from_fn(|_args| async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Err("boom".to_string())
        }),
    );
    let manager = test_manager(registry).await;

    manager.enqueue("default", "SleepThenBoom", vec![]).await.unwrap();

    let mut conn = raw_conn().await;
    poll_until(|| async {
        let busy: i64 = redis::cmd("SCARD")
            .arg("exq:processes")
            .query_async(&mut conn)
            .await
            .unwrap();
        busy == 1
    })
    .await;

    poll_until(|| async {
        let busy: i64 = redis::cmd("SCARD")
            .arg("exq:processes")
            .query_async(&mut conn)
            .await
            .unwrap();
        busy == 0
    })
    .await;

    let failed: String = redis::cmd("GET")
        .arg("exq:stat:failed")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(failed, "1");

    manager.stop();
    flushdb().await;
}
