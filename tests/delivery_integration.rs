//! End-to-end delivery tests
//!
//! These tests drive the orchestrator against the in-memory board, a memory
//! state store and a manually controlled network monitor. No external
//! services are required.

use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;

use chrono::Utc;
use uuid::Uuid;

use board_courier::board::{charset, BoardMessage, BoardSnapshot, HistoryEntry, HistoryStatus};
use board_courier::client::{ApiError, SimulatedBoard};
use board_courier::credentials::{Credentials, StaticCredentialProvider};
use board_courier::delivery::{
    BackgroundConfig, BackgroundProcessor, DeliveryConfiguration, DeliveryObserver,
    DeliveryOrchestrator, DeliveryStrategy, EventBroadcaster, QueueState,
};
use board_courier::network::WatchNetworkMonitor;
use board_courier::queue::{MessageStatus, PersistentQueue, QueuedMessage};
use board_courier::storage::{
    ContentCache, MemoryStateStore, StateStore, StorageError, StoredContentCache, QUEUE_KEY,
};
use board_courier::tasks::DeliveryScheduler;

struct TestEnvironment {
    board: Arc<SimulatedBoard>,
    network: Arc<WatchNetworkMonitor>,
    credentials: Arc<StaticCredentialProvider>,
    cache: Arc<StoredContentCache>,
    store: Arc<dyn StateStore>,
    events: Arc<EventBroadcaster>,
    orchestrator: Arc<DeliveryOrchestrator>,
}

fn test_config(strategy: DeliveryStrategy) -> DeliveryConfiguration {
    DeliveryConfiguration {
        strategy,
        base_delay: Duration::ZERO,
        pacing_delay: Duration::ZERO,
        ..DeliveryConfiguration::default()
    }
}

async fn create_environment(config: DeliveryConfiguration) -> TestEnvironment {
    create_environment_with_store(config, Arc::new(MemoryStateStore::new())).await
}

async fn create_environment_with_store(
    config: DeliveryConfiguration,
    store: Arc<dyn StateStore>,
) -> TestEnvironment {
    let queue = Arc::new(PersistentQueue::load(store.clone(), config.queue_config()).await);
    let board = Arc::new(SimulatedBoard::new());
    let network = Arc::new(WatchNetworkMonitor::new(true));
    let credentials = Arc::new(StaticCredentialProvider::new(Some(Credentials::new(
        "key", "secret",
    ))));
    let cache = Arc::new(StoredContentCache::new(store.clone()));
    let events = Arc::new(EventBroadcaster::default());

    let observer: Arc<dyn DeliveryObserver> = events.clone();
    let orchestrator = Arc::new(
        DeliveryOrchestrator::new(
            config,
            queue,
            board.clone(),
            credentials.clone(),
            cache.clone(),
            network.clone(),
        )
        .with_observer(observer),
    );

    TestEnvironment {
        board,
        network,
        credentials,
        cache,
        store,
        events,
        orchestrator,
    }
}

async fn enqueue(env: &TestEnvironment, text: &str) -> Uuid {
    let message = BoardMessage::new(text).unwrap();
    env.orchestrator
        .queue()
        .enqueue(QueuedMessage::new(message))
        .await
        .unwrap()
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_send_message_reaches_board_and_history() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;

    let id = env.orchestrator.send_message("HELLO").await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while env.orchestrator.queue().count().await > 0 || env.orchestrator.is_delivering() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message was not delivered");

    assert_eq!(env.board.posted().await, vec!["HELLO".to_string()]);

    let history = env.cache.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].text, "HELLO");
    assert_eq!(history[0].status, HistoryStatus::Sent);

    let cached = env.cache.last_known_board().await.unwrap().unwrap();
    assert_eq!(cached.rows, charset::board_layout("HELLO"));
    assert!(env.cache.last_sync_time().await.unwrap().is_some());

    assert_eq!(env.orchestrator.refresh_state().await, QueueState::Idle);
}

#[tokio::test]
async fn test_messages_delivered_in_order() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;

    enqueue(&env, "FIRST").await;
    enqueue(&env, "SECOND").await;
    enqueue(&env, "THIRD").await;

    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.delivered, 3);
    assert_eq!(outcome.remaining, 0);
    assert!(outcome.completed);

    assert_eq!(
        env.board.posted().await,
        vec!["FIRST".to_string(), "SECOND".to_string(), "THIRD".to_string()]
    );
}

#[tokio::test]
async fn test_observer_events_published() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    let mut events = env.events.subscribe();

    enqueue(&env, "HELLO").await;
    env.orchestrator.process_pending(None).await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }

    assert!(names.contains(&"will_send"));
    assert!(names.contains(&"content_changed"));
    assert!(names.contains(&"did_send"));
    let will = names.iter().position(|n| *n == "will_send").unwrap();
    let did = names.iter().position(|n| *n == "did_send").unwrap();
    assert!(will < did);
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn test_conflict_aware_holds_without_consuming_budget() {
    let env = create_environment(test_config(DeliveryStrategy::ConflictAware)).await;

    env.cache
        .save_board(&BoardSnapshot::new(charset::board_layout("OLD CONTENT")))
        .await
        .unwrap();
    env.board.set_text("SOMEONE ELSE").await;

    let id = enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.conflicts, 1);
    assert!(env.board.posted().await.is_empty());

    let held = env.orchestrator.queue().get(id).await.unwrap();
    assert_eq!(held.status, MessageStatus::Pending);
    assert!(held.on_hold);
    assert_eq!(held.retry_count, 0);
    assert_eq!(env.orchestrator.state(), QueueState::HasFailed);

    // Held records are not picked up again on their own
    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.conflicts, 0);

    // Manual resolution: the cache now matches the board, so the retry posts
    env.orchestrator.queue().retry(id).await.unwrap();
    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.delivered, 1);
    assert_eq!(env.board.posted().await, vec!["HELLO".to_string()]);
}

#[tokio::test]
async fn test_queued_strategy_overwrites_on_conflict() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;

    env.cache
        .save_board(&BoardSnapshot::new(charset::board_layout("OLD CONTENT")))
        .await
        .unwrap();
    env.board.set_text("SOMEONE ELSE").await;

    let mut events = env.events.subscribe();
    enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(env.board.posted().await, vec!["HELLO".to_string()]);

    let mut saw_conflict = false;
    while let Ok(event) = events.try_recv() {
        saw_conflict |= event.name() == "conflict_detected";
    }
    assert!(saw_conflict);
}

#[tokio::test]
async fn test_first_delivery_without_cache_is_not_a_conflict() {
    let env = create_environment(test_config(DeliveryStrategy::ConflictAware)).await;
    env.board.set_text("WHATEVER WAS THERE").await;

    enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.conflicts, 0);
}

// ============================================================================
// Failures and retries
// ============================================================================

#[tokio::test]
async fn test_retryable_failures_exhaust_budget() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    for _ in 0..3 {
        env.board.fail_next_post(ApiError::ServerError(503)).await;
    }

    let id = enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.failed, 3);
    assert_eq!(outcome.delivered, 0);

    let failed = env.orchestrator.queue().get(id).await.unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.retry_count, 3);
    assert!(failed.last_error.is_some());
    assert_eq!(env.orchestrator.state(), QueueState::HasFailed);

    let history = env.cache.history().await.unwrap();
    assert_eq!(history[0].status, HistoryStatus::Failed);

    // Retry resets the budget and the board accepts it now
    env.orchestrator.queue().retry(id).await.unwrap();
    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.delivered, 1);
}

#[tokio::test]
async fn test_retry_after_transient_failure() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.board.fail_next_post(ApiError::RateLimited).await;

    enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.delivered, 1);
    assert_eq!(env.board.posted().await, vec!["HELLO".to_string()]);
}

#[tokio::test]
async fn test_terminal_error_fails_without_retry() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.board.fail_next_post(ApiError::Unauthorized).await;

    let id = enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.failed, 1);
    let failed = env.orchestrator.queue().get(id).await.unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.retry_count, 0);
}

#[tokio::test]
async fn test_missing_credentials_fail_terminally() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.credentials.clear().await;

    let id = enqueue(&env, "HELLO").await;
    env.orchestrator.process_pending(None).await.unwrap();

    let failed = env.orchestrator.queue().get(id).await.unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert!(env.board.posted().await.is_empty());
}

#[tokio::test]
async fn test_refetch_failure_still_counts_as_delivered() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.board.fail_next_read(ApiError::Timeout).await;

    let id = enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.delivered, 1);
    assert!(env.orchestrator.queue().get(id).await.is_none());
    assert_eq!(env.board.posted().await.len(), 1);
}

// ============================================================================
// Connectivity
// ============================================================================

#[tokio::test]
async fn test_offline_queue_waits_for_network() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    env.network.set_connected(false);

    enqueue(&env, "HELLO").await;
    let outcome = env.orchestrator.process_pending(None).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.remaining, 1);
    assert_eq!(env.orchestrator.state(), QueueState::WaitingForNetwork);
    assert!(env.board.posted().await.is_empty());

    env.network.set_connected(true);
    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.delivered, 1);
    assert_eq!(env.orchestrator.state(), QueueState::Idle);
}

#[tokio::test]
async fn test_scheduler_delivers_when_connectivity_returns() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    env.network.set_connected(false);
    enqueue(&env, "BACK ONLINE").await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let scheduler = DeliveryScheduler::new(env.orchestrator.clone(), shutdown_rx);
    let handle = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(env.board.posted().await.is_empty());

    env.network.set_connected(true);
    tokio::time::timeout(Duration::from_secs(5), async {
        while env.board.posted().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler did not resume delivery");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_poll_timer_delivers_once_backoff_elapses() {
    // Backoff is measured on the wall clock, so this runs in real time
    let config = DeliveryConfiguration {
        base_delay: Duration::from_millis(100),
        poll_interval: Duration::from_millis(600),
        ..test_config(DeliveryStrategy::Optimistic)
    };
    let env = create_environment(config).await;
    env.board.fail_next_post(ApiError::ServerError(503)).await;
    let id = enqueue(&env, "SAFETY NET").await;

    let outcome = env.orchestrator.process_pending(None).await.unwrap();
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.delivered, 0);
    let waiting = env.orchestrator.queue().get(id).await.unwrap();
    assert_eq!(waiting.status, MessageStatus::Pending);
    assert!(waiting.next_retry_at.is_some());

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let scheduler = DeliveryScheduler::new(env.orchestrator.clone(), shutdown_rx);
    let handle = tokio::spawn(scheduler.run());

    // Backoff is over but nothing has re-run the loop yet
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(env.board.posted().await.is_empty());
    assert_eq!(env.orchestrator.queue().count().await, 1);

    tokio::time::timeout(Duration::from_secs(3), async {
        while env.board.posted().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poll timer did not re-run delivery");

    assert_eq!(env.board.posted().await, vec!["SAFETY NET".to_string()]);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_single_flight_guard() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    env.board.set_latency(Duration::from_millis(200));
    enqueue(&env, "HELLO").await;

    let orchestrator = env.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.process_pending(None).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(env.orchestrator.is_delivering());
    assert!(env.orchestrator.process_pending(None).await.is_none());

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.delivered, 1);
    assert_eq!(env.board.posted().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_flight_is_noop() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.board.set_latency(Duration::from_secs(1));
    let id = enqueue(&env, "HELLO").await;

    let orchestrator = env.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.process_pending(None).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    env.orchestrator.cancel_message(id).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.delivered, 0);
    assert!(env.cache.history().await.unwrap().is_empty());
    assert_eq!(env.orchestrator.queue().count().await, 0);
}

// ============================================================================
// Background window
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_timeout_leaves_nothing_sending() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    env.board.set_latency(Duration::from_secs(60));
    enqueue(&env, "HELLO").await;

    let background = BackgroundProcessor::new(
        env.orchestrator.clone(),
        BackgroundConfig {
            budget: Duration::from_secs(5),
            safety_margin: Duration::from_secs(1),
        },
    );

    let result = background.process_pending_now().await;
    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.remaining, 1);

    let stats = env.orchestrator.queue().stats().await;
    assert_eq!(stats.sending, 0);
    assert_eq!(stats.pending, 1);
    assert!(!env.orchestrator.is_delivering());
}

/// Memory store that notes, for every queue snapshot it persists, whether
/// the snapshot still has a record in flight and whether a delivery loop
/// held the guard at that moment.
#[derive(Default)]
struct GuardTrackingStore {
    inner: MemoryStateStore,
    orchestrator: OnceLock<Weak<DeliveryOrchestrator>>,
    queue_writes: Mutex<Vec<(bool, bool)>>,
}

#[async_trait]
impl StateStore for GuardTrackingStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == QUEUE_KEY {
            let delivering = self
                .orchestrator
                .get()
                .and_then(Weak::upgrade)
                .map(|o| o.is_delivering())
                .unwrap_or(false);
            let in_flight = value.contains("\"sending\"");
            self.queue_writes.lock().unwrap().push((in_flight, delivering));
        }
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }

    fn backend_name(&self) -> &'static str {
        "tracking"
    }
}

#[tokio::test(start_paused = true)]
async fn test_background_timeout_requeues_before_releasing_guard() {
    let store = Arc::new(GuardTrackingStore::default());
    let env =
        create_environment_with_store(test_config(DeliveryStrategy::Optimistic), store.clone())
            .await;
    assert!(store
        .orchestrator
        .set(Arc::downgrade(&env.orchestrator))
        .is_ok());
    env.board.set_latency(Duration::from_secs(60));
    enqueue(&env, "HELLO").await;

    let background = BackgroundProcessor::new(
        env.orchestrator.clone(),
        BackgroundConfig {
            budget: Duration::from_secs(5),
            safety_margin: Duration::from_secs(1),
        },
    );
    let result = background.process_pending_now().await;
    assert!(result.timed_out);

    let writes = store.queue_writes.lock().unwrap().clone();
    let dequeued = writes
        .iter()
        .position(|&(in_flight, _)| in_flight)
        .expect("record was never marked sending");
    let (in_flight, delivering) = writes[dequeued + 1];
    assert!(!in_flight);
    assert!(delivering, "in-flight record was reset after the guard was released");
    assert!(!env.orchestrator.is_delivering());
}

#[tokio::test]
async fn test_background_completes_within_budget() {
    let env = create_environment(test_config(DeliveryStrategy::Optimistic)).await;
    enqueue(&env, "ONE").await;
    enqueue(&env, "TWO").await;

    let background = BackgroundProcessor::new(env.orchestrator.clone(), BackgroundConfig::default());
    let result = background.process_pending_now().await;

    assert!(result.success);
    assert!(!result.timed_out);
    assert_eq!(result.delivered, 2);
    assert_eq!(result.remaining, 0);
}

// ============================================================================
// Digest and persistence
// ============================================================================

#[tokio::test]
async fn test_digest_sent_for_recent_burst() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    env.network.set_connected(false);

    let now = Utc::now();
    for (text, secs_ago) in [("ALPHA", 30), ("BETA", 20), ("GAMMA", 10)] {
        env.cache
            .add_to_history(HistoryEntry {
                id: Uuid::new_v4(),
                text: text.to_string(),
                status: HistoryStatus::Sent,
                timestamp: now - chrono::Duration::seconds(secs_ago),
            })
            .await
            .unwrap();
    }

    let id = env
        .orchestrator
        .send_digest_if_burst()
        .await
        .unwrap()
        .expect("burst should produce a digest");

    let queued = env.orchestrator.queue().get(id).await.unwrap();
    assert!(queued.text().contains("3 UPDATES"));
    assert!(queued.text().contains("- GAMMA"));
    assert_eq!(queued.metadata.get("kind").map(String::as_str), Some("digest"));
}

#[tokio::test]
async fn test_no_digest_without_burst() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;

    env.cache
        .add_to_history(HistoryEntry {
            id: Uuid::new_v4(),
            text: "LONELY".to_string(),
            status: HistoryStatus::Sent,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    assert!(env.orchestrator.send_digest_if_burst().await.unwrap().is_none());
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let env = create_environment(test_config(DeliveryStrategy::Queued)).await;
    env.network.set_connected(false);

    let id = enqueue(&env, "PERSIST ME").await;

    let config = test_config(DeliveryStrategy::Queued);
    let reloaded = PersistentQueue::load(env.store.clone(), config.queue_config()).await;
    let restored = reloaded.get(id).await.unwrap();
    assert_eq!(restored.text(), "PERSIST ME");
    assert_eq!(restored.status, MessageStatus::Pending);
}
