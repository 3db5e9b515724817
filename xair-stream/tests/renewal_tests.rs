//! Integration tests for subscription renewal and ingestion.
//!
//! Time is driven by a `ManualClock` in 250 ms steps, and a small console
//! simulation streams values for as long as its last subscribe request is
//! alive, so these tests cover the full subscribe, stream, renew and lapse
//! cycle without a network.


use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mock_transport::MockTransport;
use state_store::{Clock, CurrentValueStore, ManualClock};
use tokio::sync::{broadcast, watch};
use xair_protocol::{InboundMessage, ParameterPath, ParameterValue, Rate, WireValue};
use xair_stream::{
    event_channel, Removal, RenewalScheduler, SubscriptionRegistry, SyncConfig, SyncEvent,
    TeardownPolicy, UpdateIngestor,
};

const TICK: Duration = Duration::from_millis(250);
const WINDOW: Duration = Duration::from_secs(10);

struct Harness {
    clock: ManualClock,
    store: CurrentValueStore,
    registry: Arc<SubscriptionRegistry>,
    transport: MockTransport,
    scheduler: Arc<RenewalScheduler>,
    ingestor: UpdateIngestor,
    events: broadcast::Receiver<SyncEvent>,
}

impl Harness {
    fn new(config: SyncConfig) -> Self {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = CurrentValueStore::with_clock(shared.clone(), config.subscription_window);
        let registry = Arc::new(SubscriptionRegistry::new(config.max_subscriptions, shared));
        let transport = MockTransport::new();
        let (events_tx, events) = event_channel(&config);

        let scheduler = Arc::new(RenewalScheduler::new(
            registry.clone(),
            store.clone(),
            Arc::new(transport.clone()),
            events_tx.clone(),
            &config,
        ));
        let ingestor = UpdateIngestor::new(store.clone(), events_tx, &config);

        Self {
            clock,
            store,
            registry,
            transport,
            scheduler,
            ingestor,
            events,
        }
    }

    fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn config() -> SyncConfig {
    SyncConfig::new().with_retry_jitter(0.0)
}

/// Streams a fader value while the last subscribe request it saw is alive
struct Console {
    path: ParameterPath,
    period: Duration,
    expires_at: Option<Instant>,
    last_sent: Option<Instant>,
    seen: usize,
}

impl Console {
    fn new(path: ParameterPath, period: Duration) -> Self {
        Self {
            path,
            period,
            expires_at: None,
            last_sent: None,
            seen: 0,
        }
    }

    fn step(&mut self, harness: &Harness, now: Instant) {
        let subscribes = harness.transport.subscribes_for(&self.path).len();
        if subscribes > self.seen {
            self.seen = subscribes;
            self.expires_at = Some(now + WINDOW);
        }

        let alive = self.expires_at.map_or(false, |expires_at| now < expires_at);
        let due = self.last_sent.map_or(true, |sent| now - sent >= self.period);
        if alive && due {
            let message = InboundMessage::new(self.path.to_string(), vec![WireValue::Float(0.5)]);
            harness.ingestor.ingest_at(&message, now);
            self.last_sent = Some(now);
        }
    }
}

#[tokio::test]
async fn test_interests_merge_into_one_subscription() {
    let harness = Harness::new(config());
    let path = ParameterPath::channel_fader(1).unwrap();

    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 2.0)
        .unwrap();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 5.0)
        .unwrap();

    let report = harness.scheduler.tick().await;
    assert_eq!(report.renewed, 1);
    assert_eq!(harness.transport.sent_count(), 1);
    assert_eq!(harness.transport.subscribes_for(&path), vec![Rate::from_steps(10)]);

    let lease = harness.store.lease(&path).unwrap();
    assert_eq!(lease.rate, Rate::from_steps(10));
    assert!(lease.renewing);
}

#[tokio::test]
async fn test_rate_upgrade_resends_immediately() {
    let harness = Harness::new(config());
    let path = ParameterPath::main_fader();

    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();
    harness.scheduler.tick().await;

    harness.clock.advance(TICK);
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 5.0)
        .unwrap();
    harness.scheduler.tick().await;

    assert_eq!(
        harness.transport.subscribes_for(&path),
        vec![Rate::from_steps(2), Rate::from_steps(10)]
    );
}

#[tokio::test]
async fn test_renewal_keeps_value_fresh_for_30_seconds() {
    let mut harness = Harness::new(config());
    let path = ParameterPath::channel_fader(1).unwrap();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();

    let mut console = Console::new(path, Duration::from_secs(1));
    let start = harness.clock.now();

    while harness.clock.now() - start <= Duration::from_secs(30) {
        let now = harness.clock.now();
        harness.scheduler.tick_at(now).await;
        console.step(&harness, now);

        let entry = harness.store.get_at(&path, now).unwrap();
        assert!(!entry.stale, "value went stale at {:?}", now - start);

        harness.clock.advance(TICK);
    }

    assert!(harness.transport.subscribes_for(&path).len() >= 3);
    assert!(harness
        .drain_events()
        .iter()
        .all(|event| !event.is_warning()));
}

#[tokio::test]
async fn test_unsubscribe_lets_subscription_lapse() {
    let mut harness = Harness::new(config());
    let path = ParameterPath::channel_fader(2).unwrap();
    let handle = harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();

    let mut console = Console::new(path, Duration::from_secs(1));
    let start = harness.clock.now();

    while harness.clock.now() - start < Duration::from_secs(5) {
        let now = harness.clock.now();
        harness.scheduler.tick_at(now).await;
        console.step(&harness, now);
        harness.clock.advance(TICK);
    }

    assert_eq!(harness.registry.remove_interest(&handle).unwrap(), Removal::TornDown);
    let report = harness.scheduler.tick().await;
    assert_eq!(report.torn_down, 1);
    assert!(!harness.registry.contains(&path));
    assert!(!harness.store.lease(&path).unwrap().renewing);

    let subscribes = harness.transport.subscribes_for(&path).len();
    while harness.clock.now() - start < Duration::from_secs(20) {
        let now = harness.clock.now();
        harness.scheduler.tick_at(now).await;
        console.step(&harness, now);

        let entry = harness.store.get_at(&path, now).unwrap();
        if now - start < Duration::from_secs(10) {
            assert!(!entry.stale, "went stale early at {:?}", now - start);
        } else if now - start > Duration::from_secs(10) {
            assert!(entry.stale, "still fresh at {:?}", now - start);
        }

        harness.clock.advance(TICK);
    }

    assert_eq!(harness.transport.subscribes_for(&path).len(), subscribes);
    assert_eq!(harness.transport.unsubscribes_for(&path), 0);
    // The last value is kept, only marked stale
    assert_eq!(harness.store.value(&path), Some(ParameterValue::Normalized(0.5)));
    assert!(harness
        .drain_events()
        .iter()
        .any(|event| matches!(event, SyncEvent::SubscriptionTornDown { path: p } if *p == path)));
}

#[tokio::test]
async fn test_explicit_unsubscribe_policy() {
    let harness = Harness::new(config().with_teardown(TeardownPolicy::ExplicitUnsubscribe));
    let path = ParameterPath::main_mute();
    let handle = harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();
    harness.scheduler.tick().await;

    harness.registry.remove_interest(&handle).unwrap();
    harness.scheduler.tick().await;

    assert_eq!(harness.transport.unsubscribes_for(&path), 1);
    assert_eq!(harness.transport.subscribes_for(&path).len(), 1);
}

#[tokio::test]
async fn test_shared_path_survives_one_unsubscribe() {
    let harness = Harness::new(config());
    let path = ParameterPath::channel_mute(4).unwrap();
    let first = harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();
    harness.scheduler.tick().await;

    harness.registry.remove_interest(&first).unwrap();
    let report = harness.scheduler.tick().await;
    assert_eq!(report.torn_down, 0);
    assert!(harness.registry.contains(&path));
    assert!(harness.store.lease(&path).unwrap().renewing);
}

#[tokio::test]
async fn test_send_failure_retries_with_backoff() {
    let mut harness = Harness::new(config());
    let path = ParameterPath::channel_fader(3).unwrap();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();
    harness.transport.fail_next(2);

    assert_eq!(harness.scheduler.tick().await.failed, 1);

    harness.clock.advance(Duration::from_millis(500));
    assert!(harness.scheduler.tick().await.is_idle());

    harness.clock.advance(Duration::from_millis(500));
    assert_eq!(harness.scheduler.tick().await.failed, 1);

    harness.clock.advance(Duration::from_secs(1));
    assert!(harness.scheduler.tick().await.is_idle());

    harness.clock.advance(Duration::from_secs(1));
    assert_eq!(harness.scheduler.tick().await.renewed, 1);
    assert_eq!(harness.transport.subscribes_for(&path).len(), 1);

    let failures: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::TransportSendFailure {
                attempt, retry_in, ..
            } => Some((attempt, retry_in)),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![(1, Duration::from_secs(1)), (2, Duration::from_secs(2))]
    );
}

#[tokio::test]
async fn test_lapse_reported_when_renewal_keeps_failing() {
    let mut harness = Harness::new(config());
    let path = ParameterPath::channel_fader(5).unwrap();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();

    let mut console = Console::new(path, Duration::from_secs(1));
    let start = harness.clock.now();
    let mut lapsed = 0;

    while harness.clock.now() - start <= Duration::from_secs(12) {
        let now = harness.clock.now();
        lapsed += harness.scheduler.tick_at(now).await.lapsed;
        console.step(&harness, now);

        if now - start == Duration::ZERO {
            harness.transport.set_failing(true);
        }
        if now - start == Duration::from_millis(9750) {
            assert!(!harness.store.get_at(&path, now).unwrap().stale);
        }
        if now - start == Duration::from_millis(10250) {
            assert!(harness.store.get_at(&path, now).unwrap().stale);
        }

        harness.clock.advance(TICK);
    }

    assert_eq!(lapsed, 1);
    // Failed renewals never drop the subscription
    assert!(harness.registry.contains(&path));
    assert!(!harness.store.lease(&path).unwrap().renewing);

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::SubscriptionLapsed { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::TransportSendFailure { .. })));
}

#[tokio::test]
async fn test_listeners_see_ingested_updates_in_order() {
    let harness = Harness::new(config());
    let path = ParameterPath::channel_fader(1).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    harness.store.on_change(path, move |update| {
        sink.lock().unwrap().push(update.value);
    });

    for value in [0.1, 0.2, 0.3] {
        let message = InboundMessage::new("/ch/01/mix/fader", vec![WireValue::Float(value)]);
        harness.ingestor.ingest(&message);
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ParameterValue::Normalized(0.1),
            ParameterValue::Normalized(0.2),
            ParameterValue::Normalized(0.3),
        ]
    );
}

#[tokio::test]
async fn test_scheduler_run_loop_stops_on_shutdown() {
    let harness = Harness::new(config().with_tick_interval(Duration::from_millis(10)));
    let path = ParameterPath::main_fader();
    harness
        .registry
        .add_interest(harness.registry.next_consumer(), path, 1.0)
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = harness.scheduler.clone();
    let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.transport.sent_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribe should be sent by the run loop");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler should stop")
        .unwrap();
}

#[tokio::test]
async fn test_ingestor_run_loop_stores_inbound_values() {
    let harness = Harness::new(config());
    let path = ParameterPath::main_mute();
    harness
        .transport
        .push_inbound(vec![InboundMessage::new("/lr/mix/on", vec![WireValue::Int(0)])]);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingestor = harness.ingestor.clone();
    let transport = Arc::new(harness.transport.clone());
    let task = tokio::spawn(async move { ingestor.run(transport, shutdown_rx).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.store.value(&path).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("inbound value should be stored");

    assert_eq!(harness.store.value(&path), Some(ParameterValue::Boolean(false)));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("ingestor should stop")
        .unwrap();
}
