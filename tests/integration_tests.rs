//! Integration tests for Tincan Persist

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, AtomicUsize, Ordering},
    mpsc, Arc,
};
use std::time::Duration;
use tempfile::TempDir;
use tincan_persist::{
    bind, bind_with_codec, make_binder, AsyncStorage, Clock, Codec, FileStorage, JsonCodec,
    MemoryStorage, PersistConfig, PersistError, PersistResult, PersistedRecord, Rehydration,
    Store, SyncAdapter, SyncStorage, Transition,
};

#[derive(Clone)]
struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    fn at(millis: i64) -> Self {
        Self(Arc::new(AtomicI64::new(millis)))
    }

    fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Storage whose every call fails, counting the attempts.
#[derive(Default)]
struct BrokenStorage {
    calls: AtomicUsize,
}

#[async_trait]
impl AsyncStorage for BrokenStorage {
    async fn get_item(&self, _key: &str) -> PersistResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Storage("disk on fire".into()))
    }

    async fn set_item(&self, _key: &str, _value: &str) -> PersistResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Storage("disk on fire".into()))
    }

    async fn remove_item(&self, _key: &str) -> PersistResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Storage("disk on fire".into()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    visits: u32,
}

fn stored<T: Serialize + serde::de::DeserializeOwned>(storage: &MemoryStorage, key: &str) -> PersistedRecord<T> {
    let raw = storage.get(key).expect("nothing stored");
    JsonCodec.decode(&raw).expect("stored record is well-formed")
}

#[tokio::test]
async fn fresh_store_is_left_alone_until_it_changes() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::at(5_000);
    let store = Store::named("counter", 0);

    let config = PersistConfig::new(storage.clone()).with_clock(clock.clone());
    let binding = bind(&store, config).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Missing);
    assert_eq!(store.get(), 0);
    assert!(storage.is_empty());

    store.set(7);
    binding.flush().await;

    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record, PersistedRecord::new(5_000, 7));
    assert_eq!(storage.get("counter").unwrap(), "[5000,7]");
}

#[tokio::test]
async fn persisted_value_is_restored() {
    let storage = MemoryStorage::with_data([(
        "app:session",
        r#"[1000,{"user":"ada","visits":3}]"#,
    )]);
    let store = Store::named(
        "session",
        Session {
            user: String::new(),
            visits: 0,
        },
    );

    let config = PersistConfig::new(storage.clone())
        .with_prefix_key("app")
        .with_clock(ManualClock::at(2_000));
    let binding = bind(&store, config).unwrap();

    assert_eq!(binding.key(), "app:session");
    assert_eq!(binding.rehydrated().await, Rehydration::Restored);
    assert_eq!(
        store.get(),
        Session {
            user: "ada".into(),
            visits: 3,
        }
    );
}

#[tokio::test]
async fn rehydration_is_a_distinct_transition() {
    let storage = MemoryStorage::with_data([("counter", "[1,41]")]);
    let store = Store::named("counter", 0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    store.subscribe_transitions(move |value: &i32, transition| {
        seen_clone.lock().push((*value, transition));
    });

    let binding = bind(&store, PersistConfig::new(storage)).unwrap();
    binding.rehydrated().await;
    store.update(|n| *n += 1);

    assert_eq!(
        *seen.lock(),
        vec![(41, Transition::Rehydrate), (42, Transition::Update)]
    );
}

#[tokio::test]
async fn expired_record_is_deleted_not_restored() {
    let storage = MemoryStorage::with_data([("counter", "[1000,9]")]);
    let store = Store::named("counter", 0);

    let config = PersistConfig::new(storage.clone())
        .with_expire(Duration::from_millis(500))
        .with_clock(ManualClock::at(1_501));
    let binding = bind(&store, config).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Expired);
    assert_eq!(store.get(), 0);
    assert!(!storage.contains_key("counter"));
}

#[tokio::test]
async fn record_within_window_is_restored_and_kept() {
    for now in [1_400, 1_500] {
        let storage = MemoryStorage::with_data([("counter", "[1000,9]")]);
        let store = Store::named("counter", 0);

        let config = PersistConfig::new(storage.clone())
            .with_expire(Duration::from_millis(500))
            .with_clock(ManualClock::at(now));
        let binding = bind(&store, config).unwrap();

        assert_eq!(binding.rehydrated().await, Rehydration::Restored, "now = {now}");
        assert_eq!(store.get(), 9);
        binding.flush().await;

        // the restored value is written back with a fresh timestamp
        let record: PersistedRecord<i32> = stored(&storage, "counter");
        assert_eq!(record, PersistedRecord::new(now, 9));
    }
}

#[tokio::test]
async fn zero_expiry_never_expires() {
    let storage = MemoryStorage::with_data([("counter", "[0,3]")]);
    let store = Store::named("counter", 0);

    let config = PersistConfig::new(storage)
        .with_expire(Duration::ZERO)
        .with_clock(ManualClock::at(1_000_000));
    let binding = bind(&store, config).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Restored);
    assert_eq!(store.get(), 3);
}

#[tokio::test]
async fn corrupt_record_is_ignored() {
    let storage = MemoryStorage::with_data([("counter", "definitely not json")]);
    let store = Store::named("counter", 5);

    let binding = bind(&store, PersistConfig::new(storage.clone())).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Corrupt);
    assert_eq!(store.get(), 5);

    store.set(6);
    binding.flush().await;
    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 6);
}

#[tokio::test]
async fn later_writes_win() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::at(100);
    let store = Store::named("counter", 0);

    let config = PersistConfig::new(storage.clone()).with_clock(clock.clone());
    let binding = bind(&store, config).unwrap();
    binding.rehydrated().await;

    store.set(1);
    binding.flush().await;
    let first: PersistedRecord<i32> = stored(&storage, "counter");

    clock.advance(10);
    store.set(2);
    binding.flush().await;
    let second: PersistedRecord<i32> = stored(&storage, "counter");

    assert_eq!(second.value, 2);
    assert!(second.written_at_ms >= first.written_at_ms);
}

#[tokio::test]
async fn burst_of_changes_is_written_in_order() {
    let storage = MemoryStorage::new();
    let store = Store::named("counter", 0);
    let binding = bind(&store, PersistConfig::new(storage.clone())).unwrap();

    for _ in 0..100 {
        store.update(|n| *n += 1);
    }
    binding.flush().await;

    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 100);
}

#[tokio::test]
async fn change_before_rehydration_keeps_newer_state() {
    let storage = MemoryStorage::with_data([("counter", "[1,99]")]);
    let store = Store::named("counter", 0);

    let binding = bind(&store, PersistConfig::new(storage.clone())).unwrap();
    // The current-thread runtime has not polled the read yet.
    store.set(1);

    assert_eq!(binding.rehydrated().await, Rehydration::Superseded);
    assert_eq!(store.get(), 1);

    binding.flush().await;
    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 1);
}

#[tokio::test]
async fn disposed_store_is_not_rehydrated() {
    let storage = MemoryStorage::with_data([("counter", "[1,99]")]);
    let store = Store::named("counter", 0);

    let binding = bind(&store, PersistConfig::new(storage)).unwrap();
    store.dispose();

    assert_eq!(binding.rehydrated().await, Rehydration::Disposed);
    assert_eq!(store.get(), 0);
}

#[tokio::test]
async fn storage_failures_are_absorbed() {
    let storage = Arc::new(BrokenStorage::default());
    let store = Store::named("counter", 0);

    let binding = bind(&store, PersistConfig::from_shared(storage.clone())).unwrap();
    assert_eq!(binding.rehydrated().await, Rehydration::Failed);

    store.set(1);
    store.set(2);
    binding.flush().await;

    assert_eq!(store.get(), 2);
    assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unnamed_store_needs_a_prefix() {
    let store = Store::new(0);

    let result = bind(&store, PersistConfig::new(MemoryStorage::new()));
    assert!(matches!(result, Err(PersistError::Configuration(_))));

    let binding = bind(
        &store,
        PersistConfig::new(MemoryStorage::new()).with_prefix_key("settings"),
    )
    .unwrap();
    assert_eq!(binding.key(), "settings");
}

#[tokio::test]
async fn binder_shares_config_across_stores() {
    let storage = MemoryStorage::with_data([("app:title", r#"[1,"restored"]"#)]);
    let binder = make_binder(PersistConfig::new(storage.clone()).with_prefix_key("app"));

    let counter = Store::named("counter", 0u32);
    let title = Store::named("title", String::from("untitled"));
    let counter_binding = binder.bind(&counter).unwrap();
    let title_binding = binder.bind(&title).unwrap();

    assert_eq!(counter_binding.rehydrated().await, Rehydration::Missing);
    assert_eq!(title_binding.rehydrated().await, Rehydration::Restored);
    assert_eq!(title.get(), "restored");

    counter.set(3);
    counter_binding.flush().await;
    let record: PersistedRecord<u32> = stored(&storage, "app:counter");
    assert_eq!(record.value, 3);
}

#[tokio::test]
async fn binding_twice_writes_twice() {
    let writes = Arc::new(AtomicUsize::new(0));

    struct CountingStorage(MemoryStorage, Arc<AtomicUsize>);

    #[async_trait]
    impl AsyncStorage for CountingStorage {
        async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
            AsyncStorage::get_item(&self.0, key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
            self.1.fetch_add(1, Ordering::SeqCst);
            AsyncStorage::set_item(&self.0, key, value).await
        }

        async fn remove_item(&self, key: &str) -> PersistResult<()> {
            AsyncStorage::remove_item(&self.0, key).await
        }
    }

    let config = PersistConfig::new(CountingStorage(MemoryStorage::new(), writes.clone()));
    let store = Store::named("counter", 0);
    let first = bind(&store, config.clone()).unwrap();
    let second = bind(&store, config).unwrap();

    store.set(1);
    first.flush().await;
    second.flush().await;

    assert_eq!(writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unbind_flushes_and_stops() {
    let storage = MemoryStorage::new();
    let store = Store::named("counter", 0);
    let binding = bind(&store, PersistConfig::new(storage.clone())).unwrap();

    store.set(1);
    binding.unbind().await;
    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 1);

    store.set(2);
    tokio::task::yield_now().await;
    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 1);
}

#[tokio::test]
async fn file_storage_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");

    {
        let storage = SyncAdapter::new(FileStorage::open(&path).unwrap());
        let store = Store::named("session", Session {
            user: "grace".into(),
            visits: 0,
        });
        let binding = bind(&store, PersistConfig::new(storage).with_prefix_key("app")).unwrap();
        binding.rehydrated().await;
        store.update(|s| s.visits += 1);
        binding.unbind().await;
    }

    let storage = SyncAdapter::new(FileStorage::open(&path).unwrap());
    let store = Store::named("session", Session {
        user: String::new(),
        visits: 0,
    });
    let binding = bind(&store, PersistConfig::new(storage).with_prefix_key("app")).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Restored);
    assert_eq!(
        store.get(),
        Session {
            user: "grace".into(),
            visits: 1,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_changes_persist_the_latest_state() {
    let storage = MemoryStorage::new();
    let store = Store::named("counter", 0);

    // Holds the notification for 1 until 2 has been fully applied.
    let (entered_tx, entered) = mpsc::channel();
    let (release, gate) = mpsc::channel::<()>();
    let (entered_tx, gate) = (Mutex::new(entered_tx), Mutex::new(gate));
    store.subscribe(move |value: &i32| {
        if *value == 1 {
            let _ = entered_tx.lock().send(());
            let _ = gate.lock().recv_timeout(Duration::from_secs(5));
        }
    });

    let binding = bind(&store, PersistConfig::new(storage.clone())).unwrap();
    binding.rehydrated().await;

    let first = {
        let store = store.clone();
        std::thread::spawn(move || store.set(1))
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    store.set(2);
    release.send(()).unwrap();
    first.join().unwrap();
    binding.flush().await;

    assert_eq!(store.get(), 2);
    let record: PersistedRecord<i32> = stored(&storage, "counter");
    assert_eq!(record.value, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stores_sharing_a_file_keep_every_write() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");

    let mut bound = Vec::new();
    for n in 0..4 {
        let storage = SyncAdapter::new(FileStorage::open(&path).unwrap());
        let store = Store::named(format!("store-{}", n), 0u32);
        let binding = bind(&store, PersistConfig::new(storage)).unwrap();
        binding.rehydrated().await;
        bound.push((store, binding));
    }

    let writers: Vec<_> = bound
        .iter()
        .map(|(store, _)| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    store.update(|n| *n += 1);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }
    for (_, binding) in bound {
        binding.unbind().await;
    }

    let reopened = FileStorage::open(&path).unwrap();
    for n in 0..4 {
        let raw = reopened.get_item(&format!("store-{}", n)).unwrap().expect("store was persisted");
        let record: PersistedRecord<u32> = JsonCodec.decode(&raw).unwrap();
        assert_eq!(record.value, 25);
    }
}

/// Stores only the value, as `"<timestamp>|<value>"`.
struct PipeCodec;

impl Codec<u64> for PipeCodec {
    fn encode(&self, written_at_ms: i64, value: &u64) -> PersistResult<String> {
        Ok(format!("{}|{}", written_at_ms, value))
    }

    fn decode(&self, raw: &str) -> PersistResult<PersistedRecord<u64>> {
        let (ts, value) = raw
            .split_once('|')
            .ok_or_else(|| PersistError::Deserialization(raw.to_string()))?;
        let parse = |s: &str| PersistError::Deserialization(s.to_string());
        Ok(PersistedRecord::new(
            ts.parse::<i64>().map_err(|_| parse(ts))?,
            value.parse::<u64>().map_err(|_| parse(value))?,
        ))
    }
}

#[tokio::test]
async fn custom_codec_is_used_both_ways() {
    let storage = MemoryStorage::with_data([("hits", "10|41")]);
    let store = Store::named("hits", 0u64);

    let config = PersistConfig::new(storage.clone()).with_clock(ManualClock::at(20));
    let binding = bind_with_codec(&store, config, PipeCodec).unwrap();

    assert_eq!(binding.rehydrated().await, Rehydration::Restored);
    store.update(|n| *n += 1);
    binding.flush().await;

    assert_eq!(store.get(), 42);
    assert_eq!(storage.get("hits").unwrap(), "20|42");
}
