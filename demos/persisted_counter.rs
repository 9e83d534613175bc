//! Counter that remembers its value between runs.
//!
//! Run it a few times:
//!
//! ```text
//! RUST_LOG=tincan_persist=debug cargo run --example persisted_counter
//! ```
//!
//! The count lives in `target/persisted_counter.json` and is forgotten after
//! one minute without a run.

use std::time::Duration;
use tincan_persist::{bind, FileStorage, PersistConfig, Store, SyncAdapter, Transition};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct CounterState {
    count: i32,
    history: Vec<i32>,
}

impl CounterState {
    fn new() -> Self {
        Self {
            count: 0,
            history: vec![0],
        }
    }

    fn increment(&mut self) {
        self.count += 1;
        self.history.push(self.count);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Persisted Counter ===\n");

    let store = Store::named("counter", CounterState::new());
    store.subscribe_transitions(|state, transition| {
        let origin = match transition {
            Transition::Rehydrate => "restored",
            _ => "changed",
        };
        println!("   [{}] count = {}", origin, state.count);
    });

    let storage = SyncAdapter::new(FileStorage::open("target/persisted_counter.json")?);
    let config = PersistConfig::new(storage)
        .with_prefix_key("demo")
        .with_expire(Duration::from_secs(60));

    println!("1. Binding store to storage");
    let binding = bind(&store, config)?;
    println!("   key: {}", binding.key());

    println!("\n2. Rehydrating");
    println!("   outcome: {:?}", binding.rehydrated().await);

    println!("\n3. Incrementing");
    store.update(CounterState::increment);

    println!("\n4. History: {:?}", store.read(|s| s.history.clone()));

    binding.unbind().await;
    println!("\n✓ Saved. Run again to continue counting.");
    Ok(())
}
