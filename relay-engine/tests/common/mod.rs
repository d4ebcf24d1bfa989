#![allow(dead_code)]

pub mod mock_transport;

use std::sync::Arc;
use std::time::Duration;

use relay_engine::{Governor, RelayEngine, RetryPolicy};
use storage::{InMemoryMappingStore, MappingStore};

use mock_transport::MockTransport;

pub const SOURCE: i64 = -1001;
pub const T1: i64 = -2001;
pub const T2: i64 = -2002;
pub const T3: i64 = -2003;

/// Policy with short delays; paused-clock tests advance through them instantly.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        exponential: true,
        max_rate_limit_waits: 1,
        max_redeliveries: 2,
        redelivery_delay: Duration::from_millis(100),
    }
}

pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub store: Arc<InMemoryMappingStore>,
    pub engine: Arc<RelayEngine>,
}

pub fn harness(targets: &[i64]) -> Harness {
    harness_with(targets, fast_policy())
}

pub fn harness_with(targets: &[i64], policy: RetryPolicy) -> Harness {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(InMemoryMappingStore::new());
    let engine = Arc::new(RelayEngine::new(
        transport.clone(),
        store.clone() as Arc<dyn MappingStore>,
        Governor::new(policy),
        SOURCE,
        targets.to_vec(),
    ));
    Harness {
        transport,
        store,
        engine,
    }
}
