//! Small injectable collaborators (spec §9): a clock, a sleeper, and a
//! uuid generator. Kept as traits so tests can advance time and control
//! randomness without wall-clock sleeps or nondeterminism.

use async_trait::async_trait;
use std::time::Duration;

/// Current time, abstracted so tests don't depend on wall-clock `now()`.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Retry delay, abstracted so the bulk-docs retry loop (spec §4.3) can be
/// exercised in tests without real sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// UUID generation, abstracted so UUID-store tests can assert on the
/// generated value and so "retry until a create-only write lands" loops
/// (spec §4.4) are deterministic.
pub trait UuidGenerator: Send + Sync {
    /// Hex, no dashes, per spec §4.4.
    fn generate(&self) -> String;
}

pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A sleeper that records requested durations but never actually waits.
    #[derive(Default)]
    pub struct InstantSleeper {
        pub calls: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, d: Duration) {
            self.calls.lock().unwrap().push(d);
        }
    }

    /// Deterministic, incrementing "uuid" generator for tests.
    #[derive(Default)]
    pub struct CountingUuidGenerator {
        counter: AtomicUsize,
    }

    impl UuidGenerator for CountingUuidGenerator {
        fn generate(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("{:032x}", n)
        }
    }

    pub struct FixedClock(pub i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }
}
