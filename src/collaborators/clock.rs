//! Timer collaborator (SPEC_FULL.md §6).

use std::time::Duration;

use async_trait::async_trait;

/// A one-shot timer: "wake up after `duration`".
///
/// The source's `timer_register`/`timer_cancel` pair is translated here
/// as an `async fn` plus ordinary task cancellation: the connection
/// engine spawns `clock.sleep(duration)` as a Tokio task and cancels it
/// with `JoinHandle::abort`, which is Tokio's synchronous-cancellation
/// primitive (SPEC_FULL.md §4.2, §5).
///
/// Production code uses [`TokioClock`]. Tests substitute a clock backed
/// by Tokio's paused virtual time (`tokio::time::{pause, advance}`) so
/// scripted scenarios advance deterministically instead of sleeping in
/// wall-clock time.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Production [`Clock`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
