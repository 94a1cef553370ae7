//! Supervised background work.
//!
//! Slow work, like building a relay session, must not block the inbound event
//! loop. [`WorkerPool`] runs it on tokio tasks and acts as the failure
//! boundary: errors are reported to the originating
//! channel and panics are logged instead of escaping.
//!
//! The bound applies to execution only: every spawned task exists right away
//! and waits for a permit, so at most `max_workers` run their work at once
//! while the number of waiting tasks is unbounded.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span, warn};

use crate::error::{BotError, BotResult};
use crate::event::ChannelId;
use crate::reply::Replier;

/// Supervised tokio tasks with bounded concurrent execution.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    replier: Replier,
}

impl WorkerPool {
    /// Creates a pool running at most `max_workers` tasks at once (at least one).
    pub fn new(max_workers: usize, replier: Replier) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            replier,
        }
    }

    /// Number of tasks that could start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns `work` right away; it runs once a permit is free. Failures are
    /// answered in `channel`.
    pub fn spawn<F>(&self, name: &'static str, channel: ChannelId, work: F) -> JoinHandle<()>
    where
        F: Future<Output = BotResult<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let replier = self.replier.clone();
        let span = info_span!("worker", task = name, channel = %channel);

        tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    warn!("Worker pool closed, dropping task");
                    return;
                };

                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => replier.report(&channel, &err).await,
                    Err(panic) => {
                        let reason = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        error!(reason = %reason, "Worker panicked");
                        replier
                            .report(&channel, &BotError::internal(format!("worker panicked: {reason}")))
                            .await;
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Stops admitting new tasks. Running tasks finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::message::Tone;
    use crate::testing::FakePlatform;

    fn pool(max: usize) -> (Arc<FakePlatform>, WorkerPool) {
        let platform = Arc::new(FakePlatform::new());
        let pool = WorkerPool::new(max, Replier::new(platform.clone()));
        (platform, pool)
    }

    #[tokio::test]
    async fn test_errors_are_reported() {
        let (platform, pool) = pool(2);
        pool.spawn("warn", "dm".into(), async { Err(BotError::warning("nope")) })
            .await
            .unwrap();

        let sent = platform.sent_to("dm");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].embeds[0].tone, Tone::Caution);
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let (platform, pool) = pool(1);
        let handle = pool.spawn("panic", "dm".into(), async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });

        assert!(handle.await.is_ok());
        assert_eq!(platform.sent_to("dm")[0].summary(), "Something went wrong");
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (_platform, pool) = pool(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn("sleep", "dm".into(), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
