//! Poll Scheduler
//!
//! Two independent state machines:
//! - lifecycle: `Unarmed -> Armed -> Stopped`. The first ready signal arms
//!   the periodic timer; repeats (reconnect storms) are ignored.
//! - cycle: `Idle <-> Running`. A tick only starts a cycle from `Idle`;
//!   ticks that arrive while `Running` are dropped, never queued.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::pool::CyclePool;
use crate::tracker::cycle::{format_elapsed, CycleRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

enum Lifecycle {
    Unarmed,
    Armed {
        shutdown_tx: watch::Sender<bool>,
        tick_loop: JoinHandle<()>,
    },
    Stopped,
}

/// Flips `Running -> Idle` when dropped, so a panicking cycle still
/// releases the scheduler.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Counters for observability and tests.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub cycles_started: AtomicU64,
    pub cycles_succeeded: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub ticks_dropped: AtomicU64,
}

pub struct PollScheduler<R: CycleRunner> {
    runner: Arc<R>,
    pool: CyclePool,
    interval: Duration,
    lifecycle: Mutex<Lifecycle>,
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
}

impl<R: CycleRunner> PollScheduler<R> {
    pub fn new(runner: Arc<R>, pool: CyclePool, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            runner,
            pool,
            interval,
            lifecycle: Mutex::new(Lifecycle::Unarmed),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SchedulerStats::default()),
        })
    }

    /// Ready-signal entry point. Arms the timer on the first call only;
    /// returns whether this call armed it.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Armed { .. } => {
                debug!("Duplicate ready signal ignored");
                return false;
            }
            Lifecycle::Stopped => {
                debug!("Ready signal after shutdown ignored");
                return false;
            }
            Lifecycle::Unarmed => {}
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tick_loop = tokio::spawn(self.clone().tick_loop(shutdown_rx));
        *lifecycle = Lifecycle::Armed {
            shutdown_tx,
            tick_loop,
        };
        info!(
            interval_secs = self.interval.as_secs(),
            workers = self.pool.size(),
            "⏱️ Updater has been started"
        );
        true
    }

    pub fn state(&self) -> CycleState {
        if self.running.load(Ordering::Acquire) {
            CycleState::Running
        } else {
            CycleState::Idle
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Armed { .. })
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Stop ticking and wait for an in-flight cycle to finish.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);

        if let Lifecycle::Armed {
            shutdown_tx,
            tick_loop,
        } = previous
        {
            let _ = shutdown_tx.send(true);
            if let Err(e) = tick_loop.await {
                error!(error = %e, "Tick loop panicked");
            }
            info!("🛑 Scheduler stopped");
        }
    }

    async fn tick_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<Option<()>>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = in_flight.take() {
                        if !handle.is_finished() {
                            in_flight = Some(handle);
                            self.stats.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                            warn!("Previous update still running, tick dropped");
                            continue;
                        }
                        // Join the finished cycle before starting the next one.
                        self.join_cycle(handle).await;
                    }
                    in_flight = self.try_begin_cycle();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            debug!("Waiting for in-flight update before shutdown");
            self.join_cycle(handle).await;
        }
    }

    async fn join_cycle(&self, handle: JoinHandle<Option<()>>) {
        if let Err(e) = handle.await {
            self.stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "❌ Update task panicked, retrying next tick");
        }
    }

    /// `Idle -> Running`, then hand the cycle to the pool.
    fn try_begin_cycle(&self) -> Option<JoinHandle<Option<()>>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.ticks_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Update already running, tick dropped");
            return None;
        }

        self.stats.cycles_started.fetch_add(1, Ordering::Relaxed);
        let runner = self.runner.clone();
        let guard = RunningGuard(self.running.clone());
        let stats = self.stats.clone();

        Some(self.pool.spawn(async move {
            let _guard = guard;
            match runner.run_cycle().await {
                Ok(report) => {
                    stats.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        elapsed = %format_elapsed(report.elapsed),
                        bootstrap = report.bootstrap,
                        "Update cycle finished"
                    );
                }
                Err(e) => {
                    stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "❌ Update cycle aborted, retrying next tick");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TrackerError};
    use crate::models::ChangeSet;
    use crate::tracker::cycle::CycleReport;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct SlowRunner {
        duration: Duration,
        fail: bool,
        runs: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowRunner {
        fn build(duration: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                duration,
                fail,
                runs: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn new(duration: Duration) -> Arc<Self> {
            Self::build(duration, false)
        }

        fn failing(duration: Duration) -> Arc<Self> {
            Self::build(duration, true)
        }
    }

    #[async_trait]
    impl CycleRunner for SlowRunner {
        async fn run_cycle(&self) -> Result<CycleReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(TrackerError::Transport("boom".to_string()));
            }
            Ok(CycleReport {
                changes: ChangeSet::default(),
                elapsed: self.duration,
                bootstrap: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_arms_once() {
        let runner = SlowRunner::new(Duration::from_secs(1));
        let scheduler = PollScheduler::new(runner.clone(), CyclePool::new(2), Duration::from_secs(600));

        assert!(scheduler.start());
        for _ in 0..5 {
            assert!(!scheduler.start());
        }
        assert!(scheduler.is_armed());

        // Ticks at t=0 and t=600 only; a second timer would double this.
        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_cycle_drops_ticks() {
        // Cycle takes 900s against a 600s interval.
        let runner = SlowRunner::new(Duration::from_secs(900));
        let scheduler = PollScheduler::new(runner.clone(), CyclePool::new(2), Duration::from_secs(600));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(650)).await;
        assert_eq!(scheduler.state(), CycleState::Running);

        // t=0 starts, t=600 dropped, t=1200 starts the second cycle.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().ticks_dropped.load(Ordering::Relaxed), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_returns_to_idle() {
        let runner = SlowRunner::failing(Duration::from_secs(5));
        let scheduler = PollScheduler::new(runner.clone(), CyclePool::new(2), Duration::from_secs(60));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.state(), CycleState::Idle);
        assert_eq!(scheduler.stats().cycles_failed.load(Ordering::Relaxed), 1);

        // Next tick retries from scratch.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    struct PanicOnce {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CycleRunner for PanicOnce {
        async fn run_cycle(&self) -> Result<CycleReport> {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("cycle blew up");
            }
            Ok(CycleReport {
                changes: ChangeSet::default(),
                elapsed: Duration::ZERO,
                bootstrap: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_cycle_returns_to_idle() {
        let runner = Arc::new(PanicOnce {
            runs: AtomicUsize::new(0),
        });
        let scheduler = PollScheduler::new(runner.clone(), CyclePool::new(2), Duration::from_secs(60));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.state(), CycleState::Idle);

        // Ticks at t=60..=300 all run; none are dropped behind a stuck latch.
        tokio::time::sleep(Duration::from_secs(271)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 6);
        assert_eq!(scheduler.stats().ticks_dropped.load(Ordering::Relaxed), 0);
        assert_eq!(scheduler.stats().cycles_failed.load(Ordering::Relaxed), 1);
        assert_eq!(scheduler.stats().cycles_succeeded.load(Ordering::Relaxed), 5);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let runner = SlowRunner::new(Duration::from_secs(120));
        let scheduler = PollScheduler::new(runner.clone(), CyclePool::new(2), Duration::from_secs(600));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(scheduler.state(), CycleState::Running);

        scheduler.shutdown().await;
        assert_eq!(scheduler.state(), CycleState::Idle);
        assert_eq!(scheduler.stats().cycles_succeeded.load(Ordering::Relaxed), 1);

        // No re-arming after shutdown.
        assert!(!scheduler.start());
        assert!(!scheduler.is_armed());
    }
}
