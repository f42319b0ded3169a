//! The long-lived polling loop.
//!
//! A cycle runs to completion once started; shutdown is only observed while
//! sleeping between cycles. The interval is measured from the end of one
//! cycle to the start of the next, so cycles never overlap.

use chrono::Utc;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use consolemon_core::services::{EnumerationService, SnapshotService};
use consolemon_core::{CycleReport, PollEngine};

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    /// Cycles that did not run (enumeration or persistence failure).
    pub failures: u64,
}

pub struct Scheduler<E, S> {
    engine: PollEngine<E, S>,
    interval: Duration,
}

impl<E, S> Scheduler<E, S>
where
    E: EnumerationService,
    S: SnapshotService,
{
    pub fn new(engine: PollEngine<E, S>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run cycles until `shutdown` resolves, or exactly one cycle if `once`.
    pub async fn run<F>(&self, once: bool, shutdown: F) -> LoopStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = LoopStats::default();

        loop {
            stats.cycles += 1;
            if self.tick(stats.cycles).await.is_none() {
                stats.failures += 1;
            }
            if once {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        stats
    }

    async fn tick(&self, cycle: u64) -> Option<CycleReport> {
        let started = Instant::now();
        info!(cycle, "poll cycle starting");

        match self.engine.run_cycle(Utc::now()).await {
            Ok(report) => {
                if report.is_partial() {
                    warn!(cycle, pids = ?report.capture_failures, "some sessions could not be captured");
                }
                if !report.hanging.is_empty() {
                    warn!(cycle, pids = ?report.hanging, "sessions became hanging");
                }
                info!(
                    cycle,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    sessions = report.sessions,
                    "poll cycle finished"
                );
                Some(report)
            }
            Err(e) => {
                error!(cycle, kind = e.kind(), error = %e, "poll cycle failed, registry left unchanged");
                None
            }
        }
    }
}
