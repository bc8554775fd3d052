use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tilestock_inventory::ReleaseCause;

use crate::error::StockError;
use crate::services::{AlertEvaluator, ReleaseOutcome, ReservationManager, StockContext};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Active holds found past their window.
    pub scanned: usize,
    pub expired: usize,
    /// Released or confirmed by someone else between the scan and the release.
    pub already_terminal: usize,
    pub failed: usize,
}

/// Running totals across sweeps, shared with the handle.
#[derive(Debug, Default)]
pub struct SweeperStats {
    runs: AtomicU64,
    expired: AtomicU64,
    failed: AtomicU64,
}

impl SweeperStats {
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, report: &SweepReport) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.expired
            .fetch_add(report.expired as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }
}

/// Releases active reservations whose hold window has passed.
///
/// Goes through the same release path as a cart removal, so it is safe to run
/// concurrently with itself, with `sync_for_session` and with checkouts.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    ctx: StockContext,
    reservations: ReservationManager,
    alerts: AlertEvaluator,
}

impl ExpirySweeper {
    pub fn new(ctx: StockContext, reservations: ReservationManager, alerts: AlertEvaluator) -> Self {
        Self {
            ctx,
            reservations,
            alerts,
        }
    }

    /// One pass. Individual release failures are logged and counted; only a
    /// failure to list expired holds fails the sweep.
    #[instrument(skip(self), err)]
    pub fn sweep_once(&self) -> Result<SweepReport, StockError> {
        let now = self.ctx.clock.now();
        let candidates = self.ctx.store.expired_active(now)?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for reservation in candidates {
            match self.reservations.release(reservation.id, ReleaseCause::Expired) {
                Ok(ReleaseOutcome::Released(_)) => report.expired += 1,
                Ok(ReleaseOutcome::AlreadyTerminal(_)) => report.already_terminal += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        reservation_id = %reservation.id,
                        error = %err,
                        "failed to expire reservation"
                    );
                }
            }
        }

        if let Err(err) = self.alerts.evaluate_batches() {
            warn!(error = %err, "batch expiry evaluation failed");
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                already_terminal = report.already_terminal,
                failed = report.failed,
                "expiry sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "expiry sweep found nothing to release");
        }
        Ok(report)
    }

    /// Run [`ExpirySweeper::sweep_once`] every `interval` on a named thread.
    pub fn spawn(self, interval: Duration) -> io::Result<SweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(SweeperStats::default());
        let worker_stats = stats.clone();

        let join = thread::Builder::new()
            .name("expiry-sweeper".to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                    match self.sweep_once() {
                        Ok(report) => worker_stats.record(&report),
                        Err(err) => {
                            worker_stats.runs.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %err, "expiry sweep failed");
                        }
                    }
                }
                debug!("expiry sweeper stopped");
            })?;

        Ok(SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

/// Control handle for a spawned sweeper. Dropping it also stops the thread
/// (at its next wake-up) without waiting for it.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<SweeperStats>,
}

impl SweeperHandle {
    pub fn stats(&self) -> &SweeperStats {
        &self.stats
    }

    /// Request shutdown and wait for the current sweep to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("expiry sweeper thread panicked");
            }
        }
    }
}
