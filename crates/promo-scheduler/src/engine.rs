//! Scheduler: drives the dispatch cycle on a fixed interval.
//! Uses tokio::time::interval so the task sleeps between ticks.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::PromoteEngine;

/// Cancellable periodic driver for [`PromoteEngine::run_cycle`].
pub struct Scheduler {
    engine: Arc<PromoteEngine>,
    /// Present while the tick loop is running.
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    /// Held for the duration of a cycle; shared across restarts.
    cycle_gate: Arc<AsyncMutex<()>>,
}

impl Scheduler {
    pub fn new(engine: Arc<PromoteEngine>) -> Self {
        Self {
            engine,
            shutdown_tx: Mutex::new(None),
            cycle_gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn engine(&self) -> &Arc<PromoteEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start ticking every `period`, first tick one period from now.
    /// Returns false if already running. Must be called inside a tokio runtime.
    pub fn start(&self, period: Duration) -> bool {
        let mut slot = self.shutdown_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(tx);
        drop(slot);
        let first = Instant::now() + period;

        tracing::info!("⏰ Auto promote scheduler started (every {}s)", period.as_secs());
        tokio::spawn(tick_loop(
            self.engine.clone(),
            self.cycle_gate.clone(),
            first,
            period,
            rx,
        ));
        true
    }

    /// Cancel future ticks. A cycle already in progress runs to completion.
    /// Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                tx.send(true).ok();
                tracing::info!("🛑 Auto promote scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Wait until no cycle is in progress.
    pub async fn wait_idle(&self) {
        let _idle = self.cycle_gate.lock().await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(
    engine: Arc<PromoteEngine>,
    gate: Arc<AsyncMutex<()>>,
    first: Instant,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Shutdown wins over a tick that is ready at the same time
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        // A tick that lands during a running cycle is dropped, not queued
        let Ok(permit) = gate.clone().try_lock_owned() else {
            tracing::warn!("⏭️ Previous promote cycle still running, tick skipped");
            continue;
        };
        let engine = engine.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match engine.run_cycle().await {
                Ok(report) => tracing::debug!("Cycle report: {report}"),
                Err(e) => tracing::error!("❌ Promote cycle failed: {e}"),
            }
        });
    }
    tracing::debug!("Scheduler tick loop exited");
}
