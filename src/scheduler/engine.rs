//! The MLFQ engine -- aging, dispatch, preemption, and selection.
//!
//! One record-step per tick, exactly one step in flight at a time. The
//! queues, stats window, and handle map sit behind tokio locks held
//! briefly per mutation; no lock is held across a step await, so
//! collaborators can submit from any task while the loop runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::queues::LevelQueues;
use super::record::{CompletionFlag, Level, Record, TransferHandle, TransferId, TransferOutcome};
use super::stats::{CompletedTransfer, StatsWindow};
use crate::config::SchedulerConfig;
use crate::transfer::TransferUnit;

pub struct TransferScheduler {
    cfg: SchedulerConfig,
    queues: Mutex<LevelQueues>,
    stats: Mutex<StatsWindow>,
    handles: RwLock<HashMap<TransferId, Arc<CompletionFlag>>>,
    next_id: AtomicU64,
}

impl TransferScheduler {
    pub fn new(cfg: SchedulerConfig) -> Self {
        let window = StatsWindow::new(cfg.stats_window_secs);
        Self {
            cfg,
            queues: Mutex::new(LevelQueues::new()),
            stats: Mutex::new(window),
            handles: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Wrap an initialized unit in a scheduling record and queue it.
    ///
    /// Probe and session-negotiation failures surface from the unit
    /// constructors before this point; a unit that failed to initialize
    /// is never queued.
    pub async fn submit(&self, unit: Box<dyn TransferUnit>, level: Level) -> TransferHandle {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let flag = Arc::new(CompletionFlag::new());
        let record = Record::new(id, level, unit, flag.clone());
        info!(
            %id,
            kind = %record.kind,
            %level,
            burst = record.burst_original,
            "transfer queued"
        );
        self.handles.write().await.insert(id, flag.clone());
        self.queues.lock().await.push(record);
        TransferHandle { id, flag }
    }

    /// Non-blocking completion poll. Stays true forever once a transfer
    /// reaches a terminal state; unknown ids report false.
    pub async fn is_complete(&self, id: TransferId) -> bool {
        self.handles
            .read()
            .await
            .get(&id)
            .is_some_and(|flag| flag.is_finished())
    }

    pub async fn outcome(&self, id: TransferId) -> Option<TransferOutcome> {
        self.handles.read().await.get(&id).and_then(|f| f.outcome())
    }

    /// Read-only snapshot of the current statistics window.
    pub async fn stats(&self) -> Vec<CompletedTransfer> {
        self.stats.lock().await.snapshot()
    }

    /// Drive the MLFQ forever; intended to occupy a spawned task for the
    /// process lifetime.
    pub async fn run(self: Arc<Self>) {
        info!(
            aging_threshold = self.cfg.aging_threshold,
            time_quantum = self.cfg.time_quantum,
            lower_priority_threshold = self.cfg.lower_priority_threshold,
            "transfer scheduler started"
        );
        let mut current: Option<Record> = None;
        loop {
            if !self.tick(&mut current).await {
                tokio::time::sleep(Duration::from_millis(self.cfg.idle_poll_ms)).await;
            }
        }
    }

    /// One scheduler iteration: roll the stats window, age the queued
    /// records, advance the running record by one step, apply preemption,
    /// and re-select. Returns false when there was nothing to do.
    pub async fn tick(&self, current: &mut Option<Record>) -> bool {
        self.stats.lock().await.roll(Utc::now());

        let promoted = self.queues.lock().await.age(self.cfg.aging_threshold);
        for id in promoted {
            info!(%id, "record aged to a higher level");
        }

        let Some(mut record) = current.take() else {
            *current = self.select().await;
            return current.is_some();
        };

        match record.unit.step().await {
            Ok(bytes) => {
                record.run_ticks += 1;
                record.burst_remaining = record.burst_remaining.saturating_sub(1);
                record.consecutive_failures = 0;
                debug!(id = %record.id, bytes, remaining = record.burst_remaining, "step");
            }
            Err(e) => {
                record.consecutive_failures += 1;
                warn!(
                    id = %record.id,
                    failures = record.consecutive_failures,
                    error = %e,
                    "transfer step failed"
                );
                if record.consecutive_failures >= self.cfg.max_step_failures {
                    self.abandon(record).await;
                    *current = self.select().await;
                    return true;
                }
            }
        }

        if record.unit.is_complete() {
            self.finish(record).await;
            *current = self.select().await;
        } else {
            *current = self.apply_preemption(record).await;
        }
        true
    }

    /// Level-specific preemption for a record that just ran a tick.
    /// Returns the record to keep running, which is the same one unless
    /// it was re-queued.
    async fn apply_preemption(&self, record: Record) -> Option<Record> {
        match record.level {
            // FCFS keeps the engine until it completes.
            Level::Fcfs => Some(record),
            Level::RoundRobin => {
                if record.run_ticks > 0 && record.run_ticks % self.cfg.time_quantum == 0 {
                    info!(id = %record.id, "time quantum expired");
                    let mut queues = self.queues.lock().await;
                    self.demote_and_requeue(&mut queues, record);
                    queues.select()
                } else {
                    Some(record)
                }
            }
            Level::Srtf => {
                let mut queues = self.queues.lock().await;
                let shorter_waiting = queues
                    .shortest_srtf_burst()
                    .is_some_and(|b| b < record.burst_remaining);
                if queues.has_waiting_above(Level::Srtf) || shorter_waiting {
                    info!(id = %record.id, "preempted");
                    self.demote_and_requeue(&mut queues, record);
                    queues.select()
                } else {
                    Some(record)
                }
            }
        }
    }

    fn demote_and_requeue(&self, queues: &mut LevelQueues, mut record: Record) {
        let before = record.level;
        record.demote(self.cfg.lower_priority_threshold);
        if record.level != before {
            info!(id = %record.id, level = %record.level, "record demoted");
        }
        queues.push(record);
    }

    async fn select(&self) -> Option<Record> {
        let selected = self.queues.lock().await.select();
        if let Some(record) = &selected {
            debug!(id = %record.id, level = %record.level, "selected");
        }
        selected
    }

    async fn finish(&self, mut record: Record) {
        let completed_at = Utc::now();
        record.completed_at = Some(completed_at);
        let entry = self
            .stats
            .lock()
            .await
            .record(record.arrival, completed_at, record.burst_original);
        record.flag.finish(TransferOutcome::Completed);
        info!(
            id = %record.id,
            kind = %record.kind,
            turnaround_secs = entry.turnaround_secs,
            waiting_secs = entry.waiting_secs,
            "transfer finished"
        );
        // The record drops here; the collaborator keeps only its flag.
    }

    async fn abandon(&self, record: Record) {
        error!(
            id = %record.id,
            kind = %record.kind,
            failures = record.consecutive_failures,
            "transfer abandoned after repeated step failures"
        );
        record.flag.finish(TransferOutcome::Failed);
    }
}
