//! Scheduling records -- the metadata wrapper the MLFQ tracks per transfer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::transfer::{TransferKind, TransferUnit};

/// Priority level of a scheduling record (lower number = higher priority).
///
/// Level 1 runs first-come-first-served and is never preempted, level 2
/// runs round-robin on a fixed quantum, level 3 resolves contention by
/// shortest remaining time. Records age upward and are demoted downward
/// one level at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Level {
    Fcfs = 1,
    RoundRobin = 2,
    Srtf = 3,
}

impl Level {
    pub fn from_number(n: u8) -> Option<Level> {
        match n {
            1 => Some(Level::Fcfs),
            2 => Some(Level::RoundRobin),
            3 => Some(Level::Srtf),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// One level toward FCFS; saturates at level 1.
    pub(crate) fn promoted(self) -> Level {
        match self {
            Level::Fcfs | Level::RoundRobin => Level::Fcfs,
            Level::Srtf => Level::RoundRobin,
        }
    }

    /// One level toward SRTF; saturates at level 3.
    pub(crate) fn demoted(self) -> Level {
        match self {
            Level::Fcfs => Level::RoundRobin,
            Level::RoundRobin | Level::Srtf => Level::Srtf,
        }
    }
}

impl Default for Level {
    /// New transfers enter at the lowest level.
    fn default() -> Self {
        Level::Srtf
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Unique transfer identity; monotonically increasing, never reused while
/// the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal state of a transfer as seen through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Completed,
    Failed,
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const FAILED: u8 = 2;

/// One-shot completion signal shared between the scheduler and the
/// submitting collaborator. Polling inspects the atomic; waiters park on
/// the notify.
#[derive(Debug)]
pub struct CompletionFlag {
    state: AtomicU8,
    notify: Notify,
}

impl CompletionFlag {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            notify: Notify::new(),
        }
    }

    pub(crate) fn finish(&self, outcome: TransferOutcome) {
        let state = match outcome {
            TransferOutcome::Completed => COMPLETED,
            TransferOutcome::Failed => FAILED,
        };
        self.state.store(state, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn outcome(&self) -> Option<TransferOutcome> {
        match self.state.load(Ordering::Acquire) {
            COMPLETED => Some(TransferOutcome::Completed),
            FAILED => Some(TransferOutcome::Failed),
            _ => None,
        }
    }

    /// Non-blocking: has the transfer reached a terminal state?
    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }
}

impl Default for CompletionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// What `submit` hands back: the identity plus the completion flag.
#[derive(Debug, Clone)]
pub struct TransferHandle {
    pub id: TransferId,
    pub(crate) flag: Arc<CompletionFlag>,
}

impl TransferHandle {
    pub fn is_complete(&self) -> bool {
        self.flag.is_finished()
    }

    pub fn outcome(&self) -> Option<TransferOutcome> {
        self.flag.outcome()
    }

    /// Await the terminal state without spinning.
    pub async fn wait(&self) -> TransferOutcome {
        loop {
            let notified = self.flag.notify.notified();
            if let Some(outcome) = self.flag.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

/// A Transfer Unit wrapped with scheduling metadata.
pub struct Record {
    pub id: TransferId,
    pub kind: TransferKind,
    pub level: Level,
    pub arrival: DateTime<Utc>,
    pub burst_remaining: u32,
    pub burst_original: u32,
    /// Ticks spent waiting in a queue since the last promotion.
    pub wait_ticks: u32,
    /// Ticks spent running at the current level since the last demotion.
    pub run_ticks: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub unit: Box<dyn TransferUnit>,
    pub flag: Arc<CompletionFlag>,
}

impl Record {
    pub fn new(
        id: TransferId,
        level: Level,
        unit: Box<dyn TransferUnit>,
        flag: Arc<CompletionFlag>,
    ) -> Self {
        let burst = unit.burst_steps();
        Self {
            id,
            kind: unit.kind(),
            level,
            arrival: Utc::now(),
            burst_remaining: burst,
            burst_original: burst,
            wait_ticks: 0,
            run_ticks: 0,
            completed_at: None,
            consecutive_failures: 0,
            unit,
            flag,
        }
    }

    /// Promote one level; resets the wait counter only when a move happens.
    pub fn promote(&mut self) {
        if self.level != Level::Fcfs {
            self.level = self.level.promoted();
            self.wait_ticks = 0;
        }
    }

    /// Apply the demotion rule: once `threshold` run ticks have accrued,
    /// drop one level (saturating at 3) and reset the run counter. Below
    /// the threshold nothing changes.
    pub fn demote(&mut self, threshold: u32) {
        if self.run_ticks >= threshold {
            self.level = self.level.demoted();
            self.run_ticks = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{TransferError, TransferKind, TransferUnit};
    use async_trait::async_trait;

    struct NullUnit;

    #[async_trait]
    impl TransferUnit for NullUnit {
        fn kind(&self) -> TransferKind {
            TransferKind::Download
        }
        fn size_total(&self) -> u64 {
            0
        }
        fn burst_steps(&self) -> u32 {
            4
        }
        async fn step(&mut self) -> Result<u64, TransferError> {
            Ok(0)
        }
        fn is_complete(&self) -> bool {
            false
        }
    }

    fn record(level: Level) -> Record {
        Record::new(
            TransferId(1),
            level,
            Box::new(NullUnit),
            Arc::new(CompletionFlag::new()),
        )
    }

    #[test]
    fn test_level_stays_in_range_under_any_sequence() {
        let mut rec = record(Level::Srtf);
        for _ in 0..10 {
            rec.promote();
            assert!((1..=3).contains(&rec.level.number()));
        }
        assert_eq!(rec.level, Level::Fcfs);

        rec.run_ticks = 100;
        for _ in 0..10 {
            rec.demote(5);
            rec.run_ticks = 100;
            assert!((1..=3).contains(&rec.level.number()));
        }
        assert_eq!(rec.level, Level::Srtf);
    }

    #[test]
    fn test_promote_resets_wait_only_on_move() {
        let mut rec = record(Level::Srtf);
        rec.wait_ticks = 10;
        rec.promote();
        assert_eq!(rec.level, Level::RoundRobin);
        assert_eq!(rec.wait_ticks, 0);

        let mut top = record(Level::Fcfs);
        top.wait_ticks = 10;
        top.promote();
        assert_eq!(top.level, Level::Fcfs);
        assert_eq!(top.wait_ticks, 10);
    }

    #[test]
    fn test_demote_below_threshold_is_noop() {
        let mut rec = record(Level::RoundRobin);
        rec.run_ticks = 4;
        rec.demote(5);
        assert_eq!(rec.level, Level::RoundRobin);
        assert_eq!(rec.run_ticks, 4);
    }

    #[test]
    fn test_demote_at_lowest_level_still_resets_run_ticks() {
        let mut rec = record(Level::Srtf);
        rec.run_ticks = 6;
        rec.demote(5);
        assert_eq!(rec.level, Level::Srtf);
        assert_eq!(rec.run_ticks, 0);
    }

    #[test]
    fn test_burst_captured_from_unit() {
        let rec = record(Level::Srtf);
        assert_eq!(rec.burst_original, 4);
        assert_eq!(rec.burst_remaining, 4);
    }

    #[test]
    fn test_completion_flag_is_idempotent() {
        let flag = CompletionFlag::new();
        assert!(!flag.is_finished());
        flag.finish(TransferOutcome::Completed);
        assert!(flag.is_finished());
        assert!(flag.is_finished());
        assert_eq!(flag.outcome(), Some(TransferOutcome::Completed));
    }
}
