//! The three level queues backing the MLFQ.

use std::collections::VecDeque;

use super::record::{Level, Record, TransferId};

/// Records awaiting execution, one FIFO queue per priority level.
///
/// Storage order is insertion order at every level. The SRTF comparison
/// for level 3 is applied at decision points only (preemption checks and
/// selection); it never reorders the stored queue.
pub struct LevelQueues {
    fcfs: VecDeque<Record>,
    rr: VecDeque<Record>,
    srtf: VecDeque<Record>,
}

impl LevelQueues {
    pub fn new() -> Self {
        Self {
            fcfs: VecDeque::new(),
            rr: VecDeque::new(),
            srtf: VecDeque::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        match record.level {
            Level::Fcfs => self.fcfs.push_back(record),
            Level::RoundRobin => self.rr.push_back(record),
            Level::Srtf => self.srtf.push_back(record),
        }
    }

    pub fn len(&self) -> usize {
        self.fcfs.len() + self.rr.len() + self.srtf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One aging tick: every queued record waits, and records past the
    /// threshold move up one level (to the back of the higher queue).
    /// Returns the promoted ids.
    pub fn age(&mut self, aging_threshold: u32) -> Vec<TransferId> {
        for queue in [&mut self.fcfs, &mut self.rr, &mut self.srtf] {
            for record in queue.iter_mut() {
                record.wait_ticks += 1;
            }
        }

        let mut promoted = Vec::new();

        let mut i = 0;
        while i < self.rr.len() {
            if self.rr[i].wait_ticks >= aging_threshold {
                let mut record = self.rr.remove(i).expect("index checked");
                record.promote();
                promoted.push(record.id);
                self.fcfs.push_back(record);
            } else {
                i += 1;
            }
        }

        // Records promoted out of level 3 land behind the level-2 records
        // already examined, so nothing moves twice in one tick.
        let mut i = 0;
        while i < self.srtf.len() {
            if self.srtf[i].wait_ticks >= aging_threshold {
                let mut record = self.srtf.remove(i).expect("index checked");
                record.promote();
                promoted.push(record.id);
                self.rr.push_back(record);
            } else {
                i += 1;
            }
        }

        promoted
    }

    /// True when any record waits at a level strictly above `level`.
    pub fn has_waiting_above(&self, level: Level) -> bool {
        match level {
            Level::Fcfs => false,
            Level::RoundRobin => !self.fcfs.is_empty(),
            Level::Srtf => !self.fcfs.is_empty() || !self.rr.is_empty(),
        }
    }

    /// Smallest remaining burst among queued level-3 records.
    pub fn shortest_srtf_burst(&self) -> Option<u32> {
        self.srtf.iter().map(|r| r.burst_remaining).min()
    }

    /// Remove and return the next record to run: levels scan 1, 2, 3;
    /// levels 1 and 2 pop FIFO, level 3 takes the shortest remaining burst
    /// (first among ties). The selected record is no longer waiting, so
    /// its wait counter resets.
    pub fn select(&mut self) -> Option<Record> {
        let mut record = if let Some(r) = self.fcfs.pop_front() {
            r
        } else if let Some(r) = self.rr.pop_front() {
            r
        } else {
            // Strict comparison keeps the first of equally short records.
            let mut shortest: Option<usize> = None;
            for (i, r) in self.srtf.iter().enumerate() {
                if shortest.map_or(true, |s| r.burst_remaining < self.srtf[s].burst_remaining) {
                    shortest = Some(i);
                }
            }
            self.srtf.remove(shortest?).expect("index from enumerate")
        };
        record.wait_ticks = 0;
        Some(record)
    }

    #[cfg(test)]
    pub(crate) fn queued(&self, level: Level) -> impl Iterator<Item = &Record> {
        match level {
            Level::Fcfs => self.fcfs.iter(),
            Level::RoundRobin => self.rr.iter(),
            Level::Srtf => self.srtf.iter(),
        }
    }
}

impl Default for LevelQueues {
    fn default() -> Self {
        Self::new()
    }
}
