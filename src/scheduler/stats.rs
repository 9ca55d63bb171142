//! Rolling turnaround / waiting-time statistics for completed transfers.

use chrono::{DateTime, Duration, Utc};

/// Metrics recorded when a transfer completes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompletedTransfer {
    pub arrival: DateTime<Utc>,
    pub turnaround_secs: f64,
    pub waiting_secs: f64,
}

/// Time-windowed log of completed-transfer metrics.
///
/// The window clears wholesale once it has been open longer than its
/// span (default 60 s); readers always see the current window only.
#[derive(Debug)]
pub struct StatsWindow {
    span: Duration,
    started_at: DateTime<Utc>,
    completed: Vec<CompletedTransfer>,
}

impl StatsWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            span: Duration::seconds(window_secs as i64),
            started_at: Utc::now(),
            completed: Vec::new(),
        }
    }

    /// Clear the window if it has outlived its span.
    pub fn roll(&mut self, now: DateTime<Utc>) {
        if now - self.started_at >= self.span {
            self.completed.clear();
            self.started_at = now;
        }
    }

    /// Record one completion. Turnaround is completion minus arrival;
    /// waiting subtracts the original burst estimate, clamped at zero
    /// since sub-second steps can outrun the estimate.
    pub fn record(
        &mut self,
        arrival: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        burst_original: u32,
    ) -> CompletedTransfer {
        let turnaround_secs = (completed_at - arrival).num_milliseconds() as f64 / 1000.0;
        let turnaround_secs = turnaround_secs.max(0.0);
        let waiting_secs = (turnaround_secs - f64::from(burst_original)).max(0.0);
        let entry = CompletedTransfer {
            arrival,
            turnaround_secs,
            waiting_secs,
        };
        self.completed.push(entry.clone());
        entry
    }

    pub fn snapshot(&self) -> Vec<CompletedTransfer> {
        self.completed.clone()
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_computes_nonnegative_metrics() {
        let mut window = StatsWindow::new(60);
        let arrival = Utc::now();
        let done = arrival + Duration::seconds(12);

        let entry = window.record(arrival, done, 3);
        assert_eq!(entry.turnaround_secs, 12.0);
        assert_eq!(entry.waiting_secs, 9.0);
    }

    #[test]
    fn test_waiting_clamped_at_zero() {
        let mut window = StatsWindow::new(60);
        let arrival = Utc::now();
        let done = arrival + Duration::milliseconds(500);

        let entry = window.record(arrival, done, 3);
        assert_eq!(entry.turnaround_secs, 0.5);
        assert_eq!(entry.waiting_secs, 0.0);
    }

    #[test]
    fn test_window_clears_after_span() {
        let mut window = StatsWindow::new(60);
        let arrival = Utc::now();
        window.record(arrival, arrival + Duration::seconds(5), 1);
        assert_eq!(window.len(), 1);

        window.roll(arrival + Duration::seconds(59));
        assert_eq!(window.len(), 1);

        window.roll(arrival + Duration::seconds(61));
        assert!(window.is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut window = StatsWindow::new(60);
        let arrival = Utc::now();
        window.record(arrival, arrival + Duration::seconds(2), 1);

        let snap = window.snapshot();
        window.roll(arrival + Duration::seconds(120));
        assert_eq!(snap.len(), 1);
        assert!(window.is_empty());
    }
}
