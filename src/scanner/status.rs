//! Run status reporting.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Per-class counters accumulated over one run.
#[derive(Debug, Clone, Default)]
pub struct Counts {
    pub walked: u64,
    pub filtered: u64,
    pub processed: u64,
    pub imported: u64,
    pub missing: u64,
    pub dropped: u64,
}

/// Snapshot returned by [`crate::scanner::Scanner::status`].
#[derive(Debug, Clone, Default)]
pub struct StatusInfo {
    pub running: bool,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub counts: Counts,
    pub last_error: Option<String>,
}

impl StatusInfo {
    /// Duration of the last completed run, or of the run in progress if
    /// one is currently running (measured against now).
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.last_run_started_at?;
        let end = if self.running { Utc::now() } else { self.last_run_finished_at? };
        Some(end - started)
    }
}

/// Mutable status cell shared between the running scan and `Status()` callers.
#[derive(Default)]
pub struct StatusTracker(Mutex<StatusInfo>);

impl StatusTracker {
    pub fn snapshot(&self) -> StatusInfo {
        self.0.lock().unwrap().clone()
    }

    pub fn mark_started(&self) {
        let mut s = self.0.lock().unwrap();
        s.running = true;
        s.last_run_started_at = Some(Utc::now());
        s.counts = Counts::default();
        s.last_error = None;
    }

    pub fn mark_finished(&self, error: Option<String>) {
        let mut s = self.0.lock().unwrap();
        s.running = false;
        s.last_run_finished_at = Some(Utc::now());
        s.last_error = error;
    }

    pub fn record(&self, f: impl FnOnce(&mut Counts)) {
        let mut s = self.0.lock().unwrap();
        f(&mut s.counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_running_between_start_and_finish() {
        let t = StatusTracker::default();
        assert!(!t.snapshot().running);
        t.mark_started();
        assert!(t.snapshot().running);
        t.mark_finished(None);
        assert!(!t.snapshot().running);
    }

    #[test]
    fn duration_is_none_before_any_run() {
        assert!(StatusInfo::default().duration().is_none());
    }

    #[test]
    fn duration_is_some_once_a_run_has_finished() {
        let t = StatusTracker::default();
        t.mark_started();
        t.mark_finished(None);
        assert!(t.snapshot().duration().unwrap() >= chrono::Duration::zero());
    }

    #[test]
    fn record_accumulates_counts() {
        let t = StatusTracker::default();
        t.mark_started();
        t.record(|c| c.processed += 1);
        t.record(|c| c.imported += 3);
        let s = t.snapshot();
        assert_eq!(s.counts.processed, 1);
        assert_eq!(s.counts.imported, 3);
    }
}
