//! Deadline table for everything the engine schedules.
//!
//! One slot per [`TimerKind`]: arming replaces, cancelling removes. The runtime
//! sleeps until [`TimerTable::next_deadline`] and then drains
//! [`TimerTable::pop_due`], so a timer cancelled while another one fires never
//! delivers a late tick.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    KeepAlive,
    ScanTimeout,
    Effect,
    MirrorSettle,
    DisconnectGrace,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TimerKind,
    deadline: Instant,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct TimerTable {
    entries: Vec<Entry>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_once(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        self.insert(Entry {
            kind,
            deadline: now + delay,
            period: None,
        });
    }

    /// First fire is one full period after `now`.
    pub fn arm_periodic(&mut self, kind: TimerKind, now: Instant, period: Duration) {
        self.insert(Entry {
            kind,
            deadline: now + period,
            period: Some(period.max(Duration::from_millis(1))),
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.kind != kind);
        before != self.entries.len()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn period(&self, kind: TimerKind) -> Option<Duration> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .and_then(|e| e.period)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Removes (one-shot) or reschedules (periodic) the earliest due timer.
    /// Ties resolve in [`TimerKind`] order.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKind> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline <= now)
            .min_by_key(|(_, e)| (e.deadline, e.kind))
            .map(|(i, _)| i)?;

        let entry = self.entries[idx];
        match entry.period {
            Some(period) => {
                let mut next = entry.deadline + period;
                // A stalled loop skips missed ticks instead of bursting them.
                if next <= now {
                    next = now + period;
                }
                self.entries[idx].deadline = next;
            }
            None => {
                self.entries.swap_remove(idx);
            }
        }
        Some(entry.kind)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn insert(&mut self, entry: Entry) {
        self.cancel(entry.kind);
        self.entries.push(entry);
    }
}
