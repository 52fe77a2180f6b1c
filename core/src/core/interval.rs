use std::collections::VecDeque;
use std::fmt;

use crate::Cycle;

/// A closed cycle range `[start, end]` carrying a value.
///
/// Two intervals overlap when their ranges intersect; endpoints are
/// inclusive, so touching intervals count as overlapping.
#[derive(Clone, Debug)]
pub struct Interval<T> {
    start: Cycle,
    end: Cycle,
    value: T,
}

impl<T> Interval<T> {
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: Cycle, end: Cycle, value: T) -> Self {
        assert!(start <= end, "invalid interval [{start},{end}]");
        Self { start, end, value }
    }

    pub fn start(&self) -> Cycle {
        self.start
    }

    pub fn end(&self) -> Cycle {
        self.end
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn overlaps(&self, other: &Interval<T>) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl<T> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

/// An ordered set of non-overlapping intervals, sorted by start cycle.
///
/// Functional units use one of these per pipeline: a reservation may be
/// placed only where it overlaps nothing already booked, and the unit
/// drains reservations in start order from the front.
#[derive(Debug, Default)]
pub struct DisjointIntervalSet<T> {
    intervals: VecDeque<Interval<T>>,
}

impl<T> DisjointIntervalSet<T> {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn front(&self) -> Option<&Interval<T>> {
        self.intervals.front()
    }

    pub fn pop_front(&mut self) -> Option<Interval<T>> {
        self.intervals.pop_front()
    }

    pub fn has_overlap(&self, interval: &Interval<T>) -> bool {
        self.has_overlap_range(interval.start, interval.end)
    }

    /// Overlap test against a bare `[start, end]` range, for probing a
    /// reservation before the instruction payload exists.
    pub fn has_overlap_range(&self, start: Cycle, end: Cycle) -> bool {
        // First interval that starts after `end` cannot overlap; only its
        // predecessor can reach into [start, end].
        let idx = self.intervals.partition_point(|iv| iv.start <= end);
        idx > 0 && self.intervals[idx - 1].end >= start
    }

    /// Inserts a reservation.
    ///
    /// # Panics
    ///
    /// Panics if the interval overlaps an existing reservation. Callers
    /// must probe with [`has_overlap`](Self::has_overlap) first; a failed
    /// insert is a scheduling bug, not a recoverable condition.
    pub fn insert(&mut self, interval: Interval<T>) {
        assert!(
            !self.has_overlap(&interval),
            "reservation {interval} overlaps an existing reservation",
        );
        let idx = self
            .intervals
            .partition_point(|iv| iv.start < interval.start);
        self.intervals.insert(idx, interval);
    }
}
