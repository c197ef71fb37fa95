//! Virtual clock and pending-work queue.
//!
//! Work fires in order of absolute fire time; work scheduled for the same
//! instant fires in the order it was scheduled.

use faas_common::SimTime;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

#[derive(Debug)]
struct Scheduled<A> {
    fire_at: SimTime,
    seq: u64,
    action: A,
}

impl<A> PartialEq for Scheduled<A> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<A> Eq for Scheduled<A> {}

impl<A> PartialOrd for Scheduled<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Scheduled<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug)]
pub struct Scheduler<A> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Scheduled<A>>>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queue `action` to fire `delay` from now. Returns the absolute fire time.
    pub fn schedule(&mut self, delay: Duration, action: A) -> SimTime {
        let fire_at = self.now.saturating_add(delay);
        self.schedule_at(fire_at, action)
    }

    /// Queue `action` at an absolute time; times in the past fire at `now`.
    pub fn schedule_at(&mut self, fire_at: SimTime, action: A) -> SimTime {
        let fire_at = fire_at.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled {
            fire_at,
            seq,
            action,
        }));
        fire_at
    }

    pub fn next_fire_at(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(s)| s.fire_at)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pop the earliest action due at or before `until`, moving the clock to its fire time.
    pub fn pop_due(&mut self, until: SimTime) -> Option<(SimTime, A)> {
        match self.queue.peek() {
            Some(Reverse(next)) if next.fire_at <= until => {}
            _ => return None,
        }
        let Reverse(next) = self.queue.pop()?;
        self.now = self.now.max(next.fire_at);
        Some((next.fire_at, next.action))
    }

    /// Move the clock forward. The clock never moves backwards.
    pub fn advance_clock(&mut self, to: SimTime) {
        self.now = self.now.max(to);
    }
}
