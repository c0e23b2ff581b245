//! Discrete Event Scheduler.
//!
//! Simulated time only advances here. Events are kept in a binary heap keyed
//! by `(tick, sequence)`: the tick orders events in time and the sequence
//! number, which increases monotonically with every insertion, keeps events
//! scheduled for the same tick in FIFO order.

use crate::common::Tick;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An event that has fired, together with the tick it fired at.
#[derive(Debug, PartialEq, Eq)]
pub struct Fired<E> {
    /// Tick at which the event fired.
    pub tick: Tick,
    /// The event payload.
    pub event: E,
}

struct Scheduled<E> {
    tick: Tick,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        (self.tick, self.seq) == (other.tick, other.seq)
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, the earliest event must pop first.
        (other.tick, other.seq).cmp(&(self.tick, self.seq))
    }
}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered queue of future events and the global simulated clock.
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    now: Tick,
    next_seq: u64,
}

impl<E> EventQueue<E> {
    /// Creates an empty queue with the clock at tick 0.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            now: 0,
            next_seq: 0,
        }
    }

    /// Returns the current simulated tick.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Schedules `event` to fire `cycles` ticks from now.
    ///
    /// A delay of zero fires the event later in the current tick, after every
    /// event already scheduled for it.
    pub fn schedule_after(&mut self, cycles: Tick, event: E) {
        let tick = self.now.saturating_add(cycles);
        self.push(tick, event);
    }

    /// Schedules `event` at an absolute tick, clamped to the current tick.
    pub fn schedule_at(&mut self, tick: Tick, event: E) {
        let tick = tick.max(self.now);
        self.push(tick, event);
    }

    fn push(&mut self, tick: Tick, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { tick, seq, event });
    }

    /// Returns the tick of the next pending event, if any.
    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|s| s.tick)
    }

    /// Removes the next event and advances the clock to its tick.
    pub fn pop(&mut self) -> Option<Fired<E>> {
        let next = self.heap.pop()?;
        self.now = next.tick;
        Some(Fired {
            tick: next.tick,
            event: next.event,
        })
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every pending event without touching the clock.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
