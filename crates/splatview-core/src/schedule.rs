//! Frame-driven scheduling
//!
//! Nothing in the engine owns a clock. The host passes the frame time in,
//! long-running work reports `Tick` per step, and deferred work sits in a
//! `Timers` queue that the frame drains.

/// Outcome of one step of a per-frame task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Pending<E> {
    id: TimerId,
    due_ms: f64,
    event: E,
}

/// Cancelable one-shot timers keyed by due time
#[derive(Debug, Clone)]
pub struct Timers<E> {
    next_id: u64,
    pending: Vec<Pending<E>>,
}

impl<E> Default for Timers<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }
}

impl<E> Timers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now_ms: f64, delay_ms: f64, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due_ms: now_ms + delay_ms.max(0.0),
            event,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Cancel every timer whose event matches. Returns how many were dropped.
    pub fn cancel_where(&mut self, mut matches: impl FnMut(&E) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| !matches(&p.event));
        before - self.pending.len()
    }

    /// Remove and return every event due at `now_ms`, earliest first.
    /// Timers due at the same instant fire in scheduling order.
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<E> {
        let (mut due, rest): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.due_ms <= now_ms);
        self.pending = rest;
        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.id.cmp(&b.id)));
        due.into_iter().map(|p| p.event).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
