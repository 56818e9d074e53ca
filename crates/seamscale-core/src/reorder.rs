// crates/seamscale-core/src/reorder.rs
//
// Sequence reordering buffer.
//
// Many producers (executor workers) add results tagged with their origin
// index in whatever order they finish; one consumer takes them out strictly in
// ascending index order, 0, 1, 2, … with no gaps and no repeats.
//
// State machine:
//   add(i, v): store v under i. After completion, v is dropped instead.
//   try_take_next(): Ready(v) if `next` is buffered, Finished once `next`
//                    reaches the declared total, otherwise NotReady.
//   complete_early(): force completion and drop everything still buffered.
//
// Memory bound:
//   Frames are large, so the map is capped at `capacity` entries. A producer
//   whose index is not `next` blocks while the map is full. The producer
//   holding `next` is always admitted, and executor dispatch is in index
//   order, so whoever holds `next` is either buffered already or still
//   running, so it can never be stuck behind a full buffer.
//
// Completion also wakes every blocked producer; their values are dropped.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Result of a non-blocking poll of the buffer head.
#[derive(Debug, PartialEq, Eq)]
pub enum Take<T> {
    Ready(T),
    /// `next` has not arrived yet. Poll again later.
    NotReady,
    /// Every index up to the declared total has been released, or the buffer
    /// was completed early.
    Finished,
}

struct State<T> {
    next:     usize,
    pending:  HashMap<usize, T>,
    total:    Option<usize>,
    complete: bool,
}

impl<T> State<T> {
    fn take(&mut self) -> Take<T> {
        if self.complete {
            return Take::Finished;
        }
        if let Some(v) = self.pending.remove(&self.next) {
            self.next += 1;
            return Take::Ready(v);
        }
        if self.total.is_some_and(|t| self.next >= t) {
            self.complete = true;
            return Take::Finished;
        }
        Take::NotReady
    }
}

pub struct ReorderBuffer<T> {
    state:    Mutex<State<T>>,
    /// Signalled when something was added or the buffer completed.
    ready:    Condvar,
    /// Signalled when the consumer freed a slot or the buffer completed.
    space:    Condvar,
    capacity: usize,
}

impl<T> ReorderBuffer<T> {
    /// Buffer with an unknown total; call `declare_total` once the producer
    /// knows how many items it emitted.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                next:     0,
                pending:  HashMap::new(),
                total:    None,
                complete: false,
            }),
            ready:    Condvar::new(),
            space:    Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn with_total(total: usize, capacity: usize) -> Self {
        let buf = Self::new(capacity);
        buf.declare_total(total);
        buf
    }

    pub fn declare_total(&self, total: usize) {
        self.state.lock().total = Some(total);
        self.ready.notify_all();
    }

    /// Store `value` under `index`. Returns false if the value was discarded
    /// because the buffer is complete or the index was already seen.
    ///
    /// May block while the buffer is at capacity (see module docs).
    pub fn add(&self, index: usize, value: T) -> bool {
        let mut st = self.state.lock();

        while !st.complete && index != st.next && st.pending.len() >= self.capacity {
            self.space.wait(&mut st);
        }

        if st.complete {
            debug!("reorder: dropping late arrival {index}");
            return false;
        }
        if index < st.next || st.pending.contains_key(&index) {
            warn!("reorder: duplicate index {index} ignored");
            return false;
        }

        st.pending.insert(index, value);
        drop(st);
        self.ready.notify_one();
        true
    }

    /// Non-blocking poll of the head of the sequence.
    pub fn try_take_next(&self) -> Take<T> {
        let mut st = self.state.lock();
        let taken  = st.take();
        drop(st);
        match taken {
            Take::Ready(_)  => { self.space.notify_all(); }
            Take::Finished  => { self.space.notify_all(); self.ready.notify_all(); }
            Take::NotReady  => {}
        }
        taken
    }

    /// Wait for the next item in order.
    ///
    /// `Ok(Some(v))` for the next item, `Ok(None)` once the sequence is
    /// finished, `Err(Cancelled)` if `cancel` fires first. Waits in slices of
    /// `poll` so cancellation is noticed promptly even if nothing arrives.
    pub fn wait_next(&self, poll: Duration, cancel: &CancelToken) -> Result<Option<T>> {
        let mut st = self.state.lock();
        loop {
            match st.take() {
                Take::Ready(v) => {
                    drop(st);
                    self.space.notify_all();
                    return Ok(Some(v));
                }
                Take::Finished => {
                    drop(st);
                    self.space.notify_all();
                    return Ok(None);
                }
                Take::NotReady => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    self.ready.wait_for(&mut st, poll);
                }
            }
        }
    }

    /// Iterate in order until finished. Yields `Err(Cancelled)` once and then
    /// stops if `cancel` fires.
    pub fn drain_ordered<'a>(&'a self, poll: Duration, cancel: &'a CancelToken) -> Ordered<'a, T> {
        Ordered { buf: self, poll, cancel, done: false }
    }

    /// Force completion, dropping everything still buffered. Returns how many
    /// buffered values were disposed.
    pub fn complete_early(&self) -> usize {
        let mut st = self.state.lock();
        st.complete = true;
        let disposed = st.pending.len();
        st.pending.clear();
        drop(st);
        self.ready.notify_all();
        self.space.notify_all();
        if disposed > 0 {
            debug!("reorder: completed early, disposed {disposed} buffered items");
        }
        disposed
    }

    pub fn next_index(&self) -> usize  { self.state.lock().next }
    pub fn pending_len(&self) -> usize { self.state.lock().pending.len() }
    pub fn is_complete(&self) -> bool  { self.state.lock().complete }
    pub fn capacity(&self) -> usize    { self.capacity }
}

pub struct Ordered<'a, T> {
    buf:    &'a ReorderBuffer<T>,
    poll:   Duration,
    cancel: &'a CancelToken,
    done:   bool,
}

impl<T> Iterator for Ordered<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.buf.wait_next(self.poll, self.cancel) {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None)    => { self.done = true; None }
            Err(e)      => { self.done = true; Some(Err(e)) }
        }
    }
}
