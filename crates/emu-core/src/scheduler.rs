//! Virtual-time event queue.
//!
//! Single-threaded, tick-driven scheduling: components register a callback
//! for a future tick and the machine drains due events as the master clock
//! advances. Callbacks receive a mutable reference to a caller-supplied
//! context (normally the machine state), and may schedule or cancel further
//! events from inside the callback. They must not call `advance_to`
//! themselves.
//!
//! The queue is a cheaply cloneable handle; every clone refers to the same
//! underlying queue. Cancellation is exact: once `cancel` returns, the
//! callback will not run.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Ticks;

/// Stable handle to a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

type Callback<C> = Rc<dyn Fn(&mut C)>;

struct Event<C> {
    id: u64,
    due: Ticks,
    callback: Callback<C>,
}

struct Inner<C> {
    now: Ticks,
    next_id: u64,
    /// Sorted by `(due, id)` ascending; the front is the next event.
    events: Vec<Event<C>>,
}

/// A virtual-time event queue, shared by handle.
pub struct EventQueue<C> {
    inner: Rc<RefCell<Inner<C>>>,
}

impl<C> Clone for EventQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C> Default for EventQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventQueue<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                now: Ticks::ZERO,
                next_id: 0,
                events: Vec::new(),
            })),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Ticks {
        self.inner.borrow().now
    }

    /// Schedule `callback` to run at absolute tick `due`.
    ///
    /// An event due at or before the current tick runs on the next advance.
    pub fn schedule_at(&self, due: Ticks, callback: Callback<C>) -> EventId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let event = Event { id, due, callback };
        let pos = inner
            .events
            .partition_point(|e| (e.due, e.id) <= (due, id));
        inner.events.insert(pos, event);
        EventId(id)
    }

    /// Schedule `callback` to run `delay` ticks from now.
    pub fn schedule_after(&self, delay: Ticks, callback: Callback<C>) -> EventId {
        let due = self.now() + delay;
        self.schedule_at(due, callback)
    }

    /// Remove a scheduled event. Returns whether it was still pending.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.events.len();
        inner.events.retain(|e| e.id != id.0);
        inner.events.len() != before
    }

    /// Whether the event is still pending.
    #[must_use]
    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.inner.borrow().events.iter().any(|e| e.id == id.0)
    }

    /// Number of pending events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().events.len()
    }

    /// Advance virtual time to `target`, running every event due on the way
    /// in due-tick order. Events scheduled by callbacks for ticks at or
    /// before `target` run in the same pass.
    pub fn advance_to(&self, target: Ticks, ctx: &mut C) {
        loop {
            // Take the next due event under a short borrow, then dispatch
            // with the borrow released so the callback can use the queue.
            let next = {
                let mut inner = self.inner.borrow_mut();
                if inner.events.first().is_some_and(|e| e.due <= target) {
                    let event = inner.events.remove(0);
                    inner.now = event.due.max(inner.now);
                    Some(event.callback)
                } else {
                    None
                }
            };
            match next {
                Some(callback) => callback(ctx),
                None => break,
            }
        }
        let mut inner = self.inner.borrow_mut();
        inner.now = inner.now.max(target);
    }

    /// Advance virtual time by `delta` ticks.
    pub fn advance(&self, delta: Ticks, ctx: &mut C) {
        let target = self.now() + delta;
        self.advance_to(target, ctx);
    }
}
