//! Address-range breakpoint and watchpoint matching.
//!
//! A [`BreakpointSession`] holds one list of instruction breakpoints and two
//! watchpoint lists (memory read, memory write). Each trigger is an address
//! range plus a bound handler; `fire_*` invokes every handler whose range
//! contains the address.
//!
//! The session is owned by a machine instance and passed by cloneable handle
//! to any subsystem that registers triggers; there is no process-wide
//! breakpoint state. Handlers are permitted to add and remove triggers
//! (including themselves) while a dispatch is in progress: dispatch runs
//! over a snapshot taken before the first handler, a trigger removed
//! mid-dispatch is skipped rather than invoked, and a trigger added
//! mid-dispatch is not visited until the next firing pass.

use std::cell::RefCell;
use std::rc::Rc;

/// A bound breakpoint handler: callable with the machine context, all other
/// state already captured.
pub type Handler<C> = Rc<dyn Fn(&mut C)>;

struct Trigger<C> {
    id: u64,
    start: u16,
    end: u16,
    handler: Handler<C>,
}

#[derive(Clone, Copy)]
enum List {
    Exec,
    Read,
    Write,
}

struct Inner<C> {
    next_id: u64,
    exec: Vec<Trigger<C>>,
    read: Vec<Trigger<C>>,
    write: Vec<Trigger<C>>,
}

impl<C> Inner<C> {
    fn list(&self, which: List) -> &Vec<Trigger<C>> {
        match which {
            List::Exec => &self.exec,
            List::Read => &self.read,
            List::Write => &self.write,
        }
    }

    fn list_mut(&mut self, which: List) -> &mut Vec<Trigger<C>> {
        match which {
            List::Exec => &mut self.exec,
            List::Read => &mut self.read,
            List::Write => &mut self.write,
        }
    }
}

/// Per-machine breakpoint/watchpoint session, shared by handle.
pub struct BreakpointSession<C> {
    inner: Rc<RefCell<Inner<C>>>,
}

impl<C> Clone for BreakpointSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C> Default for BreakpointSession<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> BreakpointSession<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                exec: Vec::new(),
                read: Vec::new(),
                write: Vec::new(),
            })),
        }
    }

    fn add(&self, which: List, start: u16, end: u16, handler: Handler<C>) {
        let mut inner = self.inner.borrow_mut();
        // Idempotent: an identical (start, end, handler) triple is not
        // inserted twice.
        if inner
            .list(which)
            .iter()
            .any(|t| t.start == start && t.end == end && Rc::ptr_eq(&t.handler, &handler))
        {
            return;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.list_mut(which).push(Trigger {
            id,
            start,
            end,
            handler,
        });
    }

    fn remove(&self, which: List, start: u16, end: u16, handler: &Handler<C>) {
        let mut inner = self.inner.borrow_mut();
        inner
            .list_mut(which)
            .retain(|t| !(t.start == start && t.end == end && Rc::ptr_eq(&t.handler, handler)));
    }

    fn fire(&self, which: List, address: u16, ctx: &mut C) {
        // Snapshot the matching triggers before dispatch: handlers may
        // mutate the lists as a side effect.
        let snapshot: Vec<(u64, Handler<C>)> = self
            .inner
            .borrow()
            .list(which)
            .iter()
            .filter(|t| t.start <= address && address <= t.end)
            .map(|t| (t.id, Rc::clone(&t.handler)))
            .collect();
        for (id, handler) in snapshot {
            // A trigger removed since the snapshot (possibly by an earlier
            // handler in this pass) must not be invoked.
            let still_present = self
                .inner
                .borrow()
                .list(which)
                .iter()
                .any(|t| t.id == id);
            if still_present {
                handler(ctx);
            }
        }
    }

    /// Register an instruction breakpoint over `[start, end]` (inclusive).
    pub fn add_exec(&self, start: u16, end: u16, handler: Handler<C>) {
        self.add(List::Exec, start, end, handler);
    }

    /// Register a read watchpoint over `[start, end]` (inclusive).
    pub fn add_read(&self, start: u16, end: u16, handler: Handler<C>) {
        self.add(List::Read, start, end, handler);
    }

    /// Register a write watchpoint over `[start, end]` (inclusive).
    pub fn add_write(&self, start: u16, end: u16, handler: Handler<C>) {
        self.add(List::Write, start, end, handler);
    }

    /// Remove the instruction breakpoint matching the identical triple.
    pub fn remove_exec(&self, start: u16, end: u16, handler: &Handler<C>) {
        self.remove(List::Exec, start, end, handler);
    }

    /// Remove the read watchpoint matching the identical triple.
    pub fn remove_read(&self, start: u16, end: u16, handler: &Handler<C>) {
        self.remove(List::Read, start, end, handler);
    }

    /// Remove the write watchpoint matching the identical triple.
    pub fn remove_write(&self, start: u16, end: u16, handler: &Handler<C>) {
        self.remove(List::Write, start, end, handler);
    }

    /// Dispatch instruction breakpoints for a fetch at `address`.
    ///
    /// Fires once per call. Firmware may re-fetch the same address (spin
    /// loops); callers deduplicate by re-sampling the program counter and
    /// repeating dispatch only while it changes.
    pub fn fire_exec(&self, address: u16, ctx: &mut C) {
        self.fire(List::Exec, address, ctx);
    }

    /// Dispatch read watchpoints for an access at `address`.
    pub fn fire_read(&self, address: u16, ctx: &mut C) {
        self.fire(List::Read, address, ctx);
    }

    /// Dispatch write watchpoints for an access at `address`.
    pub fn fire_write(&self, address: u16, ctx: &mut C) {
        self.fire(List::Write, address, ctx);
    }

    /// Register a read watchpoint by start address and byte length, the
    /// form remote-debugging front ends use. A missing handler is a no-op
    /// with a logged warning; a zero length watches nothing.
    pub fn add_read_range(&self, start: u16, len: u16, handler: Option<Handler<C>>) {
        let Some(handler) = handler else {
            log::warn!("read watchpoint at {start:#06x} has no handler, ignored");
            return;
        };
        if len == 0 {
            log::warn!("read watchpoint at {start:#06x} has zero length, ignored");
            return;
        }
        self.add_read(start, start.saturating_add(len - 1), handler);
    }

    /// Register a write watchpoint by start address and byte length.
    /// Failure semantics match [`Self::add_read_range`].
    pub fn add_write_range(&self, start: u16, len: u16, handler: Option<Handler<C>>) {
        let Some(handler) = handler else {
            log::warn!("write watchpoint at {start:#06x} has no handler, ignored");
            return;
        };
        if len == 0 {
            log::warn!("write watchpoint at {start:#06x} has zero length, ignored");
            return;
        }
        self.add_write(start, start.saturating_add(len - 1), handler);
    }

    /// Number of registered instruction breakpoints.
    #[must_use]
    pub fn exec_count(&self) -> usize {
        self.inner.borrow().exec.len()
    }

    /// Number of registered watchpoints (read + write).
    #[must_use]
    pub fn watch_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.read.len() + inner.write.len()
    }
}
