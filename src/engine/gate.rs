//! Flush gate
//!
//! Single-flight guard for physical flushes plus the "flush requested" flag
//! that lets late writers hand their flush to whoever is already flushing.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// At most one holder of a [`FlushTicket`] at a time
pub(crate) struct FlushGate {
    in_progress: AtomicBool,
    requested: AtomicBool,

    /// Blocking waiters park here; released under `idle_lock` so a wakeup
    /// can't slip between a failed enter and the wait
    idle_lock: Mutex<()>,
    idle: Condvar,

    /// Async waiters
    idle_async: Notify,
}

/// Proof of holding the gate. Dropping it reopens the gate.
pub(crate) struct FlushTicket<'a> {
    gate: &'a FlushGate,
}

impl FlushGate {
    pub(crate) fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            requested: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            idle_async: Notify::new(),
        }
    }

    /// Ask for a flush. Whoever holds (or next takes) the gate will run it.
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request
    pub(crate) fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn has_request(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Take the gate if nobody holds it
    pub(crate) fn try_enter(&self) -> Option<FlushTicket<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlushTicket { gate: self })
    }

    /// Take the gate, blocking the thread until it is free
    pub(crate) fn enter_blocking(&self) -> FlushTicket<'_> {
        let mut guard = self.idle_lock.lock();
        loop {
            if let Some(ticket) = self.try_enter() {
                return ticket;
            }
            self.idle.wait(&mut guard);
        }
    }

    /// Take the gate, yielding until it is free
    pub(crate) async fn enter_async(&self) -> FlushTicket<'_> {
        loop {
            let notified = self.idle_async.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ticket) = self.try_enter() {
                return ticket;
            }
            notified.await;
        }
    }
}

impl Drop for FlushTicket<'_> {
    fn drop(&mut self) {
        {
            let _guard = self.gate.idle_lock.lock();
            self.gate.in_progress.store(false, Ordering::SeqCst);
            self.gate.idle.notify_all();
        }
        self.gate.idle_async.notify_waiters();
    }
}
