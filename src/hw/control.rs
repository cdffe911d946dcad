//! Stream lifecycle shared between control threads and the real-time thread.
//!
//! The real-time side only touches atomics: it raises `in_flight`, then
//! checks the status, and runs the period only when streaming. Control
//! calls store the new status first and then wait for `in_flight` to drop,
//! so once `suspend` or `close` returns no callback is running or will start.

use crate::error::{ErrorCode, PadError, Result};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

/// Serialises lifecycle changes. Recursive so group operations can call
/// into member streams while holding it.
pub type TransitionLock = Arc<ReentrantMutex<()>>;

pub fn transition_lock() -> TransitionLock {
    Arc::new(ReentrantMutex::new(()))
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Stopped = 0,
    Suspended = 1,
    Streaming = 2,
}

impl StreamStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Streaming,
            1 => Self::Suspended,
            _ => Self::Stopped,
        }
    }
}

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

const QUIESCE_POLL: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct StreamControl {
    status: AtomicU8,
    in_flight: AtomicBool,
    idle: Mutex<()>,
    idle_cv: Condvar,
    lock: TransitionLock,
}

impl StreamControl {
    pub fn new(initial: StreamStatus) -> Arc<Self> {
        Self::with_lock(initial, transition_lock())
    }

    pub fn with_lock(initial: StreamStatus, lock: TransitionLock) -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU8::new(initial as u8),
            in_flight: AtomicBool::new(false),
            idle: Mutex::new(()),
            idle_cv: Condvar::new(),
            lock,
        })
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn lock(&self) -> &TransitionLock {
        &self.lock
    }

    pub fn is_streaming(&self) -> bool {
        self.status() == StreamStatus::Streaming
    }

    /// Suspended -> Streaming. No-op when already streaming.
    pub fn resume(&self) -> Result<()> {
        let _guard = self.lock.lock();
        match self.status() {
            StreamStatus::Stopped => Err(PadError::soft(
                ErrorCode::InvalidState,
                "cannot resume a closed stream",
            )),
            _ => {
                self.status
                    .store(StreamStatus::Streaming as u8, Ordering::SeqCst);
                tracing::debug!("stream resumed");
                Ok(())
            }
        }
    }

    /// Streaming -> Suspended, returning once no callback is in flight.
    pub fn suspend(&self) -> Result<()> {
        let _guard = self.lock.lock();
        match self.status() {
            StreamStatus::Stopped => Err(PadError::soft(
                ErrorCode::InvalidState,
                "cannot suspend a closed stream",
            )),
            _ => {
                self.status
                    .store(StreamStatus::Suspended as u8, Ordering::SeqCst);
                self.quiesce();
                tracing::debug!("stream suspended");
                Ok(())
            }
        }
    }

    pub fn activate(&self, active: bool) -> Result<()> {
        if active { self.resume() } else { self.suspend() }
    }

    /// Any state -> Stopped. Idempotent.
    pub fn close(&self) {
        let _guard = self.lock.lock();
        let was = self.status.swap(StreamStatus::Stopped as u8, Ordering::SeqCst);
        self.quiesce();
        if was != StreamStatus::Stopped as u8 {
            tracing::debug!("stream closed");
        }
    }

    fn quiesce(&self) {
        // From inside the callback the in-flight period is our own; the new
        // status applies from the next period.
        if IN_CALLBACK.with(Cell::get) {
            return;
        }
        let mut idle = self.idle.lock();
        while self.in_flight.load(Ordering::SeqCst) {
            self.idle_cv.wait_for(&mut idle, QUIESCE_POLL);
        }
    }

    /// Real-time side: claim the period if the stream is streaming.
    pub(crate) fn enter(&self) -> Option<PeriodGuard<'_>> {
        self.in_flight.store(true, Ordering::SeqCst);
        if self.status() != StreamStatus::Streaming {
            self.leave();
            return None;
        }
        Some(PeriodGuard { control: self })
    }

    fn leave(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
        self.idle_cv.notify_all();
    }
}

pub(crate) struct PeriodGuard<'a> {
    control: &'a StreamControl,
}

impl PeriodGuard<'_> {
    /// Run `f` flagged as callback context for this thread.
    pub(crate) fn in_callback<R>(&self, f: impl FnOnce() -> R) -> R {
        let _flag = CallbackFlag::raise();
        f()
    }
}

/// Clears `IN_CALLBACK` on drop, so a panicking callback cannot leave it set.
struct CallbackFlag;

impl CallbackFlag {
    fn raise() -> Self {
        IN_CALLBACK.with(|c| c.set(true));
        Self
    }
}

impl Drop for CallbackFlag {
    fn drop(&mut self) {
        IN_CALLBACK.with(|c| c.set(false));
    }
}

impl Drop for PeriodGuard<'_> {
    fn drop(&mut self) {
        self.control.leave();
    }
}

/// Streams that change state together, e.g. every stream of a session.
#[derive(Debug)]
pub struct ControlGroup {
    lock: TransitionLock,
    members: Mutex<Vec<Arc<StreamControl>>>,
}

impl ControlGroup {
    pub fn new(lock: TransitionLock) -> Self {
        Self {
            lock,
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self) -> &TransitionLock {
        &self.lock
    }

    pub fn add(&self, control: Arc<StreamControl>) {
        let _guard = self.lock.lock();
        let mut members = self.members.lock();
        members.retain(|c| c.status() != StreamStatus::Stopped);
        members.push(control);
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn suspend_all(&self) -> Result<()> {
        self.for_each(|c| match c.status() {
            StreamStatus::Stopped => Ok(()),
            _ => c.suspend(),
        })
    }

    pub fn resume_all(&self) -> Result<()> {
        self.for_each(|c| match c.status() {
            StreamStatus::Stopped => Ok(()),
            _ => c.resume(),
        })
    }

    pub fn close_all(&self) {
        let _guard = self.lock.lock();
        let members = std::mem::take(&mut *self.members.lock());
        for control in &members {
            control.close();
        }
    }

    /// Visits every member even after a failure; returns the first error.
    fn for_each(&self, mut f: impl FnMut(&StreamControl) -> Result<()>) -> Result<()> {
        let _guard = self.lock.lock();
        let members: Vec<_> = self.members.lock().clone();
        let mut first_err = None;
        for control in &members {
            if let Err(err) = f(control) {
                tracing::warn!("group transition failed: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
