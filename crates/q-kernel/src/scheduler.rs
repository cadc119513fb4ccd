// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Cooperative Bitmask Task Scheduler
//!
//! One bit per component. Posting a task sets its bit; the main loop calls
//! [`TaskScheduler::dispatch`], which runs exactly one pending task to
//! completion and reports whether more work remains.
//!
//! # Scheduling Algorithm
//!
//! 1. The search for the next pending bit starts just after the task that
//!    was dispatched last, wrapping around
//! 2. The selected bit is cleared before its handler runs, so a handler may
//!    re-post itself
//! 3. A task that re-posts itself goes to the back of the rotation: every
//!    other pending task runs once before it runs again
//!
//! # Interrupt Safety
//!
//! The pending mask and the cursor are atomics and every method takes
//! `&self`, so an interrupt handler holding a shared reference may call
//! [`TaskScheduler::post`] at any time. `fetch_or`/`fetch_and` make the
//! read-modify-write a single indivisible step; no critical section is
//! needed.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Maximum number of task identifiers (width of the pending mask)
pub const MAX_TASKS: usize = 32;

/// A component task identifier
pub trait TaskId: Copy + Eq {
    /// Number of distinct identifiers (at most [`MAX_TASKS`])
    const COUNT: usize;

    /// Bit position of this task
    fn index(self) -> usize;

    /// Identifier for a bit position
    fn from_index(index: usize) -> Option<Self>;
}

/// Round-robin bitmask scheduler
pub struct TaskScheduler<T: TaskId> {
    /// Pending task bits
    pending: AtomicU32,
    /// Bit position to start the next search from
    cursor: AtomicU8,
    _task: PhantomData<T>,
}

impl<T: TaskId> TaskScheduler<T> {
    /// Create a scheduler with nothing pending
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            cursor: AtomicU8::new(0),
            _task: PhantomData,
        }
    }

    fn bit(task: T) -> u32 {
        let index = task.index();
        debug_assert!(index < T::COUNT && index < MAX_TASKS);
        u32::try_from(index)
            .ok()
            .and_then(|i| 1u32.checked_shl(i))
            .unwrap_or(0)
    }

    /// Mark a task pending (idempotent, callable from interrupt context)
    pub fn post(&self, task: T) {
        self.pending.fetch_or(Self::bit(task), Ordering::AcqRel);
    }

    /// Withdraw a pending task
    pub fn cancel(&self, task: T) {
        self.pending.fetch_and(!Self::bit(task), Ordering::AcqRel);
    }

    /// Check whether a task is pending
    #[must_use]
    pub fn is_pending(&self, task: T) -> bool {
        self.pending.load(Ordering::Acquire) & Self::bit(task) != 0
    }

    /// Check whether any task is pending
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Raw pending mask
    #[must_use]
    pub fn pending_mask(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Select, clear and return the next pending task
    pub fn next_task(&self) -> Option<T> {
        let count = T::COUNT.min(MAX_TASKS);
        if count == 0 {
            return None;
        }
        let start = usize::from(self.cursor.load(Ordering::Acquire)) % count;

        for offset in 0..count {
            let index = (start + offset) % count;
            let mask = 1u32 << index;
            let previous = self.pending.fetch_and(!mask, Ordering::AcqRel);
            if previous & mask == 0 {
                continue;
            }
            let following = u8::try_from((index + 1) % count).unwrap_or(0);
            self.cursor.store(following, Ordering::Release);
            if let Some(task) = T::from_index(index) {
                return Some(task);
            }
        }
        None
    }

    /// Run at most one pending task
    ///
    /// Returns `true` if work remains, meaning the caller should dispatch
    /// again before sleeping.
    pub fn dispatch<F: FnOnce(T)>(&self, handler: F) -> bool {
        if let Some(task) = self.next_task() {
            handler(task);
        }
        self.has_pending()
    }

    /// Drop every pending task and rewind the cursor
    pub fn reset(&self) {
        self.pending.store(0, Ordering::Release);
        self.cursor.store(0, Ordering::Release);
    }
}

impl<T: TaskId> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TaskId> core::fmt::Debug for TaskScheduler<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("pending", &format_args!("{:#010b}", self.pending_mask()))
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}
