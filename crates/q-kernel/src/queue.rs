// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Index-linked queues
//!
//! Every pending request and record in the stack lives in a fixed slot
//! arena. Queues link slot indices rather than the records themselves, so a
//! record never moves while it waits and a slot index is a stable handle.
//!
//! - [`Queue`]: FIFO of slot indices with O(1) `put`/`delete_head`
//! - [`Pool`]: fixed arena of `Option<T>` slots
//! - [`RequestQueue`]: pool plus queue, the shape every service uses
//!
//! A slot is a member of at most one position in a queue at a time.
//! Inserting a slot that is already queued is rejected with
//! [`Error::AlreadyQueued`] and leaves the queue untouched.

use q_common::{Error, Result};

// ============================================================================
// Queue
// ============================================================================

/// FIFO queue of slot indices in `0..N`
#[derive(Debug, Clone)]
pub struct Queue<const N: usize> {
    /// Link to the following slot, valid only for members
    next: [Option<usize>; N],
    /// Membership flag per slot
    member: [bool; N],
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<const N: usize> Queue<N> {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: [None; N],
            member: [false; N],
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Remove every element
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Append a slot at the tail
    ///
    /// # Errors
    /// `InvalidParameter` if the index is out of range, `AlreadyQueued` if
    /// the slot is already a member.
    pub fn put(&mut self, idx: usize) -> Result<()> {
        if idx >= N {
            return Err(Error::InvalidParameter);
        }
        if self.member[idx] {
            return Err(Error::AlreadyQueued);
        }

        self.member[idx] = true;
        self.next[idx] = None;
        match self.tail {
            Some(tail) => self.next[tail] = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        Ok(())
    }

    /// Peek at the head
    #[must_use]
    pub const fn head(&self) -> Option<usize> {
        self.head
    }

    /// Remove and return the head
    pub fn delete_head(&mut self) -> Option<usize> {
        let idx = self.head?;
        self.head = self.next[idx];
        if self.head.is_none() {
            self.tail = None;
        }
        self.member[idx] = false;
        self.next[idx] = None;
        self.len -= 1;
        Some(idx)
    }

    /// Unlink an arbitrary member, preserving the order of the rest
    ///
    /// # Errors
    /// `NotQueued` if the slot is not a member.
    pub fn delete(&mut self, idx: usize) -> Result<()> {
        if !self.is_member(idx) {
            return Err(Error::NotQueued);
        }

        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if current == idx {
                let after = self.next[current];
                match prev {
                    Some(p) => self.next[p] = after,
                    None => self.head = after,
                }
                if self.tail == Some(current) {
                    self.tail = prev;
                }
                self.member[current] = false;
                self.next[current] = None;
                self.len -= 1;
                return Ok(());
            }
            prev = Some(current);
            cursor = self.next[current];
        }

        // Membership flag and links disagree
        Err(Error::InternalError)
    }

    /// Check whether a slot is queued
    #[must_use]
    pub fn is_member(&self, idx: usize) -> bool {
        idx < N && self.member[idx]
    }

    /// Number of queued slots
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check for an empty queue
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over the queued slots from head to tail
    pub fn iter(&self) -> QueueIter<'_, N> {
        QueueIter {
            queue: self,
            cursor: self.head,
        }
    }
}

impl<const N: usize> Default for Queue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over a [`Queue`]
pub struct QueueIter<'a, const N: usize> {
    queue: &'a Queue<N>,
    cursor: Option<usize>,
}

impl<const N: usize> Iterator for QueueIter<'_, N> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        self.cursor = self.queue.next[idx];
        Some(idx)
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Fixed arena of optional slots
#[derive(Debug, Clone)]
pub struct Pool<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> Pool<T, N> {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Store a value in the first free slot
    ///
    /// # Errors
    /// `PoolExhausted` if every slot is busy; the value is dropped.
    pub fn alloc(&mut self, value: T) -> Result<usize> {
        let idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::PoolExhausted)?;
        self.slots[idx] = Some(value);
        Ok(idx)
    }

    /// Release a slot, returning its value
    pub fn free(&mut self, idx: usize) -> Option<T> {
        self.slots.get_mut(idx).and_then(Option::take)
    }

    /// Borrow a busy slot
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Mutably borrow a busy slot
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Number of busy slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check for an empty pool
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Check whether every slot is busy
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Iterate over busy slots as `(index, value)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    /// Mutably iterate over busy slots as `(index, value)`
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (i, v)))
    }

    /// Release every slot
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Request Queue
// ============================================================================

/// Serialized request queue
///
/// Requests are processed strictly one at a time: only the head is active,
/// later submissions wait until the active one is completed.
#[derive(Debug, Clone)]
pub struct RequestQueue<T, const N: usize> {
    pool: Pool<T, N>,
    order: Queue<N>,
}

impl<T, const N: usize> RequestQueue<T, N> {
    /// Create an empty request queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: Pool::new(),
            order: Queue::new(),
        }
    }

    /// Queue a request behind any pending ones
    ///
    /// Returns `true` if the request became active immediately.
    ///
    /// # Errors
    /// `PoolExhausted` if the queue is full.
    pub fn submit(&mut self, request: T) -> Result<bool> {
        let idx = self.pool.alloc(request)?;
        if let Err(e) = self.order.put(idx) {
            self.pool.free(idx);
            return Err(e);
        }
        Ok(self.order.head() == Some(idx))
    }

    /// The active (head) request
    #[must_use]
    pub fn active(&self) -> Option<&T> {
        self.order.head().and_then(|idx| self.pool.get(idx))
    }

    /// The active (head) request, mutably
    pub fn active_mut(&mut self) -> Option<&mut T> {
        let idx = self.order.head()?;
        self.pool.get_mut(idx)
    }

    /// Finish the active request and release its slot
    pub fn complete(&mut self) -> Option<T> {
        let idx = self.order.delete_head()?;
        self.pool.free(idx)
    }

    /// Withdraw the first request matching `pred` (active or waiting)
    pub fn remove_where<F: FnMut(&T) -> bool>(&mut self, mut pred: F) -> Option<T> {
        let idx = self
            .order
            .iter()
            .find(|&idx| self.pool.get(idx).is_some_and(&mut pred))?;
        self.order.delete(idx).ok()?;
        self.pool.free(idx)
    }

    /// No request is queued
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of queued requests, including the active one
    #[must_use]
    pub const fn len(&self) -> usize {
        self.order.len()
    }

    /// Check for an empty queue
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over requests in service order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|idx| self.pool.get(idx))
    }
}

impl<T, const N: usize> Default for RequestQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q: Queue<8> = Queue::new();
        for idx in [3, 1, 7, 0] {
            q.put(idx).unwrap();
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.delete_head(), Some(3));
        assert_eq!(q.delete_head(), Some(1));
        assert_eq!(q.delete_head(), Some(7));
        assert_eq!(q.delete_head(), Some(0));
        assert_eq!(q.delete_head(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_double_put_rejected() {
        let mut q: Queue<4> = Queue::new();
        q.put(1).unwrap();
        q.put(2).unwrap();
        assert_eq!(q.put(1), Err(Error::AlreadyQueued));
        assert_eq!(q.iter().collect::<heapless::Vec<_, 4>>().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_delete_middle_and_tail() {
        let mut q: Queue<6> = Queue::new();
        for idx in 0..5 {
            q.put(idx).unwrap();
        }
        q.delete(2).unwrap();
        q.delete(4).unwrap();
        assert_eq!(q.delete(4), Err(Error::NotQueued));
        // Tail must be fixed up after deleting the old tail
        q.put(5).unwrap();
        assert_eq!(q.iter().collect::<heapless::Vec<_, 6>>().as_slice(), &[0, 1, 3, 5]);
    }

    #[test]
    fn test_delete_head_via_delete() {
        let mut q: Queue<3> = Queue::new();
        q.put(0).unwrap();
        q.put(1).unwrap();
        q.delete(0).unwrap();
        assert_eq!(q.head(), Some(1));
        q.delete(1).unwrap();
        assert_eq!(q.head(), None);
        q.put(2).unwrap();
        assert_eq!(q.head(), Some(2));
    }

    #[test]
    fn test_out_of_range() {
        let mut q: Queue<2> = Queue::new();
        assert_eq!(q.put(2), Err(Error::InvalidParameter));
        assert!(!q.is_member(5));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool: Pool<u32, 2> = Pool::new();
        let a = pool.alloc(10).unwrap();
        let _b = pool.alloc(20).unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.alloc(30), Err(Error::PoolExhausted));
        assert_eq!(pool.free(a), Some(10));
        assert_eq!(pool.alloc(40), Ok(a));
    }

    #[test]
    fn test_request_queue_serializes() {
        let mut rq: RequestQueue<&str, 3> = RequestQueue::new();
        assert_eq!(rq.submit("first"), Ok(true));
        assert_eq!(rq.submit("second"), Ok(false));
        assert_eq!(rq.active(), Some(&"first"));
        assert_eq!(rq.complete(), Some("first"));
        assert_eq!(rq.active(), Some(&"second"));
        assert_eq!(rq.complete(), Some("second"));
        assert!(rq.is_idle());
    }

    #[test]
    fn test_request_queue_remove_waiting() {
        let mut rq: RequestQueue<u8, 4> = RequestQueue::new();
        for v in [1, 2, 3] {
            rq.submit(v).unwrap();
        }
        assert_eq!(rq.remove_where(|&v| v == 2), Some(2));
        assert_eq!(rq.iter().copied().collect::<heapless::Vec<_, 4>>().as_slice(), &[1, 3]);
    }
}
