//! Blocking multi-producer/multi-consumer message queue.
//!
//! A [`BlockingQueue`] is a FIFO of [`Message`]s guarded by one mutex and two
//! condition variables. Senders park on `can_send` while the queue is full,
//! receivers park on `can_recv` while it is empty, and both re-check their
//! condition after every wakeup.
//!
//! # Credit extension
//!
//! A receiver on a bounded queue lends senders one extra unit of capacity for
//! as long as it is inside [`recv`](BlockingQueue::recv). That is what makes a
//! rendezvous queue (capacity 0) work: a send is admitted exactly while some
//! receiver is waiting for it. Each receiver takes its credit back before
//! returning, so with many concurrent receivers the queue may briefly hold
//! more messages than its nominal capacity. The registry's `max_credit`
//! setting bounds how many credits can be outstanding at once.
//!
//! # Example
//!
//! ```
//! use chan::{BlockingQueue, Capacity, Message, QueueName, Timeout};
//!
//! let queue = BlockingQueue::new(QueueName::new("jobs")?, Capacity::Bounded(2));
//! queue.send(Message::from("first"), Timeout::ZERO).unwrap();
//! queue.send(Message::from(2.0), Timeout::ZERO).unwrap();
//!
//! // Full: a non-blocking send hands the message back.
//! assert_eq!(queue.try_send(true), Err(Message::Boolean(true)));
//!
//! assert_eq!(queue.recv(Timeout::Infinite), Some(Message::from("first")));
//! assert_eq!(queue.len(), 1);
//! # Ok::<(), chan::ChanError>(())
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::message::Message;
use crate::registry::{Membership, QueueName};
use crate::sync::timeout::{Deadline, Timeout, Wait};
use crate::trace::{debug, trace};

/// How many messages a queue holds before senders block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Capacity {
    /// Sends never block.
    #[default]
    Unbounded,
    /// At most this many queued messages. `Bounded(0)` is a rendezvous
    /// queue: a send only completes while a receiver is waiting.
    Bounded(usize),
}

impl Capacity {
    /// Rendezvous capacity.
    pub const RENDEZVOUS: Self = Self::Bounded(0);

    /// Maps the integer limit convention used by host bindings: negative is
    /// unbounded, zero is rendezvous, positive is a bounded buffer.
    #[must_use]
    pub const fn from_limit(limit: i64) -> Self {
        if limit < 0 {
            Self::Unbounded
        } else {
            // Clamp on 32-bit targets; nobody buffers 2^32 messages.
            let limit = limit.unsigned_abs();
            if limit > usize::MAX as u64 {
                Self::Bounded(usize::MAX)
            } else {
                Self::Bounded(limit as usize)
            }
        }
    }

    /// Nominal limit, or `None` for unbounded queues.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(n),
        }
    }

    #[must_use]
    pub const fn is_rendezvous(self) -> bool {
        matches!(self, Self::Bounded(0))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Bounded(0) => f.write_str("rendezvous"),
            Self::Bounded(n) => write!(f, "bounded({n})"),
        }
    }
}

/// Mutable queue state. Only touched with the queue mutex held.
pub(crate) struct QueueState {
    messages: VecDeque<Message>,
    /// Receive credits currently lent to senders.
    credits: usize,
    /// Live handles. Starts at 1 for the creator.
    refs: usize,
    /// Registry slot, `None` once detached or if never registered.
    membership: Option<Membership>,
}

impl QueueState {
    fn admits(&self, capacity: Capacity) -> bool {
        match capacity {
            Capacity::Unbounded => true,
            Capacity::Bounded(limit) => self.messages.len() < limit.saturating_add(self.credits),
        }
    }

    pub(crate) fn set_membership(&mut self, membership: Membership) {
        debug_assert!(self.membership.is_none(), "queue registered twice");
        self.membership = Some(membership);
    }

    /// Drops one reference, returning the remaining count.
    ///
    /// # Panics
    ///
    /// Panics on refcount underflow: a handle was released more often than it
    /// was acquired.
    pub(crate) fn release(&mut self) -> usize {
        let Some(refs) = self.refs.checked_sub(1) else {
            panic!("chan refcount underflow: queue released more times than acquired");
        };
        self.refs = refs;
        refs
    }

    /// Clears the registry slot, returning it.
    ///
    /// # Panics
    ///
    /// Panics if the queue is not a registry member (double detach).
    pub(crate) fn take_membership(&mut self) -> Membership {
        let Some(membership) = self.membership.take() else {
            panic!("chan queue detached twice");
        };
        membership
    }

    /// Removes every queued message so it can be dropped outside the lock.
    pub(crate) fn drain(&mut self) -> VecDeque<Message> {
        std::mem::take(&mut self.messages)
    }
}

/// A named FIFO of [`Message`]s with blocking, timed send and receive.
///
/// All operations take `&self` and are safe to call from any number of
/// threads at once. Share a queue through the registry ([`crate::Chan`]) or
/// an `Arc`.
pub struct BlockingQueue {
    name: QueueName,
    capacity: Capacity,
    max_credit: Option<NonZeroUsize>,
    state: Mutex<QueueState>,
    can_send: Condvar,
    can_recv: Condvar,
}

impl BlockingQueue {
    /// Creates an empty queue holding one reference (the creator's).
    #[must_use]
    pub fn new(name: QueueName, capacity: Capacity) -> Self {
        Self::with_credit_cap(name, capacity, None)
    }

    /// Like [`new`](Self::new), but at most `max_credit` receive credits may
    /// be outstanding at once.
    #[must_use]
    pub fn with_credit_cap(
        name: QueueName,
        capacity: Capacity,
        max_credit: Option<NonZeroUsize>,
    ) -> Self {
        debug!(name = %name, %capacity, "queue created");
        Self {
            name,
            capacity,
            max_credit,
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                credits: 0,
                refs: 1,
                membership: None,
            }),
            can_send: Condvar::new(),
            can_recv: Condvar::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Number of queued messages.
    ///
    /// A snapshot: other threads may change it before the caller looks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().messages.is_empty()
    }

    /// Current reference count.
    #[must_use]
    pub fn refs(&self) -> usize {
        self.lock_state().refs
    }

    /// Appends `msg` at the tail, waiting up to `timeout` for room.
    ///
    /// On success one waiting receiver is woken.
    ///
    /// # Errors
    ///
    /// Returns the message unchanged if the queue stayed full for the whole
    /// timeout. With [`Timeout::ZERO`] that means it was full on entry.
    pub fn send(&self, msg: impl Into<Message>, timeout: Timeout) -> Result<(), Message> {
        let msg = msg.into();
        let deadline = Deadline::after(timeout);
        let state = self.lock_state();
        let (mut state, admitted) =
            Self::wait_while(&self.can_send, state, deadline, |s| !s.admits(self.capacity));
        if !admitted {
            trace!(name = %self.name, "send timed out");
            return Err(msg);
        }
        state.messages.push_back(msg);
        drop(state);
        self.can_recv.notify_one();
        Ok(())
    }

    /// Removes the head message, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` if the queue stayed empty for the whole timeout.
    pub fn recv(&self, timeout: Timeout) -> Option<Message> {
        let deadline = Deadline::after(timeout);
        let mut state = self.lock_state();
        let mut lent = false;

        loop {
            // Retried after each wakeup: under a credit cap a receiver may
            // have to wait for another one to hand its credit back.
            if !lent && self.lend_credit(&mut state) {
                lent = true;
                self.can_send.notify_one();
            }
            if !state.messages.is_empty() {
                break;
            }
            state = match deadline.remaining() {
                Wait::Expired => break,
                Wait::Forever => self
                    .can_recv
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Wait::For(remaining) => {
                    self.can_recv
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        let msg = state.messages.pop_front();
        let mut credit_freed = false;
        if lent {
            credit_freed = self
                .max_credit
                .is_some_and(|cap| state.credits == cap.get());
            state.credits -= 1;
        }
        drop(state);

        if msg.is_some() {
            self.can_send.notify_one();
        } else {
            trace!(name = %self.name, "recv timed out");
        }
        if credit_freed {
            // Receivers refused credit at the cap are parked here too.
            self.can_recv.notify_all();
        }
        msg
    }

    /// Non-blocking [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Returns the message if the queue is full right now.
    pub fn try_send(&self, msg: impl Into<Message>) -> Result<(), Message> {
        self.send(msg, Timeout::ZERO)
    }

    /// Non-blocking [`recv`](Self::recv).
    #[must_use]
    pub fn try_recv(&self) -> Option<Message> {
        self.recv(Timeout::ZERO)
    }

    /// Adds a reference, returning the new count.
    pub(crate) fn acquire(&self) -> usize {
        let mut state = self.lock_state();
        debug_assert!(state.refs > 0, "acquire on a destroyed queue");
        state.refs += 1;
        trace!(name = %self.name, refs = state.refs, "acquire");
        state.refs
    }

    /// Drops a reference if it is not the last one.
    ///
    /// Returns the remaining count, or `None` when the caller holds the last
    /// reference and must take the registry path instead.
    pub(crate) fn release_shared(&self) -> Option<usize> {
        let mut state = self.lock_state();
        if state.refs > 1 {
            state.refs -= 1;
            trace!(name = %self.name, refs = state.refs, "release");
            Some(state.refs)
        } else {
            None
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so a panic in
        // another thread never invalidates it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lend_credit(&self, state: &mut QueueState) -> bool {
        if self.capacity == Capacity::Unbounded {
            return false;
        }
        if self.max_credit.is_some_and(|cap| state.credits >= cap.get()) {
            return false;
        }
        state.credits += 1;
        true
    }

    /// Waits on `cond` while `blocked` holds, until `deadline`.
    ///
    /// Returns the guard and whether the condition cleared in time.
    fn wait_while<'a>(
        cond: &Condvar,
        mut state: MutexGuard<'a, QueueState>,
        deadline: Deadline,
        blocked: impl Fn(&QueueState) -> bool,
    ) -> (MutexGuard<'a, QueueState>, bool) {
        while blocked(&state) {
            state = match deadline.remaining() {
                Wait::Expired => return (state, false),
                Wait::Forever => cond.wait(state).unwrap_or_else(PoisonError::into_inner),
                Wait::For(remaining) => {
                    cond.wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        (state, true)
    }
}

impl fmt::Debug for BlockingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("BlockingQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &state.messages.len())
            .field("credits", &state.credits)
            .field("refs", &state.refs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn queue(capacity: Capacity) -> BlockingQueue {
        BlockingQueue::new(QueueName::new("test").unwrap(), capacity)
    }

    /// Polls until at least `n` receive credits are outstanding.
    fn wait_for_credits(q: &BlockingQueue, n: usize) {
        while q.lock_state().credits < n {
            thread::yield_now();
        }
    }

    #[test]
    fn test_capacity_from_limit() {
        assert_eq!(Capacity::from_limit(-1), Capacity::Unbounded);
        assert_eq!(Capacity::from_limit(i64::MIN), Capacity::Unbounded);
        assert_eq!(Capacity::from_limit(0), Capacity::RENDEZVOUS);
        assert_eq!(Capacity::from_limit(8), Capacity::Bounded(8));
        assert_eq!(Capacity::default(), Capacity::Unbounded);
        assert!(Capacity::Bounded(0).is_rendezvous());
        assert_eq!(Capacity::Bounded(3).limit(), Some(3));
        assert_eq!(Capacity::Unbounded.limit(), None);
    }

    #[test]
    fn test_capacity_display() {
        assert_eq!(Capacity::Unbounded.to_string(), "unbounded");
        assert_eq!(Capacity::RENDEZVOUS.to_string(), "rendezvous");
        assert_eq!(Capacity::Bounded(4).to_string(), "bounded(4)");
    }

    #[test]
    fn test_fifo_unbounded() {
        let q = queue(Capacity::Unbounded);
        for i in 0..100 {
            q.send(f64::from(i), Timeout::ZERO).unwrap();
        }
        assert_eq!(q.len(), 100);
        for i in 0..100 {
            assert_eq!(q.try_recv(), Some(Message::Number(f64::from(i))));
        }
        assert!(q.is_empty());
        assert_eq!(q.try_recv(), None);
    }

    #[test]
    fn test_bounded_full_then_drained() {
        let q = queue(Capacity::Bounded(1));
        assert_eq!(q.try_send("a"), Ok(()));
        assert_eq!(q.try_send("b"), Err(Message::from("b")));
        assert_eq!(q.try_recv(), Some(Message::from("a")));
        assert_eq!(q.try_send("c"), Ok(()));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_rendezvous_try_send_without_receiver_fails() {
        let q = queue(Capacity::RENDEZVOUS);
        assert_eq!(q.try_send(true), Err(Message::Boolean(true)));
        assert!(q.is_empty());
    }

    #[test]
    fn test_rendezvous_handoff() {
        let q = Arc::new(queue(Capacity::RENDEZVOUS));
        let receiver = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.recv(Timeout::Infinite))
        };
        q.send("hello", Timeout::Infinite).unwrap();
        assert_eq!(receiver.join().unwrap(), Some(Message::from("hello")));
        assert!(q.is_empty());
        assert_eq!(q.lock_state().credits, 0);
    }

    #[test]
    fn test_waiting_receiver_admits_try_send() {
        let q = Arc::new(queue(Capacity::RENDEZVOUS));
        let receiver = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.recv(Timeout::Infinite))
        };
        wait_for_credits(&q, 1);
        assert_eq!(q.try_send(7.0), Ok(()));
        assert_eq!(receiver.join().unwrap(), Some(Message::Number(7.0)));
    }

    #[test]
    fn test_blocked_sender_woken_by_recv() {
        let q = Arc::new(queue(Capacity::Bounded(1)));
        q.try_send("first").unwrap();
        let (tx, rx) = mpsc::channel();
        let sender = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let result = q.send("second", Timeout::Infinite);
                tx.send(()).unwrap();
                result
            })
        };
        assert_eq!(q.recv(Timeout::Infinite), Some(Message::from("first")));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sender.join().unwrap(), Ok(()));
        assert_eq!(q.try_recv(), Some(Message::from("second")));
    }

    #[test]
    fn test_recv_timeout_elapses() {
        let q = queue(Capacity::Unbounded);
        let start = std::time::Instant::now();
        assert_eq!(q.recv(Timeout::from_millis(100)), None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(95), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
    }

    #[test]
    fn test_send_timeout_returns_message() {
        let q = queue(Capacity::Bounded(0));
        let start = std::time::Instant::now();
        let result = q.send(Message::text(b"\0payload"), Timeout::from_millis(50));
        assert_eq!(result, Err(Message::text(b"\0payload")));
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_credit_revoked_after_timeout() {
        let q = queue(Capacity::RENDEZVOUS);
        assert_eq!(q.recv(Timeout::from_millis(10)), None);
        assert_eq!(q.lock_state().credits, 0);
        assert_eq!(q.try_send(1.0), Err(Message::Number(1.0)));
    }

    #[test]
    fn test_concurrent_receivers_stretch_capacity() {
        let q = Arc::new(queue(Capacity::RENDEZVOUS));
        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.recv(Timeout::Infinite))
            })
            .collect();
        wait_for_credits(&q, 3);
        for i in 0..3 {
            q.send(f64::from(i), Timeout::Infinite).unwrap();
        }
        let mut got: Vec<f64> = receivers
            .into_iter()
            .filter_map(|r| r.join().unwrap())
            .filter_map(|m| m.as_number())
            .collect();
        got.sort_by(f64::total_cmp);
        assert_eq!(got, vec![0.0, 1.0, 2.0]);
    }

    fn capped(cap: usize) -> BlockingQueue {
        BlockingQueue::with_credit_cap(
            QueueName::new("capped").unwrap(),
            Capacity::RENDEZVOUS,
            NonZeroUsize::new(cap),
        )
    }

    /// Lends credit as `receivers` waiting receivers would on entry to `recv`.
    fn lend_for(q: &BlockingQueue, receivers: usize) -> usize {
        let mut state = q.lock_state();
        (0..receivers)
            .filter(|_| q.lend_credit(&mut state))
            .count()
    }

    #[test]
    fn test_credit_cap_admits_one_send() {
        let q = capped(1);
        assert_eq!(lend_for(&q, 3), 1);
        assert_eq!(q.try_send(1.0), Ok(()));
        assert_eq!(q.try_send(2.0), Err(Message::Number(2.0)));
    }

    #[test]
    fn test_uncapped_admits_one_send_per_receiver() {
        let q = queue(Capacity::RENDEZVOUS);
        assert_eq!(lend_for(&q, 3), 3);
        let admitted: Vec<_> = (0..4).map(|i| q.try_send(f64::from(i)).is_ok()).collect();
        assert_eq!(admitted, [true, true, true, false]);
    }

    #[test]
    fn test_uncapped_parked_receivers_each_admit_a_send() {
        let q = Arc::new(queue(Capacity::RENDEZVOUS));
        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.recv(Timeout::Infinite))
            })
            .collect();
        wait_for_credits(&q, 3);

        // Each pop revokes its receiver's credit under the same lock, so
        // queued messages never exceed outstanding credit.
        let admitted: Vec<_> = (0..4).map(|i| q.try_send(f64::from(i)).is_ok()).collect();
        assert_eq!(admitted, [true, true, true, false]);
        for r in receivers {
            assert!(r.join().unwrap().is_some());
        }
        assert_eq!(q.lock_state().credits, 0);
    }

    #[test]
    fn test_credit_cap_holds_with_parked_receivers() {
        let q = Arc::new(capped(1));
        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.recv(Timeout::from_millis(5_000)))
            })
            .collect();
        wait_for_credits(&q, 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.lock_state().credits, 1);

        // Starved receivers pick up the credit as it is handed back.
        for i in 0..3 {
            q.send(f64::from(i), Timeout::Infinite).unwrap();
        }
        let got: Vec<_> = receivers.into_iter().map(|r| r.join().unwrap()).collect();
        assert!(got.iter().all(Option::is_some));
        assert_eq!(q.lock_state().credits, 0);
    }

    #[test]
    fn test_unbounded_never_lends_credit() {
        let q = Arc::new(queue(Capacity::Unbounded));
        assert_eq!(q.recv(Timeout::from_millis(5)), None);
        assert_eq!(q.lock_state().credits, 0);
    }

    #[test]
    fn test_many_producers_many_consumers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let q = Arc::new(queue(Capacity::Bounded(4)));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        #[allow(clippy::cast_precision_loss)]
                        let value = (p * PER_PRODUCER + i) as f64;
                        q.send(value, Timeout::Infinite).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut sum = 0.0;
                    for _ in 0..PER_PRODUCER {
                        sum += q.recv(Timeout::Infinite).and_then(|m| m.as_number()).unwrap();
                    }
                    sum
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let total: f64 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        let n = PRODUCERS * PER_PRODUCER;
        #[allow(clippy::cast_precision_loss)]
        let expected = (n * (n - 1) / 2) as f64;
        assert!((total - expected).abs() < f64::EPSILON);
        assert!(q.is_empty());
    }

    #[test]
    fn test_new_queue_has_one_ref() {
        let q = queue(Capacity::Unbounded);
        assert_eq!(q.refs(), 1);
        assert_eq!(q.acquire(), 2);
        assert_eq!(q.release_shared(), Some(1));
        assert_eq!(q.release_shared(), None);
        assert_eq!(q.lock_state().release(), 0);
    }

    #[test]
    #[should_panic(expected = "refcount underflow")]
    fn test_release_underflow_panics() {
        let q = queue(Capacity::Unbounded);
        let mut state = q.lock_state();
        state.release();
        state.release();
    }

    #[test]
    #[should_panic(expected = "detached twice")]
    fn test_unregistered_detach_panics() {
        let q = queue(Capacity::Unbounded);
        q.lock_state().take_membership();
    }
}
