//! Blocking work queues
//!
//! Two queues drive every run:
//!
//! - [`BoundedHandoffQueue`]: fixed-capacity queue between the enumerator
//!   and the transfer workers. Producers block while it is full; consumers
//!   block while it is empty until the producer side calls
//!   [`BoundedHandoffQueue::mark_done`].
//! - [`DynamicWorkQueue`]: unbounded queue whose consumers are also its
//!   producers (a worker expanding a directory enqueues the children).
//!   Termination is detected with an in-flight counter rather than a
//!   "producer finished" flag.
//!
//! ```text
//!  add ──► [ items ] ──► poll ──► in_flight += 1
//!                                     │
//!             (may add more) ◄────────┤
//!                                     ▼
//!                               deregister ──► in_flight -= 1
//!                                                 │
//!                        in_flight == 0 && empty ─┴─► wake all, poll → None
//! ```
//!
//! Wakeups of waiting consumers are single-notify whenever one item becomes
//! available, and broadcast only on the terminal state.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default capacity of the job handoff queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000_000;

/// Counters for a queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Get queue throughput (dequeued items)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

enum Backing<T> {
    /// Largest item first
    Heap(BinaryHeap<T>),
    Fifo(VecDeque<T>),
}

impl<T: Ord> Backing<T> {
    fn push(&mut self, item: T) {
        match self {
            Backing::Heap(h) => h.push(item),
            Backing::Fifo(q) => q.push_back(item),
        }
    }

    fn pop(&mut self) -> Option<T> {
        match self {
            Backing::Heap(h) => h.pop(),
            Backing::Fifo(q) => q.pop_front(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Backing::Heap(h) => h.len(),
            Backing::Fifo(q) => q.len(),
        }
    }
}

struct HandoffState<T> {
    items: Backing<T>,
    done: bool,
}

/// Fixed-capacity blocking queue with explicit "no more input" signaling
pub struct BoundedHandoffQueue<T> {
    state: Mutex<HandoffState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    stats: QueueStats,
}

impl<T: Ord> BoundedHandoffQueue<T> {
    /// Create a queue; `largest_first` pops items in descending order
    pub fn new(capacity: usize, largest_first: bool) -> Self {
        let items = if largest_first {
            Backing::Heap(BinaryHeap::new())
        } else {
            Backing::Fifo(VecDeque::new())
        };
        Self {
            state: Mutex::new(HandoffState { items, done: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            stats: QueueStats::default(),
        }
    }

    /// Add an item, blocking while the queue is at capacity
    pub fn put(&self, item: T) {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity {
            self.not_full.wait(&mut state);
        }
        state.items.push(item);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    /// Take an item, blocking while empty and the producer is still running
    ///
    /// Returns `None` once the queue is empty and [`mark_done`](Self::mark_done)
    /// has been called.
    pub fn poll(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop() {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.done {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Signal that no more items will be added
    pub fn mark_done(&self) {
        let mut state = self.state.lock();
        state.done = true;
        self.not_empty.notify_all();
    }

    /// Check if the producer has finished
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

struct DynamicState<T> {
    items: VecDeque<T>,
    in_flight: usize,
}

/// Unbounded blocking queue with in-flight based termination detection
///
/// Every item returned by [`poll`](Self::poll) must be paired with exactly
/// one later [`deregister`](Self::deregister), including on error paths.
/// [`poll_guarded`](Self::poll_guarded) returns a [`WorkGuard`] that does
/// this on drop.
pub struct DynamicWorkQueue<T> {
    state: Mutex<DynamicState<T>>,
    available: Condvar,
    stats: QueueStats,
}

impl<T> DynamicWorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DynamicState {
                items: VecDeque::new(),
                in_flight: 0,
            }),
            available: Condvar::new(),
            stats: QueueStats::default(),
        }
    }

    /// Enqueue an item
    ///
    /// After the queue has started draining this may only be called by a
    /// holder of a live in-flight item.
    pub fn add(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push_back(item);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Take an item, blocking while the queue is empty and work is in flight
    ///
    /// Returns `None` once the queue is empty and nothing is in flight.
    pub fn poll(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                state.in_flight += 1;
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                return Some(item);
            }
            if state.in_flight == 0 {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`poll`](Self::poll), returning a guard that deregisters on drop
    pub fn poll_guarded(&self) -> Option<(T, WorkGuard<'_, T>)> {
        self.poll().map(|item| (item, WorkGuard { queue: self }))
    }

    /// Mark one polled item as finished
    pub fn deregister(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "deregister without matching poll");
        state.in_flight = state.in_flight.saturating_sub(1);
        if Self::terminal(&state) {
            self.available.notify_all();
        }
    }

    fn terminal(state: &MutexGuard<'_, DynamicState<T>>) -> bool {
        state.in_flight == 0 && state.items.is_empty()
    }

    /// Check if all work is complete
    pub fn is_done(&self) -> bool {
        Self::terminal(&self.state.lock())
    }

    /// Number of polled items not yet deregistered
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl<T> Default for DynamicWorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for an in-flight item of a [`DynamicWorkQueue`]
pub struct WorkGuard<'a, T> {
    queue: &'a DynamicWorkQueue<T>,
}

impl<'a, T> Drop for WorkGuard<'a, T> {
    fn drop(&mut self) {
        self.queue.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_handoff_largest_first() {
        let queue = BoundedHandoffQueue::new(10, true);
        for n in [3u64, 9, 1, 5] {
            queue.put(n);
        }
        queue.mark_done();

        let drained: Vec<u64> = std::iter::from_fn(|| queue.poll()).collect();
        assert_eq!(drained, vec![9, 5, 3, 1]);
        assert_eq!(queue.stats().throughput(), 4);
    }

    #[test]
    fn test_handoff_fifo() {
        let queue = BoundedHandoffQueue::new(10, false);
        for n in [3u64, 9, 1] {
            queue.put(n);
        }
        queue.mark_done();
        let drained: Vec<u64> = std::iter::from_fn(|| queue.poll()).collect();
        assert_eq!(drained, vec![3, 9, 1]);
    }

    #[test]
    fn test_handoff_put_blocks_at_capacity() {
        let queue = Arc::new(BoundedHandoffQueue::new(2, false));
        queue.put(1u32);
        queue.put(2u32);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.put(3u32);
                queue.mark_done();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_done());

        assert_eq!(queue.poll(), Some(1));
        producer.join().unwrap();
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(3));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn test_handoff_mark_done_wakes_all_consumers() {
        let queue = Arc::new(BoundedHandoffQueue::<u32>::new(4, true));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.poll())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.mark_done();
        for c in consumers {
            assert_eq!(c.join().unwrap(), None);
        }
    }

    #[test]
    fn test_dynamic_empty_is_terminal() {
        let queue = DynamicWorkQueue::<u32>::new();
        assert!(queue.is_done());
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn test_dynamic_poll_waits_for_in_flight() {
        let queue = Arc::new(DynamicWorkQueue::new());
        queue.add(1u32);
        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.in_flight(), 1);

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.poll())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        // Holder of the in-flight item produces more work
        queue.add(2);
        assert_eq!(waiter.join().unwrap(), Some(2));

        queue.deregister();
        assert!(!queue.is_done());
        queue.deregister();
        assert!(queue.is_done());
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn test_dynamic_guard_deregisters() {
        let queue = DynamicWorkQueue::new();
        queue.add("a");
        {
            let (item, _guard) = queue.poll_guarded().unwrap();
            assert_eq!(item, "a");
            assert_eq!(queue.in_flight(), 1);
        }
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.is_done());
    }

    #[test]
    fn test_dynamic_multithreaded_termination() {
        // Binary tree expansion: each item at depth d > 0 produces two children
        const DEPTH: u32 = 12;
        const THREADS: usize = 8;

        let queue = Arc::new(DynamicWorkQueue::new());
        let processed = Arc::new(AtomicUsize::new(0));
        queue.add(DEPTH);

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let processed = Arc::clone(&processed);
                thread::spawn(move || {
                    while let Some((depth, _guard)) = queue.poll_guarded() {
                        processed.fetch_add(1, Ordering::Relaxed);
                        if depth > 0 {
                            queue.add(depth - 1);
                            queue.add(depth - 1);
                        }
                    }
                    1usize
                })
            })
            .collect();

        let exits: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(exits, THREADS);
        assert_eq!(processed.load(Ordering::Relaxed), (1 << (DEPTH + 1)) - 1);
        assert!(queue.is_done());
        assert_eq!(
            queue.stats().enqueued.load(Ordering::Relaxed),
            queue.stats().dequeued.load(Ordering::Relaxed)
        );
    }
}
