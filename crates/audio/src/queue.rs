//! Wait-free single-producer single-consumer queue.
//!
//! Carries the chunk descriptors (callback -> worker) and censor events
//! (worker -> callback). Payloads are `Copy`, capacity is a power of two,
//! and the head/tail counters live on separate cache lines so the two
//! threads never false-share.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

struct SpscQueue<T> {
    /// Consumer index; free-running, masked on access.
    head: CachePadded<AtomicUsize>,
    /// Producer index; free-running, masked on access.
    tail: CachePadded<AtomicUsize>,
    mask: usize,
    capacity: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: one producer touches `tail` and the slots it publishes with a
// release store; one consumer touches `head` and only reads slots behind an
// acquire-loaded `tail`. The Producer/Consumer wrappers below enforce the
// one-of-each split by construction.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

/// Create a queue with at least `capacity` usable slots (rounded up to a
/// power of two) and hand out its two ends.
pub fn spsc_channel<T: Copy>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let capacity = capacity.max(2).next_power_of_two();
    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let queue = Arc::new(SpscQueue {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
        capacity,
        slots,
    });

    (
        Producer {
            queue: Arc::clone(&queue),
        },
        Consumer { queue },
    )
}

/// Producing end. Not cloneable; exactly one thread may own it.
pub struct Producer<T> {
    queue: Arc<SpscQueue<T>>,
}

impl<T: Copy> Producer<T> {
    /// Push an item. Returns `false` when the queue is full; the item is
    /// simply dropped (the caller records and moves on, it never blocks).
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        let q = &*self.queue;
        let tail = q.tail.load(Ordering::Relaxed);
        let head = q.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) >= q.capacity {
            return false;
        }

        // SAFETY: slot `tail & mask` is unreachable by the consumer until
        // the release store below.
        unsafe { (*q.slots[tail & q.mask].get()).write(item) };
        q.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Free slots remaining, as seen by the producer.
    pub fn slots(&self) -> usize {
        let q = &*self.queue;
        let tail = q.tail.load(Ordering::Relaxed);
        let head = q.head.load(Ordering::Acquire);
        q.capacity - tail.wrapping_sub(head)
    }
}

/// Consuming end. Not cloneable; exactly one thread may own it.
pub struct Consumer<T> {
    queue: Arc<SpscQueue<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Pop the oldest item, or `None` when empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let q = &*self.queue;
        let head = q.head.load(Ordering::Relaxed);
        let tail = q.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: head < tail, so this slot was published by the producer's
        // release store; T: Copy, so reading it out leaves nothing to drop.
        let item = unsafe { (*q.slots[head & q.mask].get()).assume_init() };
        q.head.store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    pub fn len(&self) -> usize {
        let q = &*self.queue;
        let head = q.head.load(Ordering::Relaxed);
        let tail = q.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = spsc_channel::<u32>(8);

        for i in 0..5 {
            assert!(tx.push(i));
        }
        for i in 0..5 {
            assert_eq!(rx.pop(), Some(i));
        }
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn test_full_queue_rejects_push() {
        let (mut tx, mut rx) = spsc_channel::<u32>(64);

        let mut dropped = 0;
        for i in 0..70 {
            if !tx.push(i) {
                dropped += 1;
            }
        }

        // Exactly capacity entries fit; the rest were refused.
        assert_eq!(dropped, 70 - 64);
        assert_eq!(rx.len(), 64);

        // Draining frees slots again.
        assert_eq!(rx.pop(), Some(0));
        assert!(tx.push(99));
    }

    #[test]
    fn test_capacity_rounds_up() {
        let (tx, _rx) = spsc_channel::<u8>(48);
        assert_eq!(tx.slots(), 64);
    }

    #[test]
    fn test_wrapping_reuse() {
        let (mut tx, mut rx) = spsc_channel::<u64>(4);

        for round in 0..100u64 {
            assert!(tx.push(round));
            assert_eq!(rx.pop(), Some(round));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_cross_thread_ordering() {
        let (mut tx, mut rx) = spsc_channel::<u64>(16);

        let producer = std::thread::spawn(move || {
            let mut sent = 0u64;
            while sent < 10_000 {
                if tx.push(sent) {
                    sent += 1;
                }
            }
        });

        let mut expected = 0u64;
        while expected < 10_000 {
            if let Some(value) = rx.pop() {
                assert_eq!(value, expected);
                expected += 1;
            }
        }

        producer.join().unwrap();
    }
}
