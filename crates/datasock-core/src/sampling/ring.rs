//! Single-producer single-consumer sample queue.
//!
//! A thin layer over [`heapless::spsc::Queue`]: [`SpscRing::split`] hands out
//! one [`Producer`] (interrupt side) and one [`Consumer`] (main loop side).
//! `N` slots hold `N - 1` values. When the ring is full the new value is
//! dropped and counted; values already queued are never touched.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::{self, Queue};

use super::{RING_SLOTS, Sample};

/// Result of [`Producer::try_push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Stored,
    /// Ring full; the new value was discarded
    Dropped,
}

pub struct SpscRing<T, const N: usize> {
    queue: Queue<T, N>,
    overruns: AtomicU32,
}

/// The sample queue between the sampler and the log store.
pub type SampleRing<const N: usize = RING_SLOTS> = SpscRing<Sample, N>;

impl<T, const N: usize> SpscRing<T, N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            overruns: AtomicU32::new(0),
        }
    }

    /// Number of values the ring holds when full.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Split into the producer and consumer halves.
    pub fn split(&mut self) -> (Producer<'_, T>, Consumer<'_, T>) {
        let (producer, consumer) = self.queue.split();
        let overruns = &self.overruns;
        (
            Producer {
                inner: producer,
                overruns,
            },
            Consumer {
                inner: consumer,
                overruns,
            },
        )
    }
}

impl<T, const N: usize> Default for SpscRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing half; lives in the sampling interrupt.
pub struct Producer<'a, T> {
    inner: spsc::Producer<'a, T>,
    overruns: &'a AtomicU32,
}

impl<T> Producer<'_, T> {
    /// Queue `value`, or drop it if the ring is full.
    pub fn try_push(&mut self, value: T) -> Push {
        match self.inner.enqueue(value) {
            Ok(()) => Push::Stored,
            Err(_) => {
                // Only the producer writes this counter.
                let count = self.overruns.load(Ordering::Relaxed);
                self.overruns.store(count.wrapping_add(1), Ordering::Relaxed);
                Push::Dropped
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Reading half; lives in the main loop.
pub struct Consumer<'a, T> {
    inner: spsc::Consumer<'a, T>,
    overruns: &'a AtomicU32,
}

impl<T> Consumer<'_, T> {
    /// Take the oldest queued value.
    pub fn try_pop(&mut self) -> Option<T> {
        self.inner.dequeue()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Pushes lost to a full ring since startup.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::vec::Vec;

    fn drain(consumer: &mut Consumer<'_, u32>) -> Vec<u32> {
        core::iter::from_fn(|| consumer.try_pop()).collect()
    }

    #[test]
    fn test_fifo_below_capacity() {
        let mut ring = SpscRing::<u32, 8>::new();
        let (mut producer, mut consumer) = ring.split();

        assert_eq!(consumer.try_pop(), None);
        for value in 0..5 {
            assert_eq!(producer.try_push(value), Push::Stored);
        }
        assert_eq!(consumer.len(), 5);
        assert_eq!(drain(&mut consumer), [0, 1, 2, 3, 4]);
        assert!(consumer.is_empty());
        assert_eq!(consumer.overruns(), 0);
    }

    #[test]
    fn test_wraps_around() {
        let mut ring = SpscRing::<u32, 4>::new();
        let (mut producer, mut consumer) = ring.split();

        for round in 0..10 {
            producer.try_push(round * 2);
            producer.try_push(round * 2 + 1);
            assert_eq!(drain(&mut consumer), [round * 2, round * 2 + 1]);
        }
    }

    #[test]
    fn test_full_ring_drops_newest_and_keeps_unread() {
        let mut ring = SpscRing::<u32, 4>::new();
        assert_eq!(ring.capacity(), 3);
        let (mut producer, mut consumer) = ring.split();

        for value in 1..=3 {
            assert_eq!(producer.try_push(value), Push::Stored);
        }
        assert_eq!(producer.try_push(4), Push::Dropped);
        assert_eq!(producer.try_push(5), Push::Dropped);

        assert_eq!(consumer.overruns(), 2);
        assert_eq!(drain(&mut consumer), [1, 2, 3]);

        // Room again after draining
        assert_eq!(producer.try_push(6), Push::Stored);
        assert_eq!(drain(&mut consumer), [6]);
        assert_eq!(consumer.overruns(), 2);
    }

    #[test]
    fn test_concurrent_transfer_is_ordered() {
        const COUNT: u32 = 10_000;
        let mut ring = SpscRing::<u32, 16>::new();
        let (mut producer, mut consumer) = ring.split();

        let received = std::thread::scope(|scope| {
            scope.spawn(move || {
                let mut value = 0;
                while value < COUNT {
                    if producer.try_push(value) == Push::Stored {
                        value += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            });

            let mut received = Vec::new();
            while received.len() < COUNT as usize {
                match consumer.try_pop() {
                    Some(value) => received.push(value),
                    None => std::thread::yield_now(),
                }
            }
            received
        });

        assert!(received.iter().copied().eq(0..COUNT));
    }
}
