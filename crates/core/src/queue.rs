//! Bounded hand-off of access units to a decoding consumer.
//!
//! The streaming loop is the single producer; a decoder thread is the single
//! consumer. When the consumer falls behind and the queue fills up, the whole
//! backlog is dropped rather than just the oldest entry, so latency never
//! accumulates beyond one queue's worth of frames.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

/// How long [`FrameQueue::push`] waits for room before dropping the frame.
pub const PUSH_TIMEOUT: Duration = Duration::from_millis(5);

/// Default time [`FrameQueue::pop`] waits for a frame.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity used for both the video and the audio queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 120;

/// One reassembled access unit.
///
/// Video frames are Annex-B NAL units (each prefixed with `00 00 00 01`),
/// audio frames are raw AAC access units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Bytes,
    /// Presentation time in microseconds, derived from the RTP timestamp and
    /// the track clock rate. Wraps with the 32-bit RTP clock.
    pub timestamp_us: u64,
    /// Set for IDR/IRAP slices and for parameter-set units that precede them.
    pub keyframe: bool,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, timestamp_us: u64, keyframe: bool) -> Self {
        Self {
            data: data.into(),
            timestamp_us,
            keyframe,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

struct State {
    frames: VecDeque<Frame>,
    /// Bumped by [`FrameQueue::interrupt`] to release blocked consumers.
    interrupts: u64,
}

/// Bounded FIFO of [`Frame`]s shared between the session thread and a decoder.
pub struct FrameQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    pop_timeout: Duration,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_pop_timeout(capacity, DEFAULT_POP_TIMEOUT)
    }

    pub fn with_pop_timeout(capacity: usize, pop_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                frames: VecDeque::with_capacity(capacity.max(1)),
                interrupts: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            pop_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Enqueue a frame.
    ///
    /// A full queue is cleared before insertion. Returns `false` when the
    /// frame could not be inserted within [`PUSH_TIMEOUT`] and was dropped.
    pub fn push(&self, frame: Frame) -> bool {
        let mut state = self.state.lock();

        if state.frames.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "frame queue full, clearing it");
            state.frames.clear();
        }

        let deadline = Instant::now() + PUSH_TIMEOUT;
        while state.frames.len() >= self.capacity {
            if self.not_full.wait_until(&mut state, deadline).timed_out()
                && state.frames.len() >= self.capacity
            {
                tracing::warn!("cannot add frame, queue is full");
                return false;
            }
        }

        state.frames.push_back(frame);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue the oldest frame, waiting up to the queue's pop timeout.
    pub fn pop(&self) -> Option<Frame> {
        self.pop_timeout(self.pop_timeout)
    }

    /// Dequeue the oldest frame, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or when [`interrupt`](Self::interrupt) is
    /// called while waiting.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let generation = state.interrupts;

        loop {
            if let Some(frame) = state.frames.pop_front() {
                self.not_full.notify_one();
                return Some(frame);
            }
            if state.interrupts != generation {
                tracing::debug!("frame queue pop interrupted");
                return None;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let frame = state.frames.pop_front();
                if frame.is_none() {
                    tracing::trace!(?timeout, "cannot get frame, queue is empty");
                }
                return frame;
            }
        }
    }

    /// Discard all queued frames.
    pub fn clear(&self) {
        self.state.lock().frames.clear();
        self.not_full.notify_all();
    }

    /// Wake every consumer blocked in [`pop`](Self::pop); they return `None`.
    pub fn interrupt(&self) {
        self.state.lock().interrupts += 1;
        self.not_empty.notify_all();
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![0, 0, 0, 1, tag], tag as u64, false)
    }

    #[test]
    fn fifo_order() {
        let q = FrameQueue::new(4);
        assert!(q.push(frame(1)));
        assert!(q.push(frame(2)));
        assert_eq!(q.pop_timeout(Duration::ZERO).unwrap().timestamp_us, 1);
        assert_eq!(q.pop_timeout(Duration::ZERO).unwrap().timestamp_us, 2);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_clears_whole_backlog() {
        let capacity = 5;
        let q = FrameQueue::new(capacity);
        for tag in 0..=capacity as u8 {
            assert!(q.push(frame(tag)));
        }
        assert_eq!(q.len(), 1, "only the newest frame must survive");
        let last = q.pop_timeout(Duration::ZERO).unwrap();
        assert_eq!(last.timestamp_us, capacity as u64);
    }

    #[test]
    fn clear_is_idempotent() {
        let q = FrameQueue::new(3);
        q.push(frame(1));
        q.push(frame(2));
        for _ in 0..4 {
            q.clear();
            assert_eq!(q.len(), 0);
            assert!(q.is_empty());
        }
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let q = FrameQueue::with_pop_timeout(2, Duration::from_millis(20));
        let started = Instant::now();
        assert!(q.pop().is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = FrameQueue::new(0);
        assert_eq!(q.capacity(), 1);
        assert!(q.push(frame(7)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn consumer_thread_receives_frames() {
        let q = Arc::new(FrameQueue::new(8));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut got = Vec::new();
                while got.len() < 3 {
                    if let Some(f) = q.pop_timeout(Duration::from_secs(2)) {
                        got.push(f.timestamp_us);
                    } else {
                        break;
                    }
                }
                got
            })
        };
        for tag in 1..=3 {
            assert!(q.push(frame(tag)));
        }
        assert_eq!(consumer.join().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn interrupt_releases_blocked_consumer() {
        let q = Arc::new(FrameQueue::with_pop_timeout(2, Duration::from_secs(10)));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (q.pop(), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        q.interrupt();
        let (popped, waited) = consumer.join().unwrap();
        assert!(popped.is_none());
        assert!(waited < Duration::from_secs(5));
    }
}
