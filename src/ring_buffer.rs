//! Byte ring buffer between an irregular capture callback and fixed-size block reads.
//!
//! One writer and one reader, guarded by a single mutex. Every byte of capacity is
//! usable: the buffer is full when occupancy equals capacity, and a write never
//! stores more than `capacity - occupancy` bytes.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct RingState {
    storage: Box<[u8]>,
    read_pos: usize,
    occupancy: usize,
}

impl RingState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            occupancy: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }
}

/// Lock-protected circular byte buffer.
#[derive(Debug)]
pub struct RingBuffer {
    state: Mutex<RingState>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reallocates the backing store and discards everything queued.
    ///
    /// Takes `&mut self`, so no read or write can be in flight.
    pub fn reset(&mut self, capacity: usize) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        *state = RingState::with_capacity(capacity);
    }

    /// Copies as much of `data` as fits and returns the number of bytes stored.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut state = self.lock();
        let capacity = state.capacity();
        let to_write = data.len().min(capacity - state.occupancy);
        if to_write == 0 {
            return 0;
        }

        let write_pos = (state.read_pos + state.occupancy) % capacity;
        let tail_run = to_write.min(capacity - write_pos);
        let head_run = to_write - tail_run;

        state.storage[write_pos..write_pos + tail_run].copy_from_slice(&data[..tail_run]);
        if head_run > 0 {
            state.storage[..head_run].copy_from_slice(&data[tail_run..to_write]);
        }

        state.occupancy += to_write;
        to_write
    }

    /// Moves up to `buffer.len()` queued bytes into `buffer` and returns how many were moved.
    pub fn read(&self, buffer: &mut [u8]) -> usize {
        let mut state = self.lock();
        let capacity = state.capacity();
        let to_read = buffer.len().min(state.occupancy);
        if to_read == 0 {
            return 0;
        }

        let read_pos = state.read_pos;
        let tail_run = to_read.min(capacity - read_pos);
        let head_run = to_read - tail_run;

        buffer[..tail_run].copy_from_slice(&state.storage[read_pos..read_pos + tail_run]);
        if head_run > 0 {
            buffer[tail_run..to_read].copy_from_slice(&state.storage[..head_run]);
        }

        state.read_pos = (read_pos + to_read) % capacity;
        state.occupancy -= to_read;
        to_read
    }

    /// Number of bytes currently queued.
    pub fn queue_size(&self) -> usize {
        self.lock().occupancy
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn free_space(&self) -> usize {
        let state = self.lock();
        state.capacity() - state.occupancy
    }

    pub fn is_empty(&self) -> bool {
        self.queue_size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn partial_write_when_nearly_full() {
        let ring = RingBuffer::new(16);
        assert_eq!(ring.write(&[0xAA; 8]), 8);
        assert_eq!(ring.queue_size(), 8);

        assert_eq!(ring.write(&[0xBB; 10]), 8);
        assert_eq!(ring.queue_size(), 16);
        assert_eq!(ring.free_space(), 0);
        assert_eq!(ring.write(&[0xCC; 1]), 0);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(out, [0xAA; 8]);
        assert_eq!(ring.queue_size(), 8);
    }

    #[test]
    fn read_never_exceeds_occupancy() {
        let ring = RingBuffer::new(8);
        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 0);
        ring.write(&[1, 2, 3]);
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(ring.is_empty());
    }

    #[test]
    fn queue_size_tracks_written_minus_read() {
        let ring = RingBuffer::new(13);
        let mut written = 0usize;
        let mut read = 0usize;
        let mut out = [0u8; 7];

        // Deterministic mix of write and read sizes that keeps the ring within capacity.
        for step in 0..200usize {
            let want = (step * 5) % 9;
            let free = 13 - (written - read);
            let chunk = vec![step as u8; want.min(free)];
            written += ring.write(&chunk);
            assert_eq!(ring.queue_size(), written - read);

            let take = (step * 3) % 8;
            read += ring.read(&mut out[..take.min(7)]);
            assert_eq!(ring.queue_size(), written - read);
        }
    }

    #[test]
    fn round_trip_through_many_wraparounds() {
        let ring = RingBuffer::new(10);
        let source: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut sink = Vec::with_capacity(source.len());
        let mut offset = 0;
        let mut scratch = [0u8; 6];

        while sink.len() < source.len() {
            let end = (offset + 7).min(source.len());
            offset += ring.write(&source[offset..end]);
            let n = ring.read(&mut scratch);
            sink.extend_from_slice(&scratch[..n]);
        }

        assert_eq!(sink, source);
    }

    #[test]
    fn reset_discards_queue_and_resizes() {
        let mut ring = RingBuffer::new(4);
        ring.write(&[9, 9, 9]);
        ring.reset(32);
        assert_eq!(ring.queue_size(), 0);
        assert_eq!(ring.capacity(), 32);
        assert_eq!(ring.write(&[1u8; 40]), 32);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        let ring = Arc::new(RingBuffer::new(64));
        let total = 20_000usize;

        let producer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                let data: Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();
                let mut offset = 0;
                while offset < total {
                    let end = (offset + 37).min(total);
                    let n = ring.write(&data[offset..end]);
                    offset += n;
                    if n == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(total);
        let mut scratch = [0u8; 29];
        while received.len() < total {
            let n = ring.read(&mut scratch);
            if n == 0 {
                std::thread::yield_now();
            }
            received.extend_from_slice(&scratch[..n]);
        }
        producer.join().unwrap();

        assert!(received.iter().enumerate().all(|(i, b)| *b == (i % 256) as u8));
    }
}
