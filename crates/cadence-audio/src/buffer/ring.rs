//! Lock-free sample ring for audio streaming.
//!
//! Single producer (the decode worker) and single consumer (the output
//! callback). Samples are stored as `f32` bit patterns in atomics so the
//! ring is `Sync` without any unsafe code; the read and write cursors
//! publish ownership with acquire/release ordering.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer ring of interleaved samples.
#[derive(Debug)]
pub struct SampleRing {
    slots: Box<[AtomicU32]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    /// Power of two, so `pos & mask` wraps.
    capacity: usize,
    mask: usize,
}

impl SampleRing {
    /// Create a ring holding at least `capacity` samples.
    ///
    /// The capacity is rounded up to the next power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots = (0..capacity).map(|_| AtomicU32::new(0)).collect();

        Self {
            slots,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples available for reading.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Free slots for writing.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write as many samples as fit. Producer side only.
    pub fn write(&self, samples: &[f32]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(space);

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            self.slots[write_pos.wrapping_add(offset) & self.mask]
                .store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read one whole frame of `frame.len()` samples, or nothing.
    ///
    /// Returns false (and leaves `frame` untouched) when less than a frame
    /// is buffered. Consumer side only.
    pub fn read_frame(&self, frame: &mut [f32]) -> bool {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        if write_pos.wrapping_sub(read_pos) < frame.len() {
            return false;
        }

        for (offset, sample) in frame.iter_mut().enumerate() {
            let bits = self.slots[read_pos.wrapping_add(offset) & self.mask].load(Ordering::Relaxed);
            *sample = f32::from_bits(bits);
        }

        self.read_pos
            .store(read_pos.wrapping_add(frame.len()), Ordering::Release);
        true
    }

    /// Read up to `output.len()` samples. Consumer side only.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let to_read = output.len().min(write_pos.wrapping_sub(read_pos));
        for (offset, sample) in output[..to_read].iter_mut().enumerate() {
            let bits = self.slots[read_pos.wrapping_add(offset) & self.mask].load(Ordering::Relaxed);
            *sample = f32::from_bits(bits);
        }

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Discard everything buffered. Called by the producer on seek.
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}

/// Thread-safe reference to a sample ring.
pub type SharedSampleRing = Arc<SampleRing>;

/// Create a new shared sample ring.
pub fn shared_sample_ring(capacity: usize) -> SharedSampleRing {
    Arc::new(SampleRing::new(capacity))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_basic_write_read() {
        let ring = SampleRing::new(1024);

        let samples = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(ring.write(&samples), 5);
        assert_eq!(ring.available(), 5);

        let mut output = [0.0f32; 5];
        assert_eq!(ring.read(&mut output), 5);
        assert_eq!(output, samples);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let ring = SampleRing::new(8);

        assert_eq!(ring.write(&[1.0f32; 6]), 6);
        let mut output = [0.0f32; 4];
        assert_eq!(ring.read(&mut output), 4);

        assert_eq!(ring.write(&[2.0f32; 5]), 5);

        let mut rest = [0.0f32; 7];
        assert_eq!(ring.read(&mut rest), 7);
        assert_eq!(&rest[0..2], &[1.0, 1.0]);
        assert_eq!(&rest[2..7], &[2.0; 5]);
    }

    #[test]
    fn test_full_ring_rejects_writes() {
        let ring = SampleRing::new(4);
        assert_eq!(ring.write(&[1.0f32; 4]), 4);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.write(&[2.0]), 0);

        let mut one = [0.0f32; 1];
        ring.read(&mut one);
        assert_eq!(ring.write(&[2.0]), 1);
    }

    #[test]
    fn test_read_frame_is_all_or_nothing() {
        let ring = SampleRing::new(16);
        ring.write(&[0.1, 0.2, 0.3]);

        let mut frame = [9.0f32; 2];
        assert!(ring.read_frame(&mut frame));
        assert_eq!(frame, [0.1, 0.2]);

        assert!(!ring.read_frame(&mut frame));
        assert_eq!(frame, [0.1, 0.2]);
        assert_eq!(ring.available(), 1);
    }

    #[test]
    fn test_clear() {
        let ring = SampleRing::new(16);
        ring.write(&[1.0f32; 10]);
        ring.clear();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let ring = Arc::new(SampleRing::new(1024));
        let writer_ring = Arc::clone(&ring);

        let writer = thread::spawn(move || {
            let mut next = 0u32;
            while next < 10_000 {
                let chunk: Vec<f32> = (next..next + 100).map(|i| i as f32).collect();
                let written = writer_ring.write(&chunk);
                next += written as u32;
                if written == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0u32;
        let mut output = [0.0f32; 64];
        while expected < 10_000 {
            let read = ring.read(&mut output);
            for sample in &output[..read] {
                assert_eq!(*sample, expected as f32);
                expected += 1;
            }
            if read == 0 {
                thread::yield_now();
            }
        }

        writer.join().unwrap();
    }
}
