//! Fixed-capacity byte ring for raw PCM, shared by each source's
//! conversion output and the mixer's output buffer. Backed by
//! `ringbuf`'s `HeapRb`, split into a producer/consumer pair the same way
//! the capture-callback/processing-loop PCM buffer is built elsewhere in
//! this codebase's lineage: push appends lock-free up to capacity, and a
//! full ring drops the oldest bytes to make room for the writer, same as
//! the packet ring's eviction policy but applied a byte at a time instead
//! of a slot at a time.

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub struct PcmRing {
    producer: Mutex<HeapProd<u8>>,
    consumer: Mutex<HeapCons<u8>>,
    capacity_bytes: usize,
}

impl PcmRing {
    pub fn new(capacity_bytes: usize) -> Self {
        let rb = HeapRb::<u8>::new(capacity_bytes.max(1));
        let (producer, consumer) = rb.split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity_bytes,
        }
    }

    /// Append bytes, dropping the oldest data if this would exceed capacity.
    pub fn write(&self, bytes: &[u8]) {
        let mut prod = self.producer.lock();
        let mut remaining = bytes;
        loop {
            let written = prod.push_slice(remaining);
            remaining = &remaining[written..];
            if remaining.is_empty() {
                break;
            }
            // The ring is full and the writer still has bytes left: drop
            // the oldest data to make room, same as the producer simply
            // overwriting the oldest samples.
            let mut cons = self.consumer.lock();
            let to_drop = remaining.len().min(cons.occupied_len());
            cons.skip(to_drop);
        }
    }

    /// Remove and return up to `len` bytes from the front. Returns fewer
    /// bytes than requested if the ring holds less.
    pub fn read(&self, len: usize) -> Vec<u8> {
        let mut cons = self.consumer.lock();
        let n = len.min(cons.occupied_len());
        let mut out = vec![0u8; n];
        let popped = cons.pop_slice(&mut out);
        out.truncate(popped);
        out
    }

    pub fn available(&self) -> usize {
        self.consumer.lock().occupied_len()
    }

    pub fn clear(&self) {
        let mut cons = self.consumer.lock();
        let n = cons.occupied_len();
        cons.skip(n);
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_fewer_bytes_than_available_when_ring_short() {
        let ring = PcmRing::new(1024);
        ring.write(&[1, 2, 3]);
        assert_eq!(ring.read(10), vec![1, 2, 3]);
    }

    #[test]
    fn write_past_capacity_drops_oldest_bytes() {
        let ring = PcmRing::new(4);
        ring.write(&[1, 2, 3, 4]);
        ring.write(&[5, 6]);
        assert_eq!(ring.available(), 4);
        assert_eq!(ring.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn clear_empties_the_ring() {
        let ring = PcmRing::new(16);
        ring.write(&[1, 2, 3]);
        ring.clear();
        assert_eq!(ring.available(), 0);
    }
}
