//! Lossless handoff of captured samples from the audio callback to the publish loop.
//!
//! The capture side owns a [`SampleSink`] and only ever pushes into a lock-free
//! SPSC ring buffer, so the audio callback can never block on the loop. The loop
//! side owns the [`SampleAccumulator`], which moves whatever the ring holds into
//! its pending window on every drain attempt and hands the whole window out once
//! it is long enough.

use log::warn;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Creates a connected sink/accumulator pair.
///
/// `capacity` bounds how many samples may sit in the ring between two drain
/// attempts. It should cover at least one window so a stalled tick cannot
/// overflow it.
pub fn sample_channel(capacity: usize) -> (SampleSink, SampleAccumulator) {
    let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
    let dropped = Arc::new(AtomicUsize::new(0));

    let sink = SampleSink {
        prod,
        dropped: dropped.clone(),
    };
    let accumulator = SampleAccumulator {
        cons,
        pending: Vec::with_capacity(capacity),
        dropped,
        reported_dropped: 0,
    };
    (sink, accumulator)
}

/// Producer half, moved into the capture callback.
pub struct SampleSink {
    prod: HeapProd<f32>,
    dropped: Arc<AtomicUsize>,
}

impl SampleSink {
    /// Appends a captured batch. Returns how many samples were accepted.
    ///
    /// Never blocks. Samples that do not fit are counted and reported by the
    /// consumer on its next drain.
    pub fn append(&mut self, samples: &[f32]) -> usize {
        let pushed = self.prod.push_slice(samples);
        if pushed < samples.len() {
            self.dropped
                .fetch_add(samples.len() - pushed, Ordering::Relaxed);
        }
        pushed
    }
}

/// Consumer half: the buffer of samples not yet folded into a window.
pub struct SampleAccumulator {
    cons: HeapCons<f32>,
    pending: Vec<f32>,
    dropped: Arc<AtomicUsize>,
    reported_dropped: usize,
}

impl SampleAccumulator {
    /// Takes the whole buffer if it holds at least `window_size` samples.
    ///
    /// The returned window is never empty and is not truncated to
    /// `window_size`. When the buffer is still short, nothing is removed.
    pub fn drain_if_full(&mut self, window_size: usize) -> Option<Vec<f32>> {
        self.collect();

        if self.pending.len() < window_size.max(1) {
            return None;
        }
        let capacity = self.pending.capacity();
        Some(mem::replace(&mut self.pending, Vec::with_capacity(capacity)))
    }

    /// Number of samples currently buffered on either side of the ring.
    pub fn len(&self) -> usize {
        self.pending.len() + self.cons.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total samples the sink had to discard because the ring was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn collect(&mut self) {
        self.pending.extend(self.cons.pop_iter());

        let dropped = self.dropped();
        if dropped > self.reported_dropped {
            warn!(
                "Sample ring overflow: {} samples lost since last drain",
                dropped - self.reported_dropped
            );
            self.reported_dropped = dropped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_returns_concatenation() {
        let (mut sink, mut acc) = sample_channel(64);
        sink.append(&[1.0, 2.0, 3.0]);
        sink.append(&[4.0]);
        sink.append(&[5.0, 6.0]);

        let window = acc.drain_if_full(4).expect("window should be full");
        assert_eq!(window, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_short_buffer_is_left_untouched() {
        let (mut sink, mut acc) = sample_channel(64);
        sink.append(&[0.5; 3]);

        assert!(acc.drain_if_full(4).is_none());
        assert!(acc.drain_if_full(4).is_none());
        assert_eq!(acc.len(), 3);

        sink.append(&[0.25]);
        let window = acc.drain_if_full(4).unwrap();
        assert_eq!(window, vec![0.5, 0.5, 0.5, 0.25]);
    }

    #[test]
    fn test_pending_survives_across_partial_drains() {
        let (mut sink, mut acc) = sample_channel(4);
        // The ring only holds 4, but each drain attempt empties it into the
        // pending window, so more than `capacity` can accumulate.
        for i in 0..5 {
            sink.append(&[i as f32; 4]);
            assert!(acc.drain_if_full(100).is_none());
        }
        assert_eq!(acc.len(), 20);
        assert_eq!(acc.dropped(), 0);
        assert_eq!(acc.drain_if_full(20).unwrap().len(), 20);
    }

    #[test]
    fn test_overflow_is_counted() {
        let (mut sink, mut acc) = sample_channel(4);
        assert_eq!(sink.append(&[1.0; 6]), 4);
        assert_eq!(acc.dropped(), 2);
        assert_eq!(acc.drain_if_full(4).unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_zero_window_never_yields_empty() {
        let (_sink, mut acc) = sample_channel(8);
        assert!(acc.drain_if_full(0).is_none());
    }

    #[test]
    fn test_concurrent_append_and_drain_is_lossless() {
        let (mut sink, mut acc) = sample_channel(1024);
        let total = 20_000usize;

        let producer = thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let batch: Vec<f32> = (next..(next + 50).min(total)).map(|i| i as f32).collect();
                let mut offset = 0;
                while offset < batch.len() {
                    offset += sink.append(&batch[offset..]);
                    if offset < batch.len() {
                        thread::yield_now();
                    }
                }
                next += batch.len();
            }
        });

        let mut received = Vec::with_capacity(total);
        while received.len() < total {
            match acc.drain_if_full(100) {
                Some(window) => received.extend(window),
                None if producer.is_finished() => {
                    if let Some(rest) = acc.drain_if_full(1) {
                        received.extend(rest);
                    }
                }
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        let expected: Vec<f32> = (0..total).map(|i| i as f32).collect();
        assert_eq!(received, expected);
    }
}
