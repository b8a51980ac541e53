/// Rolling view of server-reported request queueing delay
///
/// Every completed request may record the queue-time header value here.
/// The buffer is a fixed-capacity ring guarded by a mutex held only for
/// the single slot write, so writers never wait on a full sweep and the
/// average is always computed from a consistent snapshot.
use std::sync::Mutex;

/// Bounded sample buffer of queue-time observations, in seconds
#[derive(Debug)]
pub struct QueueTimeMetrics {
    ring: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    samples: Vec<f64>,
    head: usize,
    len: usize,
}

impl QueueTimeMetrics {
    /// Buffer holding up to `capacity` most recent samples
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                samples: vec![0.0; capacity],
                head: 0,
                len: 0,
            }),
        }
    }

    /// Record one observation; the oldest sample is overwritten once the
    /// buffer is full. O(1), never blocks beyond the slot write.
    pub fn add(&self, sample: f64) {
        let mut ring = self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let capacity = ring.samples.len();
        if capacity == 0 {
            return;
        }
        if ring.len < capacity {
            let slot = (ring.head + ring.len) % capacity;
            ring.samples[slot] = sample;
            ring.len += 1;
        } else {
            let slot = ring.head;
            ring.samples[slot] = sample;
            ring.head = (ring.head + 1) % capacity;
        }
    }

    /// Arithmetic mean of the retained samples, 0.0 when empty
    pub fn avg(&self) -> f64 {
        let ring = self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if ring.len == 0 {
            return 0.0;
        }
        let capacity = ring.samples.len();
        let sum: f64 = (0..ring.len)
            .map(|i| ring.samples[(ring.head + i) % capacity])
            .sum();
        sum / ring.len as f64
    }

    /// Number of samples currently retained
    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> Vec<f64> {
        let ring = self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let capacity = ring.samples.len();
        (0..ring.len)
            .map(|i| ring.samples[(ring.head + i) % capacity])
            .collect()
    }
}
