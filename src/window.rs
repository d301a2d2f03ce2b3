//! Fixed-capacity ring of recent primary-call samples.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Outcome attached to a recorded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    nanos: u64,
    outcome: SampleOutcome,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Sample>,
    next: usize,
    capacity: usize,
}

impl Ring {
    fn push(&mut self, sample: Sample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    fn average(&self) -> Duration {
        if self.slots.is_empty() {
            return Duration::ZERO;
        }
        let sum: u128 = self.slots.iter().map(|s| u128::from(s.nanos)).sum();
        let avg = sum / self.slots.len() as u128;
        Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
    }
}

/// Point-in-time view of a [`SlidingWindowStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Samples currently stored.
    pub samples: usize,
    /// Stored samples whose outcome was an error.
    pub errors: usize,
    /// Mean duration of the stored samples.
    pub average: Duration,
}

/// Sliding window of `(duration, outcome)` samples.
///
/// Once full, every new sample overwrites the oldest one. The average is
/// always computed from what is physically in the ring, never from a
/// lifetime running sum.
///
/// Shared by every race on the same engine; all access goes through one
/// lock so a record and an average never interleave.
#[derive(Debug)]
pub struct SlidingWindowStats {
    ring: Mutex<Ring>,
}

impl SlidingWindowStats {
    /// Creates an empty window holding at most `capacity` samples.
    ///
    /// A zero capacity is clamped to one; [`HedgeConfig::validate`](crate::HedgeConfig::validate)
    /// rejects it before an engine gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: Vec::with_capacity(capacity),
                next: 0,
                capacity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // The ring is plain data that every write leaves consistent.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a sample at the next ring position.
    pub fn record(&self, duration: Duration, outcome: SampleOutcome) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.lock().push(Sample { nanos, outcome });
    }

    /// Mean of the durations currently stored, or zero for an empty window.
    pub fn snapshot_average(&self) -> Duration {
        self.lock().average()
    }

    /// Sample count, error count and average, read under a single lock.
    pub fn snapshot(&self) -> WindowSnapshot {
        let ring = self.lock();
        WindowSnapshot {
            samples: ring.slots.len(),
            errors: ring
                .slots
                .iter()
                .filter(|s| s.outcome == SampleOutcome::Error)
                .count(),
            average: ring.average(),
        }
    }

    /// Number of samples currently stored.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Returns `true` when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of samples kept.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}
