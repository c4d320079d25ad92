use crate::types::{BatchFault, CompletedCycle};

/// Fixed-capacity ring of the most recent completed cycles.
/// Lives for the whole run; batch boundaries do not clear it.
pub struct CycleHistory {
    slots: Vec<CompletedCycle>,
    capacity: usize,
    write_index: usize,
}

impl CycleHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            write_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, cycle: CompletedCycle) {
        if self.slots.len() < self.capacity {
            self.slots.push(cycle);
        } else {
            self.slots[self.write_index] = cycle;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    /// Up to `count` entries, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &CompletedCycle> + '_ {
        let take = count.min(self.slots.len());
        (1..=take).map(move |back| {
            let idx = (self.write_index + self.capacity - back) % self.capacity;
            &self.slots[idx]
        })
    }

    /// Arithmetic mean of (frequency, RMS) over the `count` newest entries.
    pub fn mean_of_recent(&self, count: usize) -> Option<(f64, f64)> {
        let mut taken = 0usize;
        let (mut freq, mut rms) = (0.0f64, 0.0f64);
        for cycle in self.recent(count) {
            freq += f64::from(cycle.frequency_hz);
            rms += f64::from(cycle.rms_mv);
            taken += 1;
        }
        if taken == 0 {
            return None;
        }
        Some((freq / taken as f64, rms / taken as f64))
    }
}

/// Counters that live for exactly one batch.
#[derive(Clone, Debug, Default)]
pub struct BatchScratch {
    pub samples: u64,
    pub valid_samples: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub cycles_completed: usize,
    fault: Option<BatchFault>,
}

impl BatchScratch {
    pub fn add_valid(&mut self, mv: f64) {
        self.valid_samples += 1;
        self.sum += mv;
        self.sum_sq += mv * mv;
    }

    /// Marks the batch unusable. The first fault is kept as the reason.
    pub fn invalidate(&mut self, fault: BatchFault) {
        self.fault.get_or_insert(fault);
    }

    #[cfg(test)]
    pub fn is_valid(&self) -> bool {
        self.fault.is_none()
    }

    pub fn fault(&self) -> Option<BatchFault> {
        self.fault
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
