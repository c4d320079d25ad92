use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Measurement;

/// Latest published measurement, packed into one atomic word so a reader always
/// gets both fields from the same batch. Never blocks either side.
#[derive(Debug, Default)]
pub struct ResultStore {
    packed: AtomicU32,
}

impl ResultStore {
    pub const fn new() -> Self {
        Self {
            packed: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, measurement: Measurement) {
        self.packed.store(pack(measurement), Ordering::Release);
    }

    pub fn latest(&self) -> Measurement {
        unpack(self.packed.load(Ordering::Acquire))
    }
}

fn pack(m: Measurement) -> u32 {
    u32::from(m.frequency_hz) | (u32::from(m.rms_mv) << 16)
}

fn unpack(word: u32) -> Measurement {
    Measurement {
        frequency_hz: (word & 0xFFFF) as u16,
        rms_mv: (word >> 16) as u16,
    }
}
