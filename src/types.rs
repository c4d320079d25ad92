// src/types.rs
use std::time::Duration;

use crate::drivers::SenseError;

// 对外发布的测量值 (频率 + RMS)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Measurement {
    pub frequency_hz: u16,
    pub rms_mv: u16,
}

impl Measurement {
    /// Rounds float estimates to the published integer units, saturating at the u16 range.
    pub fn from_estimates(frequency_hz: f64, rms_mv: f64) -> Self {
        Self {
            frequency_hz: round_to_u16(frequency_hz),
            rms_mv: round_to_u16(rms_mv),
        }
    }
}

fn round_to_u16(value: f64) -> u16 {
    // NaN casts to 0
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

// 一个完整周期的测量结果
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompletedCycle {
    pub frequency_hz: f32,
    pub rms_mv: f32,
}

// 导致整批作废的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchFault {
    ReadTimeout,
    ReadFault,
    NoValidSamples,
    ShortCycle,
}

impl From<&SenseError> for BatchFault {
    fn from(err: &SenseError) -> Self {
        match err {
            SenseError::ReadTimeout => BatchFault::ReadTimeout,
            SenseError::NoValidSamples { .. } => BatchFault::NoValidSamples,
            SenseError::ShortCycle { .. } => BatchFault::ShortCycle,
            _ => BatchFault::ReadFault,
        }
    }
}

// 批次结束的方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchEnd {
    CycleCount,
    SampleCount,
}

// 批次结算结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BatchOutcome {
    /// Mean over the cycles completed in this batch.
    Averaged { measurement: Measurement, cycles: usize },
    /// No full cycle seen: frequency 0 plus whole-batch RMS.
    DcFallback { measurement: Measurement, valid_samples: u64 },
    /// Batch invalidated; nothing published.
    Discarded { fault: BatchFault },
}

impl BatchOutcome {
    pub fn published(&self) -> Option<Measurement> {
        match self {
            BatchOutcome::Averaged { measurement, .. }
            | BatchOutcome::DcFallback { measurement, .. } => Some(*measurement),
            BatchOutcome::Discarded { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub end: BatchEnd,
    pub samples: u64,
    pub elapsed: Duration,
}

// 采样线程发给主线程的消息
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Started { max_samples_per_batch: u64 },
    BatchFinished(BatchReport),
    Overrun { elapsed: Duration, target: Duration },
    ReadFault { streak: u32, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn estimates_round_and_saturate() {
        let m = Measurement::from_estimates(49.6, 1234.4);
        assert_eq!(m, Measurement { frequency_hz: 50, rms_mv: 1234 });
        let m = Measurement::from_estimates(-3.0, 1.0e9);
        assert_eq!(m, Measurement { frequency_hz: 0, rms_mv: u16::MAX });
        assert_eq!(Measurement::from_estimates(f64::NAN, 0.4).frequency_hz, 0);
    }
    #[test]
    fn discarded_outcome_publishes_nothing() {
        let outcome = BatchOutcome::Discarded { fault: BatchFault::ReadTimeout };
        assert!(outcome.published().is_none());
        assert_eq!(BatchFault::from(&SenseError::ShortCycle { samples: 1 }), BatchFault::ShortCycle);
    }
}
