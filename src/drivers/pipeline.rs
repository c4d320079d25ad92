use log::{debug, trace, warn};

use crate::config::Config;
use crate::drivers::buffer::{BatchScratch, CycleHistory};
use crate::drivers::convert::{Calibration, SampleConverter};
use crate::drivers::cycle::{ac_rms, CycleDetector, CycleEvent};
use crate::drivers::source::RawSample;
use crate::drivers::SenseError;
use crate::types::{BatchEnd, BatchFault, BatchOutcome, Measurement};

/// Converts raw blocks, tracks cycles and batch totals, and decides what a finished
/// batch publishes.
pub struct BatchProcessor<C: Calibration> {
    converter: SampleConverter<C>,
    detector: CycleDetector,
    history: CycleHistory,
    scratch: BatchScratch,
    converted: Vec<Option<u32>>,
    cycles_to_average: usize,
    max_samples_per_batch: u64,
}

impl<C: Calibration> BatchProcessor<C> {
    pub fn new(config: &Config, calibration: C) -> Result<Self, SenseError> {
        config.validate()?;
        let cycles_to_average = config.processing.cycles_to_average;
        Ok(Self {
            converter: SampleConverter::new(config.sampling.adc_channel, calibration),
            detector: CycleDetector::new(config.sampling.sample_rate_hz as f32),
            history: CycleHistory::with_capacity(cycles_to_average),
            scratch: BatchScratch::default(),
            converted: Vec::with_capacity(config.sampling.read_len),
            cycles_to_average,
            max_samples_per_batch: config.max_samples_per_batch(),
        })
    }

    pub fn max_samples_per_batch(&self) -> u64 {
        self.max_samples_per_batch
    }

    pub fn scratch(&self) -> &BatchScratch {
        &self.scratch
    }

    #[cfg(test)]
    fn history(&self) -> &CycleHistory {
        &self.history
    }

    pub fn process_block(&mut self, raw: &[RawSample]) {
        self.scratch.samples += raw.len() as u64;
        let reference = match self.converter.convert(raw, &mut self.converted) {
            Ok(reference) => reference,
            Err(err) => {
                warn!("batch invalidated: {err}");
                self.scratch.invalidate(BatchFault::from(&err));
                return;
            }
        };
        trace!("block of {} entries, reference {reference:.1} mV", raw.len());
        for mv in self.converted.iter().flatten().map(|&mv| f64::from(mv)) {
            self.scratch.add_valid(mv);
            match self.detector.push(mv, reference) {
                Some(CycleEvent::Completed(cycle)) => {
                    self.history.push(cycle);
                    self.scratch.cycles_completed += 1;
                }
                Some(CycleEvent::Rejected { samples }) => {
                    let err = SenseError::ShortCycle { samples };
                    debug!("batch invalidated: {err}");
                    self.scratch.invalidate(BatchFault::from(&err));
                }
                None => {}
            }
        }
    }

    /// Folds a failed hardware read into the current batch.
    pub fn record_read_failure(&mut self, err: &SenseError) {
        self.scratch.invalidate(BatchFault::from(err));
    }

    pub fn batch_end(&self) -> Option<BatchEnd> {
        if self.scratch.cycles_completed >= self.cycles_to_average {
            Some(BatchEnd::CycleCount)
        } else if self.scratch.samples >= self.max_samples_per_batch {
            Some(BatchEnd::SampleCount)
        } else {
            None
        }
    }

    /// Decides the batch result, then resets everything batch-scoped.
    /// Only cycles completed in this batch are averaged, so history left over from
    /// earlier batches never leaks into the result.
    pub fn finalize(&mut self) -> BatchOutcome {
        let outcome = match self.scratch.fault() {
            Some(fault) => BatchOutcome::Discarded { fault },
            None => self.valid_outcome(),
        };
        debug!(
            "finalized {outcome:?}; {} cycles retained in history",
            self.history.len()
        );
        self.scratch.reset();
        self.detector.reset();
        outcome
    }

    fn valid_outcome(&self) -> BatchOutcome {
        let cycles = self.scratch.cycles_completed.min(self.cycles_to_average);
        let averaged = if cycles > 0 {
            self.history.mean_of_recent(cycles)
        } else {
            None
        };
        match averaged {
            Some((frequency_hz, rms_mv)) => BatchOutcome::Averaged {
                measurement: Measurement::from_estimates(frequency_hz, rms_mv),
                cycles,
            },
            None => {
                let s = &self.scratch;
                let rms = ac_rms(s.sum, s.sum_sq, s.valid_samples as f64);
                BatchOutcome::DcFallback {
                    measurement: Measurement::from_estimates(0.0, rms),
                    valid_samples: s.valid_samples,
                }
            }
        }
    }
}
