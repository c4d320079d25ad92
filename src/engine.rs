// src/engine.rs
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::drivers::{
    BatchProcessor, Calibration, Pacer, PacingOutcome, RawSample, ResultStore, SampleSource,
    SenseError,
};
use crate::types::*;

/// Hardware read counters for the periodic health report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub successful_reads: u64,
    pub timeouts: u64,
    pub faults: u64,
    /// Consecutive failed reads; cleared by the next success.
    pub streak: u32,
}

impl ReadStats {
    fn record_success(&mut self) {
        self.successful_reads += 1;
        self.streak = 0;
    }

    fn record_failure(&mut self, err: &SenseError) -> u32 {
        match err {
            SenseError::ReadTimeout => self.timeouts += 1,
            _ => self.faults += 1,
        }
        self.streak = self.streak.saturating_add(1);
        self.streak
    }
}

/// The sampling loop: read → process → finalize → publish → pace, forever.
pub struct Engine<S: SampleSource, C: Calibration> {
    source: S,
    processor: BatchProcessor<C>,
    pacer: Pacer,
    store: Arc<ResultStore>,
    tx: Sender<EngineEvent>,
    block: Vec<RawSample>,
    stats: ReadStats,
    read_timeout: Duration,
    timeout_streak_alert: u32,
    health_report_every: u64,
    expected_hz: (f32, f32),
}

impl<S: SampleSource, C: Calibration> Engine<S, C> {
    pub fn new(
        config: &Config,
        source: S,
        calibration: C,
        store: Arc<ResultStore>,
        tx: Sender<EngineEvent>,
    ) -> Result<Self, SenseError> {
        let processor = BatchProcessor::new(config, calibration)?;
        Ok(Self {
            source,
            processor,
            pacer: Pacer::new(config.batch_interval(), config.drain_poll()),
            store,
            tx,
            block: vec![RawSample::default(); config.sampling.read_len],
            stats: ReadStats::default(),
            read_timeout: config.read_timeout(),
            timeout_streak_alert: config.processing.timeout_streak_alert,
            health_report_every: config.processing.health_report_every,
            expected_hz: (
                config.processing.min_expected_frequency_hz,
                config.processing.max_expected_frequency_hz,
            ),
        })
    }

    #[cfg(test)]
    fn stats(&self) -> ReadStats {
        self.stats
    }

    #[cfg(test)]
    fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn read_once(&mut self) {
        match self.source.read_block(&mut self.block, self.read_timeout) {
            Ok(n) => {
                self.stats.record_success();
                let reads = self.stats.successful_reads;
                if self.health_report_every > 0 && reads % self.health_report_every == 0 {
                    info!(
                        "ADC health: {reads} successful reads, {} timeouts, {} faults",
                        self.stats.timeouts, self.stats.faults
                    );
                }
                self.processor.process_block(&self.block[..n]);
            }
            Err(err) => {
                self.processor.record_read_failure(&err);
                let streak = self.stats.record_failure(&err);
                if !err.is_transient() {
                    error!("unexpected source error: {err}");
                } else if streak == 1 || streak % 5 == 0 {
                    warn!("ADC read failed ({err}), {streak} in a row");
                }
                if streak == self.timeout_streak_alert {
                    error!("{streak} consecutive ADC read failures; hardware may need attention");
                }
                self.tx
                    .send(EngineEvent::ReadFault {
                        streak,
                        error: err.to_string(),
                    })
                    .ok();
            }
        }
    }

    /// Runs one batch to completion, publishes its result if usable, then paces.
    pub fn run_batch(&mut self) -> BatchReport {
        self.pacer.start_batch();
        let end = loop {
            self.read_once();
            if let Some(end) = self.processor.batch_end() {
                break end;
            }
        };
        let samples = self.processor.scratch().samples;
        let outcome = self.processor.finalize();
        self.publish(&outcome);
        let report = BatchReport {
            outcome,
            end,
            samples,
            elapsed: self.pacer.elapsed(),
        };
        debug!("batch finished: {report:?}");
        self.tx.send(EngineEvent::BatchFinished(report)).ok();

        match self.pacer.finish_batch(&mut self.source, &mut self.block) {
            PacingOutcome::Overrun { elapsed } => {
                let target = self.pacer.interval();
                warn!("batch took {elapsed:?}, over the {target:?} interval");
                self.tx.send(EngineEvent::Overrun { elapsed, target }).ok();
            }
            PacingOutcome::Drained {
                idle,
                reads,
                discarded,
            } => {
                debug!("idled {idle:?} over {reads} reads, discarded {discarded} entries");
            }
        }
        report
    }

    fn publish(&self, outcome: &BatchOutcome) {
        match *outcome {
            BatchOutcome::Averaged { measurement, cycles } => {
                self.store.publish(measurement);
                info!(
                    "published {} Hz, {} mV (mean of {cycles} cycles)",
                    measurement.frequency_hz, measurement.rms_mv
                );
                let (min, max) = self.expected_hz;
                let hz = f32::from(measurement.frequency_hz);
                if hz < min || hz > max {
                    warn!("{hz} Hz is outside the expected {min}..{max} Hz range");
                }
            }
            BatchOutcome::DcFallback {
                measurement,
                valid_samples,
            } => {
                self.store.publish(measurement);
                info!(
                    "no full cycle in {valid_samples} samples; published 0 Hz, {} mV",
                    measurement.rms_mv
                );
            }
            BatchOutcome::Discarded { fault } => {
                warn!(
                    "batch discarded ({fault:?}); keeping {:?}",
                    self.store.latest()
                );
            }
        }
    }

    pub fn run(mut self) -> ! {
        self.tx
            .send(EngineEvent::Started {
                max_samples_per_batch: self.processor.max_samples_per_batch(),
            })
            .ok();
        loop {
            self.run_batch();
        }
    }
}

pub fn spawn_thread<S, C>(engine: Engine<S, C>) -> JoinHandle<()>
where
    S: SampleSource + Send + 'static,
    C: Calibration + Send + 'static,
{
    thread::spawn(move || {
        engine.run();
    })
}
