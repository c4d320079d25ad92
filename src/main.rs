// src/main.rs
mod config;
mod drivers;
mod engine;
mod types;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use crate::config::{Config, CONFIG_ENV};
use crate::drivers::{wire, LinearCalibration, ResultStore, SimulatedSource, WireResponder};
use crate::engine::Engine;
use crate::types::{BatchOutcome, EngineEvent};

// 汇总日志的批次间隔
const SUMMARY_EVERY: u64 = 10;

// 主线程统计
#[derive(Debug, Default, PartialEq, Eq)]
struct RunTotals {
    batches: u64,
    averaged: u64,
    dc_fallback: u64,
    discarded: u64,
    overruns: u64,
    read_faults: u64,
}

impl RunTotals {
    fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::BatchFinished(report) => {
                self.batches += 1;
                match report.outcome {
                    BatchOutcome::Averaged { .. } => self.averaged += 1,
                    BatchOutcome::DcFallback { .. } => self.dc_fallback += 1,
                    BatchOutcome::Discarded { .. } => self.discarded += 1,
                }
            }
            EngineEvent::Overrun { .. } => self.overruns += 1,
            EngineEvent::ReadFault { .. } => self.read_faults += 1,
            EngineEvent::Started { .. } => {}
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "current-sense")]
#[command(about = "Zero-crossing frequency and RMS monitor for one ADC channel", long_about = None)]
struct Args {
    /// JSON config file; built-in defaults when omitted
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
}

// 入口函数
fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    info!(
        "sampling channel {} at {} Hz, averaging {} cycles every {:?}",
        config.sampling.adc_channel,
        config.sampling.sample_rate_hz,
        config.processing.cycles_to_average,
        config.batch_interval()
    );

    let calibration = LinearCalibration::from(&config.calibration);
    let source = SimulatedSource::new(
        config.sampling.adc_channel,
        config.sampling.sample_rate_hz,
        config.sampling.read_len,
        calibration,
        config.simulation.clone(),
    )
    .context("failed to start the sample source")?;
    let store = Arc::new(ResultStore::new());
    let (tx, rx) = channel();
    let engine = Engine::new(&config, source, calibration, Arc::clone(&store), tx)?;
    engine::spawn_thread(engine);

    // 串口应答线程 (可选)
    if let Some(path) = config.wire.serial_port.clone() {
        let responder = WireResponder::new(Arc::clone(&store));
        let baud_rate = config.wire.baud_rate;
        let poll_timeout = config.wire_poll_timeout();
        thread::spawn(move || {
            match wire::serve_serial(&responder, &path, baud_rate, poll_timeout) {
                Ok(answered) => info!("{path} closed after {answered} responses"),
                Err(err) => error!("wire responder on {path} failed: {err}"),
            }
        });
    } else {
        info!("no serial port configured; results are only logged");
    }

    let mut totals = RunTotals::default();
    for event in rx {
        totals.record(&event);
        match &event {
            EngineEvent::Started {
                max_samples_per_batch,
            } => info!("sampling started, at most {max_samples_per_batch} samples per batch"),
            EngineEvent::BatchFinished(report) => {
                debug!(
                    "batch ended by {:?} after {} samples in {:?}",
                    report.end, report.samples, report.elapsed
                );
                if totals.batches % SUMMARY_EVERY == 0 {
                    info!("totals: {totals:?}, latest {:?}", store.latest());
                }
            }
            EngineEvent::Overrun { elapsed, target } if totals.overruns == 1 => {
                warn!(
                    "first overrun ({elapsed:?} > {target:?}); the interval may be too short for {} cycles",
                    config.processing.cycles_to_average
                );
            }
            EngineEvent::ReadFault { streak, error } => debug!("read fault #{streak}: {error}"),
            _ => {}
        }
    }
    bail!("sampling thread exited after {} batches", totals.batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use std::time::Duration;
    #[test]
    fn config_flag_is_parsed_and_help_is_not_a_path() {
        Args::command().debug_assert();
        let args = Args::try_parse_from(["current-sense", "--config", "site.json"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("site.json")));
        let err = Args::try_parse_from(["current-sense", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        // a bare positional is rejected rather than read as a file name
        assert!(Args::try_parse_from(["current-sense", "site.json"]).is_err());
    }
    #[test]
    fn totals_count_each_outcome() {
        let report = |outcome| BatchReport {
            outcome,
            end: BatchEnd::CycleCount,
            samples: 100,
            elapsed: Duration::from_millis(5),
        };
        let measurement = Measurement { frequency_hz: 50, rms_mv: 10 };
        let events = [
            EngineEvent::Started { max_samples_per_batch: 10 },
            EngineEvent::BatchFinished(report(BatchOutcome::Averaged { measurement, cycles: 3 })),
            EngineEvent::BatchFinished(report(BatchOutcome::Discarded {
                fault: BatchFault::ReadTimeout,
            })),
            EngineEvent::ReadFault { streak: 1, error: "timed out".into() },
            EngineEvent::Overrun {
                elapsed: Duration::from_millis(20),
                target: Duration::from_millis(10),
            },
        ];
        let mut totals = RunTotals::default();
        for event in &events {
            totals.record(event);
        }
        assert_eq!(
            totals,
            RunTotals {
                batches: 2,
                averaged: 1,
                dc_fallback: 0,
                discarded: 1,
                overruns: 1,
                read_faults: 1,
            }
        );
    }
}
