#[cfg(test)]
use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::drivers::convert::LinearCalibration;
use crate::drivers::SenseError;

/// Largest code a 12-bit converter produces.
pub const ADC_MAX_CODE: u16 = 4095;

/// One DMA result entry: a raw conversion tagged with the channel it came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawSample {
    pub channel: u8,
    pub code: u16,
}

/// Anything that can hand out blocks of raw conversions within a bounded wait.
pub trait SampleSource {
    /// Fills the front of `buf` and returns how many entries were written.
    /// A timeout or driver fault is reported as an error, never as `Ok(0)`.
    fn read_block(&mut self, buf: &mut [RawSample], timeout: Duration)
        -> Result<usize, SenseError>;
}

/// Scripted source for tests.
/// An exhausted script behaves like a starved peripheral and times out.
#[cfg(test)]
pub struct ManualSource {
    queue: VecDeque<Result<Vec<RawSample>, SenseError>>,
}

#[cfg(test)]
impl ManualSource {
    pub fn new(blocks: impl IntoIterator<Item = Result<Vec<RawSample>, SenseError>>) -> Self {
        Self {
            queue: blocks.into_iter().collect(),
        }
    }

    pub fn push(&mut self, block: Result<Vec<RawSample>, SenseError>) {
        self.queue.push_back(block);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
impl SampleSource for ManualSource {
    fn read_block(
        &mut self,
        buf: &mut [RawSample],
        _timeout: Duration,
    ) -> Result<usize, SenseError> {
        let block = self.queue.pop_front().ok_or(SenseError::ReadTimeout)??;
        let take = block.len().min(buf.len());
        buf[..take].copy_from_slice(&block[..take]);
        if take < block.len() {
            self.queue.push_front(Ok(block[take..].to_vec()));
        }
        Ok(take)
    }
}

/// Tags raw codes with a single channel id.
#[cfg(test)]
pub fn tagged(channel: u8, codes: impl IntoIterator<Item = u16>) -> Vec<RawSample> {
    codes
        .into_iter()
        .map(|code| RawSample { channel, code })
        .collect()
}

/// Stand-in for the continuous-mode ADC: a noisy tone that "arrives" in real time
/// at the configured sample rate, with a bounded backlog like a DMA ring.
pub struct SimulatedSource {
    channel: u8,
    sample_rate_hz: f64,
    settings: SimulationConfig,
    calibration: LinearCalibration,
    backlog_capacity: u64,
    started: Instant,
    produced: u64,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(
        channel: u8,
        sample_rate_hz: u32,
        read_len: usize,
        calibration: LinearCalibration,
        settings: SimulationConfig,
    ) -> Result<Self, SenseError> {
        if sample_rate_hz == 0 {
            return Err(SenseError::InvalidSampleRate);
        }
        let rng = StdRng::seed_from_u64(settings.seed);
        Ok(Self {
            channel,
            sample_rate_hz: f64::from(sample_rate_hz),
            settings,
            calibration,
            backlog_capacity: (read_len as u64).max(1) * 16,
            started: Instant::now(),
            produced: 0,
            rng,
        })
    }

    fn due(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() * self.sample_rate_hz) as u64
    }

    /// Samples waiting in the ring. An overflowed ring drops its oldest entries
    /// and reports the gap as a read fault.
    fn ready(&mut self) -> Result<u64, SenseError> {
        let backlog = self.due().saturating_sub(self.produced);
        if backlog > self.backlog_capacity {
            let lost = backlog - self.backlog_capacity;
            self.produced += lost;
            return Err(SenseError::ReadFault(format!(
                "DMA ring overflowed, {lost} samples lost"
            )));
        }
        Ok(backlog)
    }

    fn next_entry(&mut self) -> RawSample {
        let index = self.produced;
        self.produced += 1;
        let t = index as f64 / self.sample_rate_hz;
        let s = &self.settings;
        let noise = if s.noise_mv > 0.0 {
            f64::from(self.rng.gen_range(-s.noise_mv..=s.noise_mv))
        } else {
            0.0
        };
        let mv = f64::from(s.dc_offset_mv)
            + f64::from(s.amplitude_mv) * (TAU * f64::from(s.frequency_hz) * t).sin()
            + noise;
        let code = self.calibration.millivolts_to_raw(mv);
        let foreign = s.foreign_channel_every > 0
            && (index as usize) % s.foreign_channel_every == s.foreign_channel_every - 1;
        let channel = if foreign {
            self.channel.wrapping_add(1)
        } else {
            self.channel
        };
        RawSample { channel, code }
    }
}

impl SampleSource for SimulatedSource {
    fn read_block(
        &mut self,
        buf: &mut [RawSample],
        timeout: Duration,
    ) -> Result<usize, SenseError> {
        let want = buf.len() as u64;
        let deadline = Instant::now() + timeout;
        loop {
            let ready = self.ready()?;
            let now = Instant::now();
            if ready >= want || now >= deadline {
                break;
            }
            let missing = (want - ready) as f64 / self.sample_rate_hz;
            thread::sleep(Duration::from_secs_f64(missing).min(deadline - now));
        }
        let take = self.ready()?.min(want) as usize;
        if take == 0 {
            return Err(SenseError::ReadTimeout);
        }
        for slot in &mut buf[..take] {
            *slot = self.next_entry();
        }
        Ok(take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn manual_source_splits_long_blocks() {
        let mut source = ManualSource::new(vec![Ok(tagged(4, 0..10)), Err(SenseError::ReadTimeout)]);
        let mut buf = [RawSample::default(); 4];
        assert_eq!(source.read_block(&mut buf, Duration::ZERO).unwrap(), 4);
        assert_eq!(buf[3].code, 3);
        assert_eq!(source.read_block(&mut buf, Duration::ZERO).unwrap(), 4);
        assert_eq!(source.read_block(&mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(buf[1].code, 9);
        assert!(matches!(
            source.read_block(&mut buf, Duration::ZERO),
            Err(SenseError::ReadTimeout)
        ));
        // exhausted script keeps timing out
        assert!(source.read_block(&mut buf, Duration::ZERO).is_err());
        assert_eq!(source.remaining(), 0);
    }
    #[test]
    fn simulated_source_paces_and_tags() {
        let settings = SimulationConfig {
            foreign_channel_every: 4,
            noise_mv: 0.0,
            ..SimulationConfig::default()
        };
        let calibration = LinearCalibration::new(3100.0 / 4095.0, 0.0);
        let mut source = SimulatedSource::new(4, 10_000, 64, calibration, settings).unwrap();
        let mut buf = [RawSample::default(); 64];
        let started = Instant::now();
        let n = source.read_block(&mut buf, Duration::from_millis(500)).unwrap();
        assert_eq!(n, 64);
        // 64 samples at 10 kHz cannot arrive faster than 6.4 ms
        assert!(started.elapsed() >= Duration::from_millis(6));
        assert_eq!(buf.iter().filter(|s| s.channel != 4).count(), 16);
        assert!(buf.iter().all(|s| s.code <= ADC_MAX_CODE));
    }
    #[test]
    fn simulated_source_reports_overflow_once() {
        let calibration = LinearCalibration::new(1.0, 0.0);
        // ring of 16 * 8 = 128 entries at 10 kHz fills in 12.8 ms
        let mut source =
            SimulatedSource::new(4, 10_000, 8, calibration, SimulationConfig::default()).unwrap();
        thread::sleep(Duration::from_millis(40));
        let mut buf = [RawSample::default(); 8];
        assert!(matches!(
            source.read_block(&mut buf, Duration::from_millis(10)),
            Err(SenseError::ReadFault(_))
        ));
        assert_eq!(source.read_block(&mut buf, Duration::from_millis(10)).unwrap(), 8);
    }
    #[test]
    fn simulated_source_times_out_when_starved() {
        let calibration = LinearCalibration::new(1.0, 0.0);
        let mut source =
            SimulatedSource::new(4, 1, 8, calibration, SimulationConfig::default()).unwrap();
        let mut buf = [RawSample::default(); 8];
        // one sample per second: nothing is due after 1 ms
        assert!(matches!(
            source.read_block(&mut buf, Duration::from_millis(1)),
            Err(SenseError::ReadTimeout)
        ));
    }
}
