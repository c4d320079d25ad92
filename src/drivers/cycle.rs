//! Rising-edge zero-crossing detector.
//!
//! A sample is `Above` when it is at or over the block reference and `Below` otherwise.
//! A rising edge (Below -> Above) closes the cycle that started at the previous rising
//! edge; the first rising edge after a reset only arms the detector. The sample that
//! forms the edge opens the next cycle.
use log::trace;

use crate::types::CompletedCycle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Above,
    Below,
}

/// Running moments of one in-progress cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct CycleAccumulator {
    samples: u32,
    sum: f64,
    sum_sq: f64,
}

impl CycleAccumulator {
    pub fn add(&mut self, mv: f64) {
        self.samples += 1;
        self.sum += mv;
        self.sum_sq += mv * mv;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Period/RMS of the accumulated span, or `None` when it is too short to be a cycle.
    pub fn finish(&self, sample_rate_hz: f32) -> Option<CompletedCycle> {
        if self.samples <= 1 {
            return None;
        }
        let n = f64::from(self.samples);
        let period_s = n / f64::from(sample_rate_hz);
        Some(CompletedCycle {
            frequency_hz: (1.0 / period_s) as f32,
            rms_mv: ac_rms(self.sum, self.sum_sq, n) as f32,
        })
    }
}

/// `sqrt(E[x²] - E[x]²)`, clamped at zero against cancellation near DC.
pub fn ac_rms(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CycleEvent {
    Completed(CompletedCycle),
    /// A cycle closed with too few samples to be a real period.
    Rejected { samples: u32 },
}

pub struct CycleDetector {
    sample_rate_hz: f32,
    last_level: Option<Level>,
    armed: bool,
    current: CycleAccumulator,
}

impl CycleDetector {
    pub fn new(sample_rate_hz: f32) -> Self {
        Self {
            sample_rate_hz,
            last_level: None,
            armed: false,
            current: CycleAccumulator::default(),
        }
    }

    /// Forgets the level history and disarms; the next rising edge only re-arms.
    pub fn reset(&mut self) {
        self.last_level = None;
        self.armed = false;
        self.current = CycleAccumulator::default();
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn push(&mut self, mv: f64, reference: f64) -> Option<CycleEvent> {
        let level = if mv >= reference {
            Level::Above
        } else {
            Level::Below
        };
        let rising = self.last_level == Some(Level::Below) && level == Level::Above;
        self.last_level = Some(level);

        let mut event = None;
        if rising {
            if self.armed {
                event = Some(match self.current.finish(self.sample_rate_hz) {
                    Some(cycle) => {
                        trace!(
                            "cycle closed: {} samples, {:.2} Hz, {:.1} mV",
                            self.current.samples(),
                            cycle.frequency_hz,
                            cycle.rms_mv
                        );
                        CycleEvent::Completed(cycle)
                    }
                    None => CycleEvent::Rejected {
                        samples: self.current.samples(),
                    },
                });
            }
            self.armed = true;
            self.current = CycleAccumulator::default();
        }
        if self.armed {
            self.current.add(mv);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{PI, SQRT_2};

    // half-sample phase keeps crossings off exact sample instants
    fn sine(amplitude: f64, offset: f64, samples_per_cycle: usize, cycles: usize) -> Vec<f64> {
        (0..samples_per_cycle * cycles)
            .map(|i| {
                let phase = 2.0 * PI * (i as f64 + 0.5) / samples_per_cycle as f64;
                offset + amplitude * phase.sin()
            })
            .collect()
    }

    fn run(detector: &mut CycleDetector, samples: &[f64], reference: f64) -> Vec<CycleEvent> {
        samples
            .iter()
            .filter_map(|&mv| detector.push(mv, reference))
            .collect()
    }

    #[test]
    fn sine_at_100_samples_per_cycle_reads_10_hz() {
        let amplitude = 1000.0;
        let samples = sine(amplitude, 1500.0, 100, 6);
        let mut detector = CycleDetector::new(1000.0);
        // start just below the reference so the very first sample is a rising edge
        detector.push(1400.0, 1500.0);
        let events = run(&mut detector, &samples, 1500.0);
        assert_eq!(events.len(), 5);
        for event in events {
            let CycleEvent::Completed(cycle) = event else {
                panic!("unexpected {event:?}");
            };
            assert!((cycle.frequency_hz - 10.0).abs() < 1e-3);
            assert!((f64::from(cycle.rms_mv) - amplitude / SQRT_2).abs() < 1.0);
        }
    }

    #[test]
    fn first_rising_edge_only_arms() {
        let mut detector = CycleDetector::new(1000.0);
        assert_eq!(detector.push(0.0, 5.0), None);
        assert!(!detector.is_armed());
        assert_eq!(detector.push(10.0, 5.0), None);
        assert!(detector.is_armed());
        // falling edge never closes a cycle
        assert_eq!(detector.push(0.0, 5.0), None);
        assert!(matches!(detector.push(10.0, 5.0), Some(CycleEvent::Completed(_))));
    }

    #[test]
    fn constant_input_never_crosses() {
        let mut detector = CycleDetector::new(1000.0);
        let events = run(&mut detector, &[1200.0; 5000], 1200.0);
        assert!(events.is_empty());
        assert!(!detector.is_armed());
    }

    #[test]
    fn reset_disarms() {
        let mut detector = CycleDetector::new(1000.0);
        run(&mut detector, &sine(100.0, 0.0, 20, 2), 0.0);
        assert!(detector.is_armed());
        detector.reset();
        assert!(!detector.is_armed());
        // a fresh cycle after reset needs two rising edges again
        let events = run(&mut detector, &sine(100.0, 0.0, 20, 1), 0.0);
        assert!(events.is_empty());
    }

    #[test]
    fn single_sample_span_is_rejected() {
        let mut acc = CycleAccumulator::default();
        assert!(acc.finish(1000.0).is_none());
        acc.add(3.0);
        assert!(acc.finish(1000.0).is_none());
        acc.add(5.0);
        let cycle = acc.finish(1000.0).unwrap();
        assert_eq!(cycle.frequency_hz, 500.0);
        assert_eq!(cycle.rms_mv, 1.0);
    }

    #[test]
    fn rms_identity_holds() {
        let data = [1.0, 7.0, -3.0, 12.5, 4.0, 4.0, -8.25];
        let n = data.len() as f64;
        let sum: f64 = data.iter().sum();
        let sum_sq: f64 = data.iter().map(|v| v * v).sum();
        let rms = ac_rms(sum, sum_sq, n);
        let mean = sum / n;
        assert!((rms * rms + mean * mean - sum_sq / n).abs() < 1e-9);
        // flat input cancels to zero instead of going negative
        assert_eq!(ac_rms(3.0 * 1e8, 3.0 * 1e16, 3.0), 0.0);
        assert_eq!(ac_rms(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn frequency_agrees_with_fft_peak() {
        use rustfft::{num_complex::Complex32, FftPlanner};
        let sample_rate = 4096.0;
        let samples_per_cycle = 64;
        let samples = sine(500.0, 0.0, samples_per_cycle, 64);
        let mut detector = CycleDetector::new(sample_rate);
        let freqs: Vec<f32> = run(&mut detector, &samples, 0.0)
            .into_iter()
            .filter_map(|e| match e {
                CycleEvent::Completed(c) => Some(c.frequency_hz),
                CycleEvent::Rejected { .. } => None,
            })
            .collect();
        let zero_cross = freqs.iter().sum::<f32>() / freqs.len() as f32;

        let fft_size = samples.len();
        let mut buffer: Vec<Complex32> = samples
            .iter()
            .map(|&v| Complex32::new(v as f32, 0.0))
            .collect();
        FftPlanner::<f32>::new()
            .plan_fft_forward(fft_size)
            .process(&mut buffer);
        let peak_bin = buffer[..fft_size / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(k, _)| k)
            .unwrap();
        let fft_freq = peak_bin as f32 * sample_rate / fft_size as f32;
        assert_eq!(fft_freq, 64.0);
        assert!((zero_cross - fft_freq).abs() < 0.5);
    }
}
