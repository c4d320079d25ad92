use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::drivers::source::{RawSample, SampleSource};

/// How the gap between two batch starts was filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingOutcome {
    /// Batch finished early; the rest of the interval was spent draining the source.
    Drained { idle: Duration, reads: u32, discarded: u64 },
    /// Batch took at least the whole interval; the next one starts immediately.
    Overrun { elapsed: Duration },
}

/// Keeps batch starts roughly `interval` apart without letting the peripheral
/// backlog overflow while idle.
pub struct Pacer {
    interval: Duration,
    drain_poll: Duration,
    batch_started: Instant,
}

impl Pacer {
    pub fn new(interval: Duration, drain_poll: Duration) -> Self {
        Self {
            interval,
            drain_poll,
            batch_started: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start_batch(&mut self) {
        self.batch_started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.batch_started.elapsed()
    }

    /// Idles until the interval since `start_batch` has passed, issuing
    /// short-timeout reads and throwing their contents away.
    pub fn finish_batch<S: SampleSource>(
        &self,
        source: &mut S,
        scratch: &mut [RawSample],
    ) -> PacingOutcome {
        let elapsed = self.elapsed();
        if elapsed >= self.interval {
            return PacingOutcome::Overrun { elapsed };
        }
        let deadline = self.batch_started + self.interval;
        let idle_started = Instant::now();
        let (mut reads, mut discarded) = (0u32, 0u64);
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let budget = self.drain_poll.min(deadline - now);
            reads += 1;
            match source.read_block(scratch, budget) {
                Ok(n) => discarded += n as u64,
                // nothing pending; a source that fails fast must not spin
                Err(_) => thread::sleep(budget),
            }
        }
        let idle = idle_started.elapsed();
        trace!("drained {discarded} entries in {reads} reads over {idle:?}");
        PacingOutcome::Drained {
            idle,
            reads,
            discarded,
        }
    }
}
