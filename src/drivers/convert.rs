use crate::config::CalibrationConfig;
use crate::drivers::source::{RawSample, ADC_MAX_CODE};
use crate::drivers::SenseError;

/// Raw ADC code to millivolts. Assumed valid once constructed; never re-checked per call.
pub trait Calibration {
    fn raw_to_millivolts(&self, raw: u16) -> u32;
}

/// `mV = raw * scale + offset`, clamped at zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearCalibration {
    scale_mv_per_count: f32,
    offset_mv: f32,
}

impl LinearCalibration {
    pub fn new(scale_mv_per_count: f32, offset_mv: f32) -> Self {
        Self {
            scale_mv_per_count,
            offset_mv,
        }
    }

    /// Inverse transform, used to synthesise codes for a target voltage.
    pub fn millivolts_to_raw(&self, millivolts: f64) -> u16 {
        let code = (millivolts - f64::from(self.offset_mv)) / f64::from(self.scale_mv_per_count);
        code.round().clamp(0.0, f64::from(ADC_MAX_CODE)) as u16
    }
}

impl From<&CalibrationConfig> for LinearCalibration {
    fn from(cfg: &CalibrationConfig) -> Self {
        Self::new(cfg.scale_mv_per_count, cfg.offset_mv)
    }
}

impl Calibration for LinearCalibration {
    fn raw_to_millivolts(&self, raw: u16) -> u32 {
        let mv = f32::from(raw) * self.scale_mv_per_count + self.offset_mv;
        mv.round().max(0.0) as u32
    }
}

/// Turns raw blocks into calibrated samples plus the block's reference level.
pub struct SampleConverter<C: Calibration> {
    channel: u8,
    calibration: C,
}

impl<C: Calibration> SampleConverter<C> {
    pub fn new(channel: u8, calibration: C) -> Self {
        Self {
            channel,
            calibration,
        }
    }

    /// Writes one entry per raw code into `out` (`None` for other channels) and
    /// returns the mean of the valid millivolt values.
    pub fn convert(
        &self,
        raw: &[RawSample],
        out: &mut Vec<Option<u32>>,
    ) -> Result<f64, SenseError> {
        out.clear();
        let mut sum = 0.0f64;
        let mut valid = 0usize;
        for sample in raw {
            if sample.channel == self.channel {
                let mv = self.calibration.raw_to_millivolts(sample.code);
                sum += f64::from(mv);
                valid += 1;
                out.push(Some(mv));
            } else {
                out.push(None);
            }
        }
        if valid == 0 {
            return Err(SenseError::NoValidSamples {
                channel: self.channel,
                block_len: raw.len(),
            });
        }
        Ok(sum / valid as f64)
    }
}
