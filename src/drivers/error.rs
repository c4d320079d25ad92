use thiserror::Error;
#[derive(Debug, Error)]
pub enum SenseError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("ADC read timed out")]
    ReadTimeout,
    #[error("ADC read failed: {0}")]
    ReadFault(String),
    #[error("no samples from channel {channel} in a block of {block_len}")]
    NoValidSamples { channel: u8, block_len: usize },
    #[error("cycle closed after {samples} sample(s)")]
    ShortCycle { samples: u32 },
    #[cfg(test)]
    #[error("response must be {expected} bytes, got {actual}")]
    ResponseLength { expected: usize, actual: usize },
    #[error("wire I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
impl SenseError {
    /// Faults that only cost the current batch; the loop keeps going.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SenseError::ReadTimeout
                | SenseError::ReadFault(_)
                | SenseError::NoValidSamples { .. }
                | SenseError::ShortCycle { .. }
        )
    }
}
