//! Fixed 4-byte response: `frequency_hz` then `rms_mv`, each a little-endian u16.
//! Request bytes are never interpreted; any request gets the current store contents.
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::drivers::store::ResultStore;
use crate::drivers::SenseError;
use crate::types::Measurement;

pub const RESPONSE_LEN: usize = 4;

pub fn encode_response(m: Measurement) -> [u8; RESPONSE_LEN] {
    let f = m.frequency_hz.to_le_bytes();
    let r = m.rms_mv.to_le_bytes();
    [f[0], f[1], r[0], r[1]]
}

/// Requester-side decoding of a response frame.
#[cfg(test)]
pub fn decode_response(bytes: &[u8]) -> Result<Measurement, SenseError> {
    let frame: [u8; RESPONSE_LEN] = bytes.try_into().map_err(|_| SenseError::ResponseLength {
        expected: RESPONSE_LEN,
        actual: bytes.len(),
    })?;
    Ok(Measurement {
        frequency_hz: u16::from_le_bytes([frame[0], frame[1]]),
        rms_mv: u16::from_le_bytes([frame[2], frame[3]]),
    })
}

pub struct WireResponder {
    store: Arc<ResultStore>,
}

impl WireResponder {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }

    /// Request handler body: one atomic load, fixed-size output, no allocation.
    pub fn respond(&self) -> [u8; RESPONSE_LEN] {
        encode_response(self.store.latest())
    }

    /// Answers every chunk of request bytes on `port` until the peer closes it.
    /// Read timeouts are idle polls, not errors.
    pub fn serve<P: Read + Write>(&self, port: &mut P) -> Result<u64, SenseError> {
        let mut request = [0u8; 64];
        let mut answered = 0u64;
        loop {
            match port.read(&mut request) {
                Ok(0) => return Ok(answered),
                Ok(n) => {
                    let frame = self.respond();
                    port.write_all(&frame)?;
                    port.flush()?;
                    answered += 1;
                    debug!("answered {n}-byte request with {frame:02x?}");
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Opens `path` and serves requests on it for the life of the process.
pub fn serve_serial(
    responder: &WireResponder,
    path: &str,
    baud_rate: u32,
    poll_timeout: Duration,
) -> Result<u64, SenseError> {
    let mut port = serialport::new(path, baud_rate)
        .timeout(poll_timeout)
        .open()?;
    info!("wire responder listening on {path} at {baud_rate} baud");
    let answered = responder.serve(&mut port);
    if let Err(err) = &answered {
        warn!("wire responder on {path} stopped: {err}");
    }
    answered
}
