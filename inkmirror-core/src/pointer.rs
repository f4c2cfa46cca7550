//! Stylus gesture decoding from raw input-event records.
//!
//! # Record layout
//!
//! ```text
//! offset  size  field
//!      0     4  seconds       (ignored)
//!      4     4  microseconds  (ignored)
//!      8     2  type
//!     10     2  code
//!     12     4  value (signed)
//! ```
//!
//! All fields are little-endian, matching the device.

use std::io::{self, Read};

use tracing::{debug, error, trace};

use crate::profile::{
    ABS_STYLUS_PRESSURE, ABS_STYLUS_X, ABS_STYLUS_Y, DEFAULT_PRESSURE_THRESHOLD, EV_ABS, EV_KEY,
    EVENT_RECORD_SIZE, KEY_STYLUS_PROXIMITY,
};
use crate::types::PointerEvent;

// ── EventRecord ──────────────────────────────────────────────────

/// One fixed-size record from the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl EventRecord {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    /// Parse a raw record. The timestamp fields are skipped.
    pub fn parse(raw: &[u8; EVENT_RECORD_SIZE]) -> Self {
        Self {
            event_type: u16::from_le_bytes([raw[8], raw[9]]),
            code: u16::from_le_bytes([raw[10], raw[11]]),
            value: i32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        }
    }

    /// Encode with zeroed timestamps.
    pub fn to_bytes(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut raw = [0u8; EVENT_RECORD_SIZE];
        raw[8..10].copy_from_slice(&self.event_type.to_le_bytes());
        raw[10..12].copy_from_slice(&self.code.to_le_bytes());
        raw[12..16].copy_from_slice(&self.value.to_le_bytes());
        raw
    }
}

// ── PointerState ─────────────────────────────────────────────────

/// Whether the stylus is touching the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contact {
    #[default]
    Lifted,
    Pressed,
}

/// Decoder state between records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerState {
    pub contact: Contact,
    pub last_x: Option<i32>,
    pub last_y: Option<i32>,
    pub have_new_x: bool,
    pub have_new_y: bool,
}

// ── PointerDecoder ───────────────────────────────────────────────

/// State machine turning event records into [`PointerEvent`]s.
#[derive(Debug, Clone)]
pub struct PointerDecoder {
    threshold: i32,
    state: PointerState,
}

impl PointerDecoder {
    /// Create a decoder that reports contact above `threshold` pressure.
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold,
            state: PointerState::default(),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn state(&self) -> &PointerState {
        &self.state
    }

    /// Forget all contact and coordinate state.
    pub fn reset(&mut self) {
        self.state = PointerState::default();
    }

    /// Apply one record, handing any resulting events to `emit` in order.
    pub fn process<F>(&mut self, record: EventRecord, mut emit: F)
    where
        F: FnMut(PointerEvent),
    {
        match record.event_type {
            EV_ABS => {
                let s = &mut self.state;
                match record.code {
                    ABS_STYLUS_X => {
                        s.last_x = Some(record.value);
                        s.have_new_x = true;
                    }
                    ABS_STYLUS_Y => {
                        s.last_y = Some(record.value);
                        s.have_new_y = true;
                    }
                    ABS_STYLUS_PRESSURE => {
                        if record.value > self.threshold {
                            if s.contact == Contact::Lifted {
                                debug!("stylus press ({})", record.value);
                                s.contact = Contact::Pressed;
                                emit(PointerEvent::Press);
                            }
                        } else if s.contact == Contact::Pressed {
                            debug!("stylus lift ({})", record.value);
                            s.contact = Contact::Lifted;
                            emit(PointerEvent::Lift);
                        }
                    }
                    _ => {}
                }

                if s.have_new_x && s.have_new_y {
                    if let (Some(x), Some(y)) = (s.last_x, s.last_y) {
                        emit(PointerEvent::Move { x, y });
                    }
                    s.have_new_x = false;
                    s.have_new_y = false;
                }
            }
            EV_KEY if record.code == KEY_STYLUS_PROXIMITY => {
                if record.value == 0 {
                    emit(PointerEvent::Far);
                } else {
                    emit(PointerEvent::Near);
                }
            }
            _ => trace!(?record, "ignored input record"),
        }
    }

    /// Apply one record and collect the resulting events.
    pub fn feed(&mut self, record: EventRecord) -> Vec<PointerEvent> {
        let mut out = Vec::with_capacity(2);
        self.process(record, |e| out.push(e));
        out
    }
}

impl Default for PointerDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_PRESSURE_THRESHOLD)
    }
}

// ── Read loop ────────────────────────────────────────────────────

/// Decode records from `reader` until the stream ends.
///
/// A short read marks the end of the stream. A read error also ends the
/// loop; it is logged but reported as a normal end, since the two cannot
/// be told apart once the remote side closes the channel. `emit` returns
/// `false` to stop early (the subscriber went away).
///
/// Returns the number of records processed.
pub fn decode_stream<R, F>(mut reader: R, decoder: &mut PointerDecoder, mut emit: F) -> u64
where
    R: Read,
    F: FnMut(PointerEvent) -> bool,
{
    let mut raw = [0u8; EVENT_RECORD_SIZE];
    let mut records = 0u64;
    let mut open = true;

    decoder.reset();
    while open {
        match reader.read_exact(&mut raw) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("pointer stream ended after {records} records");
                break;
            }
            Err(e) => {
                error!("error in pointer stream: {e}");
                break;
            }
        }

        records += 1;
        decoder.process(EventRecord::parse(&raw), |event| {
            if open && !emit(event) {
                open = false;
            }
        });
    }

    records
}
