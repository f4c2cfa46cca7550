//! Shared types for the capture and pointer pipelines.
//!
//! These are the items delivered to subscribers. They carry no
//! references back into the workers that produced them.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::profile;

// ── PixelFormat ──────────────────────────────────────────────────

/// How a consumer should interpret the bytes of a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Single-channel grayscale, 8 bits per sample.
    #[default]
    Gray8,
    /// Single-channel grayscale, 16 bits per sample.
    Gray16,
}

impl PixelFormat {
    /// Bits per sample for this format.
    pub const fn depth(self) -> u32 {
        match self {
            PixelFormat::Gray8 => 8,
            PixelFormat::Gray16 => 16,
        }
    }

    /// Bytes per pixel in remote memory.
    pub const fn bytes_per_pixel(self) -> usize {
        self.depth() as usize / 8
    }

    /// Size of one full frame in this format.
    pub const fn window_bytes(self) -> usize {
        profile::WIDTH as usize * profile::HEIGHT as usize * self.bytes_per_pixel()
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// One complete frame sliced from the decompressed stream.
///
/// `data` is exactly one window long, row-major without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Interpretation requested by the consumer.
    pub format: PixelFormat,
    /// Raw pixel bytes.
    pub data: Bytes,
}

impl FrameBuffer {
    /// Wrap a window-sized slice using the fixed profile geometry.
    pub fn new(data: Bytes, format: PixelFormat) -> Self {
        Self {
            width: profile::WIDTH,
            height: profile::HEIGHT,
            format,
            data,
        }
    }

    /// Bytes in one row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Returns a row slice.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of bounds.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

// ── PointerEvent ─────────────────────────────────────────────────

/// A discrete stylus gesture decoded from the digitizer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    /// Both axes received fresh values.
    Move { x: i32, y: i32 },
    /// Pressure rose above the threshold.
    Press,
    /// Pressure fell to or below the threshold.
    Lift,
    /// The stylus entered sensing range.
    Near,
    /// The stylus left sensing range.
    Far,
}

// ── StreamEvent ──────────────────────────────────────────────────

/// What a worker delivers to its subscriber.
///
/// A stream is a (possibly empty) run of `Item`s, optionally followed by
/// exactly one `Fatal`. Nothing follows a `Fatal`.
#[derive(Debug)]
pub enum StreamEvent<T> {
    Item(T),
    Fatal(MirrorError),
}

// ── FrameStats ───────────────────────────────────────────────────

/// Capture statistics published alongside the frame stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Smoothed frames per second over the last few frames.
    pub fps: f64,
    /// Total frames emitted since start.
    pub total_frames: u64,
    /// Total decompressed bytes consumed.
    pub total_bytes: u64,
}
