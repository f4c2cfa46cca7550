//! Fixed constants for the supported tablet hardware/OS combination.
//!
//! The framebuffer is a single-channel image living inside the address
//! space of the display process, and the stylus digitizer reports
//! standard 16-byte input-event records.

// ── Display ──────────────────────────────────────────────────────

/// Framebuffer width in pixels.
pub const WIDTH: u32 = 1872;

/// Framebuffer height in pixels.
pub const HEIGHT: u32 = 1404;

/// Bytes per pixel as stored in the remote process memory.
pub const BYTES_PER_PIXEL: usize = 1;

/// Size of one full frame in bytes at the default 8-bit depth.
pub const WINDOW_BYTES: usize = WIDTH as usize * HEIGHT as usize * BYTES_PER_PIXEL;

/// Memory page size exposed by the remote block-read primitive.
pub const PAGE_SIZE: u64 = 4096;

/// Bytes between the start of the framebuffer mapping and the first pixel.
pub const FRAMEBUFFER_HEADER_BYTES: u64 = 8;

/// Process that owns the framebuffer mapping.
pub const DISPLAY_PROCESS: &str = "xochitl";

// ── Remote helpers ───────────────────────────────────────────────

/// Default location of the remote decompression helper.
pub const DEFAULT_DECOMPRESSOR_PATH: &str = "$HOME/lz4";

/// Default location of the remote byte-count extraction helper.
pub const DEFAULT_EXTRACTOR_PATH: &str = "$HOME/rmhead";

// ── Digitizer ────────────────────────────────────────────────────

/// Stylus input device on the remote side.
pub const DEFAULT_INPUT_DEVICE: &str = "/dev/input/event0";

/// Pressure above which the stylus counts as touching the surface.
pub const DEFAULT_PRESSURE_THRESHOLD: i32 = 1000;

/// Size of one raw input-event record.
pub const EVENT_RECORD_SIZE: usize = 16;

pub const EV_KEY: u16 = 1;
pub const EV_ABS: u16 = 3;

/// The digitizer is mounted rotated: its Y axis is the screen X axis.
pub const ABS_STYLUS_X: u16 = 1;
pub const ABS_STYLUS_Y: u16 = 0;
pub const ABS_STYLUS_PRESSURE: u16 = 24;

/// `BTN_TOOL_PEN`: reported when the stylus enters or leaves sensing range.
pub const KEY_STYLUS_PROXIMITY: u16 = 320;
