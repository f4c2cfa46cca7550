//! Remote command lines for the capture and pointer streams.
//!
//! # Capture pipeline
//!
//! ```text
//! [sleep N;] while dd if=/proc/<pid>/mem bs=<page> skip=<start> count=<len> 2>/dev/null \
//!              | tail -c+<offset+1> | <extractor> -c <window>; do true; done | <decompressor>
//! ```
//!
//! The loop re-reads the same window for as long as the read succeeds, so
//! successive iterations observe successive frames. Each iteration emits
//! exactly `window_bytes` bytes; the concatenation is compressed once.
//!
//! # Pointer stream
//!
//! ```text
//! cat <device> & { read ; kill %1; }
//! ```
//!
//! Writing a line to the command's stdin kills the background `cat`,
//! which closes the stream from the remote side.

use std::fmt;

use crate::profile;
use crate::window::MemoryWindow;

// ── CaptureCommand ───────────────────────────────────────────────

/// The remote shell pipeline that streams compressed frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand(String);

impl CaptureCommand {
    /// Start building a capture command for `window` inside process `pid`.
    pub fn builder(window: MemoryWindow, pid: u32) -> CaptureCommandBuilder {
        CaptureCommandBuilder::new(window, pid)
    }

    /// The full command line.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── CaptureCommandBuilder ────────────────────────────────────────

/// Builder for [`CaptureCommand`].
///
/// Tool paths are inserted verbatim, so they may carry extra flags.
#[derive(Debug, Clone)]
pub struct CaptureCommandBuilder {
    window: MemoryWindow,
    pid: u32,
    decompressor_path: Option<String>,
    extractor_path: Option<String>,
    startup_delay_secs: Option<u32>,
}

impl CaptureCommandBuilder {
    pub fn new(window: MemoryWindow, pid: u32) -> Self {
        Self {
            window,
            pid,
            decompressor_path: None,
            extractor_path: None,
            startup_delay_secs: None,
        }
    }

    /// Remote path of the stream compression filter.
    pub fn with_decompressor(mut self, path: impl Into<String>) -> Self {
        self.decompressor_path = Some(path.into());
        self
    }

    /// Remote path of the byte-count extractor.
    pub fn with_extractor(mut self, path: impl Into<String>) -> Self {
        self.extractor_path = Some(path.into());
        self
    }

    /// Seconds to sleep on the remote side before the first read.
    pub fn with_startup_delay(mut self, secs: u32) -> Self {
        self.startup_delay_secs = Some(secs);
        self
    }

    pub fn build(self) -> CaptureCommand {
        let w = &self.window;
        let decompressor = self
            .decompressor_path
            .as_deref()
            .unwrap_or(profile::DEFAULT_DECOMPRESSOR_PATH);
        let extractor = self
            .extractor_path
            .as_deref()
            .unwrap_or(profile::DEFAULT_EXTRACTOR_PATH);
        let delay = match self.startup_delay_secs {
            Some(secs) if secs > 0 => format!("sleep {secs}; "),
            _ => String::new(),
        };

        // `tail -c+K` starts at byte K (1-based).
        CaptureCommand(format!(
            "{delay}while dd if=/proc/{pid}/mem bs={page} skip={start} count={count} 2>/dev/null \
             | tail -c+{tail} | {extractor} -c {bytes}; do true; done | {decompressor}",
            pid = self.pid,
            page = w.page_size,
            start = w.start_block,
            count = w.length_blocks,
            tail = w.offset_in_page + 1,
            bytes = w.window_bytes,
        ))
    }
}

// ── PointerCommand ───────────────────────────────────────────────

/// Remote command that streams raw records from the stylus device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerCommand(String);

impl PointerCommand {
    pub fn new(device: &str) -> Self {
        Self(format!("cat {device} & {{ read ; kill %1; }}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PointerCommand {
    fn default() -> Self {
        Self::new(profile::DEFAULT_INPUT_DEVICE)
    }
}

impl fmt::Display for PointerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
