//! Session startup: metadata discovery and stream launch.
//!
//! The capture command depends on two remote facts: the id of the
//! display process and where the framebuffer is mapped inside it. Both
//! are queried before the capture command is issued. The pointer stream
//! has no such dependency.

use std::sync::Arc;

use tracing::info;

use crate::capture::{CaptureHandle, CaptureOptions, FrameCapture};
use crate::command::{CaptureCommand, PointerCommand};
use crate::decompress::Compression;
use crate::error::MirrorError;
use crate::input::{PointerHandle, PointerStream};
use crate::profile;
use crate::remote::{RemoteShell, run_to_string};
use crate::types::PixelFormat;
use crate::window::{MemoryWindow, parse_map_start};

// ── CaptureSettings ──────────────────────────────────────────────

/// Everything needed to start a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Remote decompression filter; profile default when `None`.
    pub decompressor_path: Option<String>,
    /// Remote extractor; profile default when `None`.
    pub extractor_path: Option<String>,
    /// Seconds to wait on the remote side before the first read.
    pub startup_delay_secs: Option<u32>,
    pub compression: Compression,
    pub pixel_format: PixelFormat,
    /// Name of the process owning the framebuffer.
    pub process_name: String,
    /// Skip process discovery.
    pub pid: Option<u32>,
    /// Skip mapping discovery; address of the first pixel.
    pub base_address: Option<u64>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            decompressor_path: None,
            extractor_path: None,
            startup_delay_secs: None,
            compression: Compression::default(),
            pixel_format: PixelFormat::default(),
            process_name: profile::DISPLAY_PROCESS.into(),
            pid: None,
            base_address: None,
        }
    }
}

// ── Discovery ────────────────────────────────────────────────────

/// Find the id of `process_name` on the device.
pub fn discover_pid(shell: &dyn RemoteShell, process_name: &str) -> Result<u32, MirrorError> {
    let out = run_to_string(shell, &format!("pidof {process_name}"))?;
    let first = out.split_whitespace().next().unwrap_or_default();
    let pid = first
        .parse::<u32>()
        .map_err(|e| MirrorError::Parse(format!("invalid pid {out:?}: {e}")))?;
    info!("process id extracted: {pid}");
    Ok(pid)
}

/// Find the address of the first framebuffer pixel inside process `pid`.
///
/// The pixels live in the mapping that follows the `/dev/fb0` entry,
/// after a small header.
pub fn discover_base_address(shell: &dyn RemoteShell, pid: u32) -> Result<u64, MirrorError> {
    let command = format!("grep -C1 '/dev/fb0' /proc/{pid}/maps | tail -n1 | sed 's/-.*$//'");
    let out = run_to_string(shell, &command)?;
    let start = parse_map_start(&out)?;
    let address = start
        .checked_add(profile::FRAMEBUFFER_HEADER_BYTES)
        .ok_or_else(|| MirrorError::Parse(format!("mapping address {start:#x} out of range")))?;
    info!("memory location extracted: {start:#x}");
    info!("bytes to skip: {address}");
    Ok(address)
}

/// Resolve the window and build the capture command, querying the
/// device for whatever `settings` leaves open.
pub fn prepare_capture(
    shell: &dyn RemoteShell,
    settings: &CaptureSettings,
) -> Result<CaptureCommand, MirrorError> {
    let pid = match settings.pid {
        Some(pid) => pid,
        None => discover_pid(shell, &settings.process_name)?,
    };
    let base_address = match settings.base_address {
        Some(address) => address,
        None => discover_base_address(shell, pid)?,
    };
    let window_bytes = settings.pixel_format.window_bytes() as u64;
    let window = MemoryWindow::resolve(base_address, profile::PAGE_SIZE, window_bytes)?;

    let mut builder = CaptureCommand::builder(window, pid);
    if let Some(path) = &settings.decompressor_path {
        builder = builder.with_decompressor(path.clone());
    }
    if let Some(path) = &settings.extractor_path {
        builder = builder.with_extractor(path.clone());
    }
    if let Some(secs) = settings.startup_delay_secs {
        builder = builder.with_startup_delay(secs);
    }
    Ok(builder.build())
}

// ── Launch ───────────────────────────────────────────────────────

/// Discover, build and start a capture session.
pub fn start_capture(
    shell: Arc<dyn RemoteShell>,
    settings: &CaptureSettings,
) -> Result<CaptureHandle, MirrorError> {
    let command = prepare_capture(shell.as_ref(), settings)?;
    let options = CaptureOptions::for_format(settings.compression, settings.pixel_format);
    FrameCapture::new(shell, command, options).start()
}

/// Start a pointer stream from `device`.
pub fn start_pointer(
    shell: Arc<dyn RemoteShell>,
    device: &str,
    threshold: i32,
) -> Result<PointerHandle, MirrorError> {
    PointerStream::new(shell, PointerCommand::new(device), threshold).start()
}
