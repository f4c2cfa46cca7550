//! Frame capture worker.
//!
//! Runs the capture command on the device and turns its compressed
//! stdout into a stream of [`FrameBuffer`]s:
//!
//! ```text
//! remote stdout → StreamDecompressor → FrameAssembler → StreamEvent::Item(frame)
//! ```
//!
//! The loop runs on a dedicated blocking worker. Frames cross to the
//! subscriber through an unbounded channel, so the worker never waits for
//! a frame to be consumed. Statistics are published through a `watch`
//! channel.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::assembler::FrameAssembler;
use crate::command::CaptureCommand;
use crate::decompress::{Compression, StreamDecompressor, classify_empty_stream};
use crate::error::MirrorError;
use crate::remote::{ProcessHandle, RemoteShell};
use crate::types::{FrameBuffer, FrameStats, PixelFormat, StreamEvent};

/// Frames between two fps estimates.
const FPS_WINDOW: u64 = 10;

// ── CaptureOptions ───────────────────────────────────────────────

/// Local decoding parameters for a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Format produced by the remote compression filter.
    pub compression: Compression,
    /// How emitted frames should be interpreted.
    pub pixel_format: PixelFormat,
    /// Bytes in one frame.
    pub window_bytes: usize,
}

impl CaptureOptions {
    /// Options for frames of `pixel_format`, sized to match.
    pub fn for_format(compression: Compression, pixel_format: PixelFormat) -> Self {
        Self {
            compression,
            pixel_format,
            window_bytes: pixel_format.window_bytes(),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::for_format(Compression::Lz4, PixelFormat::Gray8)
    }
}

// ── FpsMeter ─────────────────────────────────────────────────────

/// Running frame statistics.
#[derive(Debug)]
struct FpsMeter {
    stats: FrameStats,
    window_start: Instant,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            stats: FrameStats::default(),
            window_start: Instant::now(),
        }
    }

    fn record_bytes(&mut self, n: usize) {
        self.stats.total_bytes += n as u64;
    }

    fn record_frame(&mut self) {
        self.stats.total_frames += 1;
        if self.stats.total_frames % FPS_WINDOW == 0 {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                self.stats.fps = FPS_WINDOW as f64 / elapsed;
            }
            self.window_start = Instant::now();
            debug!(
                "frame {} | fps {:.3}",
                self.stats.total_frames, self.stats.fps
            );
        }
    }
}

// ── Pump ─────────────────────────────────────────────────────────

/// How a capture loop ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The stop flag was observed.
    Stopped,
    /// The subscriber dropped its receiver.
    Unsubscribed,
    /// The compressed stream reached its end.
    Finished,
}

/// Drive `source` through decompression and frame assembly.
///
/// The `running` flag is polled once per decompressed chunk, after every
/// frame already complete in that chunk has been emitted. `emit` returns
/// `false` when the subscriber is gone.
///
/// Returns `Err(MirrorError::NoData)` when the stream closed before
/// producing anything; the caller resolves that with the exit status.
pub fn pump_frames<R, F>(
    source: R,
    options: &CaptureOptions,
    running: &AtomicBool,
    stats: &watch::Sender<FrameStats>,
    mut emit: F,
) -> Result<CaptureEnd, MirrorError>
where
    R: Read + Send + 'static,
    F: FnMut(FrameBuffer) -> bool,
{
    let decompressor = StreamDecompressor::new(source, options.compression)?;
    let mut assembler = FrameAssembler::new(options.window_bytes);
    let mut meter = FpsMeter::new();

    for chunk in decompressor {
        let chunk = chunk?;
        meter.record_bytes(chunk.len());
        assembler.push(&chunk);

        let mut emitted = false;
        for data in assembler.drain() {
            meter.record_frame();
            emitted = true;
            if !emit(FrameBuffer::new(data, options.pixel_format)) {
                return Ok(CaptureEnd::Unsubscribed);
            }
        }
        if emitted {
            let _ = stats.send(meter.stats.clone());
        }

        if !running.load(Ordering::SeqCst) {
            debug!("stopping framebuffer worker");
            return Ok(CaptureEnd::Stopped);
        }
    }

    Ok(CaptureEnd::Finished)
}

// ── FrameCapture ─────────────────────────────────────────────────

/// Frame capture session: one remote command, one worker.
pub struct FrameCapture {
    shell: Arc<dyn RemoteShell>,
    command: CaptureCommand,
    options: CaptureOptions,
}

impl FrameCapture {
    pub fn new(shell: Arc<dyn RemoteShell>, command: CaptureCommand, options: CaptureOptions) -> Self {
        Self {
            shell,
            command,
            options,
        }
    }

    pub fn command(&self) -> &CaptureCommand {
        &self.command
    }

    /// Issue the capture command and start the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> Result<CaptureHandle, MirrorError> {
        info!("executing remote command: {}", self.command);
        let mut process = self.shell.exec(self.command.as_str())?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| MirrorError::Other("capture command has no stdout".into()))?;
        let stderr = process.stderr.take();
        let control = process.handle();

        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());

        let worker = CaptureWorker {
            options: self.options,
            running: Arc::clone(&running),
            control: control.clone(),
            stderr,
            events: event_tx,
            stats: stats_tx,
        };
        let join = tokio::task::spawn_blocking(move || worker.run(stdout));

        Ok(CaptureHandle {
            events: event_rx,
            stats: stats_rx,
            running,
            control,
            join,
        })
    }
}

/// State moved onto the blocking worker.
struct CaptureWorker {
    options: CaptureOptions,
    running: Arc<AtomicBool>,
    control: ProcessHandle,
    stderr: Option<Box<dyn Read + Send>>,
    events: mpsc::UnboundedSender<StreamEvent<FrameBuffer>>,
    stats: watch::Sender<FrameStats>,
}

impl CaptureWorker {
    fn run(mut self, stdout: Box<dyn Read + Send>) {
        let events = self.events.clone();
        let result = pump_frames(stdout, &self.options, &self.running, &self.stats, |frame| {
            events.send(StreamEvent::Item(frame)).is_ok()
        });

        let fatal = match result {
            Ok(end) => {
                debug!("capture loop ended: {end:?}");
                None
            }
            Err(e) if !self.running.load(Ordering::SeqCst) => {
                debug!("capture stream closed after stop: {e}");
                None
            }
            Err(MirrorError::NoData) => self.resolve_empty_stream().err(),
            Err(e) => {
                error!("capture failed: {e}");
                Some(e)
            }
        };

        if let Some(e) = fatal {
            let _ = self.events.send(StreamEvent::Fatal(e));
        }
        self.control.kill();
    }

    fn resolve_empty_stream(&mut self) -> Result<(), MirrorError> {
        let mut stderr = String::new();
        if let Some(mut err) = self.stderr.take() {
            let mut raw = Vec::new();
            if let Err(e) = err.read_to_end(&mut raw) {
                debug!("could not read remote stderr: {e}");
            }
            stderr = String::from_utf8_lossy(&raw).into_owned();
        }
        let exit_code = self.control.wait()?;
        classify_empty_stream(exit_code, &stderr)
    }
}

// ── CaptureHandle ────────────────────────────────────────────────

/// Subscriber side of a running capture.
pub struct CaptureHandle {
    events: mpsc::UnboundedReceiver<StreamEvent<FrameBuffer>>,
    stats: watch::Receiver<FrameStats>,
    running: Arc<AtomicBool>,
    control: ProcessHandle,
    join: JoinHandle<()>,
}

impl CaptureHandle {
    /// Next frame or terminal error; `None` once the stream is over.
    pub async fn recv(&mut self) -> Option<StreamEvent<FrameBuffer>> {
        self.events.recv().await
    }

    /// Obtain a `watch::Receiver` for capture statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats.clone()
    }

    /// Whether the worker has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop and terminate the remote command.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.control.kill();
    }

    /// Wait for the worker to exit.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("capture worker panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn lz4(data: &[u8]) -> Vec<u8> {
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn options(window_bytes: usize) -> CaptureOptions {
        CaptureOptions {
            window_bytes,
            ..CaptureOptions::default()
        }
    }

    #[test]
    fn pump_emits_frames_in_order() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
        let running = AtomicBool::new(true);
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
        let mut frames = Vec::new();

        let end = pump_frames(Cursor::new(lz4(&data)), &options(1000), &running, &stats_tx, |f| {
            frames.push(f);
            true
        })
        .unwrap();

        assert_eq!(end, CaptureEnd::Finished);
        assert_eq!(frames.len(), 3);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(&f.data[..], &data[i * 1000..(i + 1) * 1000]);
        }
        let stats = stats_rx.borrow().clone();
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.total_bytes, 3000);
    }

    #[test]
    fn pump_stops_after_flushing_available_frames() {
        let data = vec![9u8; 4000];
        let running = AtomicBool::new(false);
        let (stats_tx, _stats_rx) = watch::channel(FrameStats::default());
        let mut count = 0;

        let end = pump_frames(Cursor::new(lz4(&data)), &options(1000), &running, &stats_tx, |_| {
            count += 1;
            true
        })
        .unwrap();

        // The first chunk holds all four frames; all of them go out before
        // the flag is checked.
        assert_eq!(end, CaptureEnd::Stopped);
        assert_eq!(count, 4);
    }

    #[test]
    fn pump_reports_unsubscribe() {
        let data = vec![1u8; 2000];
        let running = AtomicBool::new(true);
        let (stats_tx, _stats_rx) = watch::channel(FrameStats::default());

        let end = pump_frames(Cursor::new(lz4(&data)), &options(1000), &running, &stats_tx, |_| false)
            .unwrap();
        assert_eq!(end, CaptureEnd::Unsubscribed);
    }

    #[test]
    fn pump_on_empty_stream_is_no_data() {
        let running = AtomicBool::new(true);
        let (stats_tx, _stats_rx) = watch::channel(FrameStats::default());
        let err = pump_frames(Cursor::new(Vec::new()), &options(10), &running, &stats_tx, |_| true)
            .unwrap_err();
        assert!(matches!(err, MirrorError::NoData));
    }

    #[test]
    fn options_size_frames_by_format() {
        assert_eq!(CaptureOptions::default().window_bytes, crate::profile::WINDOW_BYTES);
        let wide = CaptureOptions::for_format(Compression::Zstd, PixelFormat::Gray16);
        assert_eq!(wide.window_bytes, 2 * crate::profile::WINDOW_BYTES);
    }

    #[test]
    fn fps_meter_counts() {
        let mut meter = FpsMeter::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        for _ in 0..FPS_WINDOW {
            meter.record_frame();
        }
        assert_eq!(meter.stats.total_frames, FPS_WINDOW);
        assert!(meter.stats.fps > 0.0);
    }
}
