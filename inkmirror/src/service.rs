//! Mirror session runner.
//!
//! Starts the frame capture and the pointer stream on the tablet, logs
//! what they deliver and tears both down on stop, stream end or a fatal
//! capture error.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use inkmirror_core::{
    CaptureHandle, FrameBuffer, FrameStats, MirrorError, PointerEvent, PointerHandle, RemoteShell,
    StreamEvent, start_capture, start_pointer,
};

use crate::config::MirrorConfig;

/// Frames between two progress lines.
const REPORT_EVERY: u64 = 10;

// ── SessionSummary ───────────────────────────────────────────────

/// What a finished session delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub pointer_events: u64,
    /// Last statistics published by the capture worker.
    pub stats: FrameStats,
}

// ── MirrorService ────────────────────────────────────────────────

/// Owns one mirror session against one tablet.
pub struct MirrorService {
    config: MirrorConfig,
    shell: Arc<dyn RemoteShell>,
    pid: Option<u32>,
    base_address: Option<u64>,
    dump_path: Option<PathBuf>,
    running: Arc<AtomicBool>,
}

impl MirrorService {
    pub fn new(config: MirrorConfig, shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            config,
            shell,
            pid: None,
            base_address: None,
            dump_path: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use a known process id instead of asking the device.
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Use a known pixel address instead of reading the process maps.
    pub fn with_base_address(mut self, address: Option<u64>) -> Self {
        self.base_address = address;
        self
    }

    /// Write the last received frame to `path` when the session ends.
    pub fn with_dump_path(mut self, path: Option<PathBuf>) -> Self {
        self.dump_path = path;
        self
    }

    /// Obtain a handle that stops the session when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped or until every enabled stream has ended.
    ///
    /// A fatal capture error stops the pointer stream too and is returned.
    pub async fn run(&self) -> Result<SessionSummary, MirrorError> {
        self.running.store(true, Ordering::SeqCst);

        let mut capture = if self.config.capture.enabled {
            let mut settings = self.config.to_capture_settings();
            settings.pid = self.pid;
            settings.base_address = self.base_address;
            Some(start_capture(Arc::clone(&self.shell), &settings)?)
        } else {
            None
        };
        let mut pointer = if self.config.pointer.enabled {
            match start_pointer(
                Arc::clone(&self.shell),
                &self.config.pointer.device,
                self.config.pointer.threshold,
            ) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    if let Some(handle) = capture.take() {
                        handle.stop();
                        handle.join().await;
                    }
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        } else {
            None
        };
        if capture.is_none() && pointer.is_none() {
            warn!("capture and pointer are both disabled; nothing to do");
        }

        let stats = capture.as_ref().map(CaptureHandle::stats_receiver);
        let mut summary = SessionSummary::default();
        let mut last_frame: Option<FrameBuffer> = None;
        let mut failure = None;

        while capture.is_some() || pointer.is_some() {
            tokio::select! {
                event = next_frame(&mut capture) => match event {
                    Some(StreamEvent::Item(frame)) => {
                        summary.frames += 1;
                        if summary.frames % REPORT_EVERY == 0 {
                            report(summary.frames, stats.as_ref());
                        }
                        last_frame = Some(frame);
                    }
                    Some(StreamEvent::Fatal(e)) => {
                        error!("capture failed: {e}");
                        failure = Some(e);
                        break;
                    }
                    None => {
                        info!("capture stream ended");
                        if let Some(handle) = capture.take() {
                            handle.join().await;
                        }
                    }
                },
                event = next_pointer(&mut pointer) => match event {
                    Some(event) => {
                        summary.pointer_events += 1;
                        log_pointer(event);
                    }
                    None => {
                        info!("pointer stream ended");
                        if let Some(handle) = pointer.take() {
                            handle.join().await;
                        }
                    }
                },
                _ = wait_for_stop(&self.running) => break,
            }
        }

        if let Some(handle) = capture.take() {
            handle.stop();
            handle.join().await;
        }
        if let Some(handle) = pointer.take() {
            handle.stop();
            handle.join().await;
        }
        if let Some(rx) = &stats {
            summary.stats = rx.borrow().clone();
        }

        if let (Some(path), Some(frame)) = (&self.dump_path, &last_frame) {
            tokio::fs::write(path, &frame.data).await?;
            info!("last frame written to {} ({frame:?})", path.display());
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            "session ended: {} frames, {} pointer events",
            summary.frames, summary.pointer_events
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

async fn next_frame(capture: &mut Option<CaptureHandle>) -> Option<StreamEvent<FrameBuffer>> {
    match capture {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_pointer(pointer: &mut Option<PointerHandle>) -> Option<PointerEvent> {
    match pointer {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

fn report(frames: u64, stats: Option<&watch::Receiver<FrameStats>>) {
    match stats {
        Some(rx) => {
            let s = rx.borrow();
            info!("frame {frames} | fps {:.3} | {} bytes", s.fps, s.total_bytes);
        }
        None => info!("frame {frames}"),
    }
}

fn log_pointer(event: PointerEvent) {
    match event {
        PointerEvent::Move { x, y } => debug!("pen at ({x}, {y})"),
        PointerEvent::Press => info!("pen down"),
        PointerEvent::Lift => info!("pen up"),
        PointerEvent::Near => info!("pen in range"),
        PointerEvent::Far => info!("pen out of range"),
    }
}

/// Resolves when `running` becomes false.
async fn wait_for_stop(running: &Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    use inkmirror_core::profile::{ABS_STYLUS_PRESSURE, EV_ABS};
    use inkmirror_core::{EventRecord, RemoteControl, RemoteProcess};

    struct ExitWith(Option<i32>);

    impl RemoteControl for ExitWith {
        fn wait(&mut self) -> io::Result<Option<i32>> {
            Ok(self.0)
        }

        fn kill(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Answers every command with the same output and exit status.
    struct CannedShell {
        stdout: Vec<u8>,
        exit_code: Option<i32>,
    }

    impl RemoteShell for CannedShell {
        fn exec(&self, _command: &str) -> Result<RemoteProcess, MirrorError> {
            Ok(RemoteProcess::new(
                None,
                Some(Box::new(Cursor::new(self.stdout.clone()))),
                Some(Box::new(Cursor::new(Vec::new()))),
                Box::new(ExitWith(self.exit_code)),
            ))
        }
    }

    fn shell(stdout: Vec<u8>, exit_code: Option<i32>) -> Arc<dyn RemoteShell> {
        Arc::new(CannedShell { stdout, exit_code })
    }

    #[test]
    fn service_creates_stopped() {
        let svc = MirrorService::new(MirrorConfig::default(), shell(Vec::new(), Some(0)));
        assert!(!svc.is_running());
        let handle = svc.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn nothing_enabled_returns_immediately() {
        let mut config = MirrorConfig::default();
        config.capture.enabled = false;
        config.pointer.enabled = false;
        let svc = MirrorService::new(config, shell(Vec::new(), Some(0)));
        assert_eq!(svc.run().await.unwrap(), SessionSummary::default());
    }

    #[tokio::test]
    async fn pointer_session_counts_gestures() {
        let stdout: Vec<u8> = [1500, 200]
            .iter()
            .flat_map(|&p| EventRecord::new(EV_ABS, ABS_STYLUS_PRESSURE, p).to_bytes())
            .collect();
        let mut config = MirrorConfig::default();
        config.capture.enabled = false;
        let svc = MirrorService::new(config, shell(stdout, Some(0)));

        let summary = svc.run().await.unwrap();
        assert_eq!(summary.pointer_events, 2);
        assert_eq!(summary.frames, 0);
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn missing_tool_ends_session_with_error() {
        let mut config = MirrorConfig::default();
        config.pointer.enabled = false;
        let svc = MirrorService::new(config, shell(Vec::new(), Some(127)))
            .with_pid(Some(42))
            .with_base_address(Some(0x7f00_0008));

        let err = svc.run().await.unwrap_err();
        assert!(matches!(err, MirrorError::ToolMissing { exit_code: 127, .. }));
    }
}
