//! Stylus pointer worker.
//!
//! Streams raw records from the device's stylus input node and decodes
//! them into [`PointerEvent`]s on a dedicated blocking worker.
//!
//! The blocking read cannot be interrupted locally, so stopping works from
//! the remote side: a newline on the command's stdin kills the remote
//! `cat`, the stream closes, and the read loop sees end of stream.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::command::PointerCommand;
use crate::error::MirrorError;
use crate::pointer::{PointerDecoder, decode_stream};
use crate::remote::{ProcessHandle, RemoteShell};
use crate::types::PointerEvent;

type SharedStdin = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

// ── PointerStream ────────────────────────────────────────────────

/// Pointer session: one remote command, one worker.
pub struct PointerStream {
    shell: Arc<dyn RemoteShell>,
    command: PointerCommand,
    threshold: i32,
}

impl PointerStream {
    pub fn new(shell: Arc<dyn RemoteShell>, command: PointerCommand, threshold: i32) -> Self {
        Self {
            shell,
            command,
            threshold,
        }
    }

    /// Issue the pointer command and start the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> Result<PointerHandle, MirrorError> {
        info!("executing remote command: {}", self.command);
        let mut process = self.shell.exec(self.command.as_str())?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| MirrorError::Other("pointer command has no stdout".into()))?;
        let stdin: SharedStdin = Arc::new(Mutex::new(process.stdin.take()));
        let control = process.handle();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut decoder = PointerDecoder::new(self.threshold);
        let worker_control = control.clone();

        let join = tokio::task::spawn_blocking(move || {
            let records = decode_stream(stdout, &mut decoder, |event| tx.send(event).is_ok());
            debug!("pointer worker exiting after {records} records");
            worker_control.kill();
        });

        Ok(PointerHandle {
            events: rx,
            stdin,
            control,
            join,
        })
    }
}

// ── PointerHandle ────────────────────────────────────────────────

/// Subscriber side of a running pointer stream.
pub struct PointerHandle {
    events: mpsc::UnboundedReceiver<PointerEvent>,
    stdin: SharedStdin,
    control: ProcessHandle,
    join: JoinHandle<()>,
}

impl PointerHandle {
    /// Next gesture; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<PointerEvent> {
        self.events.recv().await
    }

    /// Close the remote stream and terminate the command.
    pub fn stop(&self) {
        let mut stdin = self.stdin.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut pipe) = stdin.take() {
            if let Err(e) = pipe.write_all(b"\n").and_then(|_| pipe.flush()) {
                debug!("could not signal pointer command: {e}");
            }
        }
        drop(stdin);
        self.control.kill();
    }

    /// Wait for the worker to exit.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("pointer worker panicked: {e}");
        }
    }
}

/// Decode a finite in-memory or file-backed record stream.
///
/// Convenience for replaying captured input dumps.
pub fn decode_all<R: Read>(reader: R, threshold: i32) -> Vec<PointerEvent> {
    let mut events = Vec::new();
    decode_stream(reader, &mut PointerDecoder::new(threshold), |e| {
        events.push(e);
        true
    });
    events
}
