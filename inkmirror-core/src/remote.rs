//! Remote command execution.
//!
//! The pipeline only needs "run this command line, give me its byte
//! streams and exit status". [`RemoteShell`] is that seam; [`SshShell`]
//! implements it on top of the system `ssh` client, and tests substitute
//! in-memory fakes.
//!
//! Session establishment and authentication belong to `ssh` itself
//! (keys, agent, `~/.ssh/config`).

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::MirrorError;

/// Pause between exit-status polls while waiting on a command.
const WAIT_POLL: Duration = Duration::from_millis(10);

// ── Traits ───────────────────────────────────────────────────────

/// Something that can start commands on the device.
pub trait RemoteShell: Send + Sync {
    /// Start `command` and return its streams.
    fn exec(&self, command: &str) -> Result<RemoteProcess, MirrorError>;
}

/// Lifecycle control of a started remote command.
pub trait RemoteControl: Send {
    /// Block until the command exits. `None` when no status is available
    /// (e.g. killed by a signal).
    fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Poll for exit without blocking. `Ok(None)` while still running,
    /// otherwise the status as [`wait`](Self::wait) reports it.
    ///
    /// The default blocks in `wait`; controls whose command can outlive
    /// the call must override it.
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        self.wait().map(Some)
    }

    /// Terminate the command. Must be safe to call after it exited.
    fn kill(&mut self) -> io::Result<()>;
}

// ── RemoteProcess ────────────────────────────────────────────────

/// A running remote command.
///
/// The three streams are taken out by whichever worker consumes them;
/// the control half stays shared so a stop request can kill the command
/// while a worker is blocked reading.
pub struct RemoteProcess {
    pub stdin: Option<Box<dyn Write + Send>>,
    pub stdout: Option<Box<dyn Read + Send>>,
    pub stderr: Option<Box<dyn Read + Send>>,
    control: ProcessHandle,
}

impl RemoteProcess {
    pub fn new(
        stdin: Option<Box<dyn Write + Send>>,
        stdout: Option<Box<dyn Read + Send>>,
        stderr: Option<Box<dyn Read + Send>>,
        control: Box<dyn RemoteControl>,
    ) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            control: ProcessHandle(Arc::new(Mutex::new(control))),
        }
    }

    /// A cloneable handle for waiting on or killing the command.
    pub fn handle(&self) -> ProcessHandle {
        self.control.clone()
    }

    /// Drain stdout and stderr and wait for the exit status.
    ///
    /// stderr is drained on its own thread so neither pipe can fill up
    /// while the other is being read.
    pub fn collect(mut self) -> Result<RemoteOutput, MirrorError> {
        let stderr_reader = self.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut raw = Vec::new();
                err.read_to_end(&mut raw).map(|_| raw)
            })
        });
        let mut stdout = Vec::new();
        if let Some(mut out) = self.stdout.take() {
            out.read_to_end(&mut stdout)?;
        }
        let stderr = match stderr_reader {
            Some(reader) => reader
                .join()
                .map_err(|_| MirrorError::Other("stderr reader panicked".into()))??,
            None => Vec::new(),
        };
        drop(self.stdin.take());
        let exit_code = self.control.wait()?;

        Ok(RemoteOutput {
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }
}

/// Shared control half of a [`RemoteProcess`].
#[derive(Clone)]
pub struct ProcessHandle(Arc<Mutex<Box<dyn RemoteControl>>>);

impl ProcessHandle {
    fn lock(&self) -> MutexGuard<'_, Box<dyn RemoteControl>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until the command exits.
    ///
    /// The lock is only held for each poll, so `kill` from another thread
    /// is never stuck behind a waiter.
    pub fn wait(&self) -> io::Result<Option<i32>> {
        loop {
            if let Some(status) = self.lock().try_wait()? {
                return Ok(status);
            }
            thread::sleep(WAIT_POLL);
        }
    }

    /// Best-effort termination; failures are only logged.
    pub fn kill(&self) {
        if let Err(e) = self.lock().kill() {
            debug!("kill of remote command failed: {e}");
        }
    }
}

// ── RemoteOutput ─────────────────────────────────────────────────

/// Everything a finished one-shot command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Run a one-shot query and return its trimmed stdout.
///
/// Fails with [`MirrorError::RemoteExit`] on a non-zero exit status.
pub fn run_to_string(shell: &dyn RemoteShell, command: &str) -> Result<String, MirrorError> {
    info!("executing remote command: {command}");
    let output = shell.exec(command)?.collect()?;
    if !output.success() {
        return Err(MirrorError::RemoteExit {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout_text().trim().to_string())
}

// ── SshShell ─────────────────────────────────────────────────────

/// [`RemoteShell`] backed by the system `ssh` binary.
///
/// `ssh` forwards the remote exit status as its own, so a missing
/// remote helper still surfaces as status 127.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshShell {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub ssh_binary: String,
}

impl SshShell {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: "root".into(),
            port: 22,
            identity_file: None,
            ssh_binary: "ssh".into(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_ssh_binary(mut self, binary: impl Into<String>) -> Self {
        self.ssh_binary = binary.into();
        self
    }

    /// Arguments passed to the `ssh` binary for `command`.
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

impl RemoteShell for SshShell {
    fn exec(&self, command: &str) -> Result<RemoteProcess, MirrorError> {
        debug!("spawning {} for {}@{}", self.ssh_binary, self.user, self.host);
        let mut child = Command::new(&self.ssh_binary)
            .args(self.args(command))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().map(|s| Box::new(s) as Box<dyn Write + Send>);
        let stdout = child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>);
        let stderr = child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>);

        Ok(RemoteProcess::new(stdin, stdout, stderr, Box::new(LocalChild(child))))
    }
}

/// Control half of a local child process.
struct LocalChild(Child);

impl RemoteControl for LocalChild {
    fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.0.wait()?.code())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.0.try_wait()?.map(|status| status.code()))
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.0.try_wait()? {
            Some(_) => Ok(()),
            None => self.0.kill(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Exited(Option<i32>);

    impl RemoteControl for Exited {
        fn wait(&mut self) -> io::Result<Option<i32>> {
            Ok(self.0)
        }

        fn kill(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Canned {
        stdout: &'static str,
        stderr: &'static str,
        exit_code: Option<i32>,
    }

    impl RemoteShell for Canned {
        fn exec(&self, _command: &str) -> Result<RemoteProcess, MirrorError> {
            Ok(RemoteProcess::new(
                None,
                Some(Box::new(Cursor::new(self.stdout.as_bytes().to_vec()))),
                Some(Box::new(Cursor::new(self.stderr.as_bytes().to_vec()))),
                Box::new(Exited(self.exit_code)),
            ))
        }
    }

    #[test]
    fn ssh_args_include_target_and_command() {
        let shell = SshShell::new("10.11.99.1")
            .with_port(2222)
            .with_identity_file("/home/me/.ssh/tablet");
        let args = shell.args("pidof xochitl");
        assert_eq!(
            args,
            vec![
                "-p", "2222", "-o", "BatchMode=yes", "-i", "/home/me/.ssh/tablet",
                "root@10.11.99.1", "--", "pidof xochitl",
            ]
        );
    }

    #[test]
    fn run_to_string_trims_output() {
        let shell = Canned {
            stdout: "1234\n",
            stderr: "",
            exit_code: Some(0),
        };
        assert_eq!(run_to_string(&shell, "pidof xochitl").unwrap(), "1234");
    }

    #[test]
    fn run_to_string_reports_failure() {
        let shell = Canned {
            stdout: "",
            stderr: "no such process\n",
            exit_code: Some(1),
        };
        match run_to_string(&shell, "pidof xochitl").unwrap_err() {
            MirrorError::RemoteExit {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "pidof xochitl");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "no such process");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Runs until killed; `wait` itself is never used by the handle.
    struct RunsUntilKilled(bool);

    impl RemoteControl for RunsUntilKilled {
        fn wait(&mut self) -> io::Result<Option<i32>> {
            Ok(None)
        }

        fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
            Ok(self.0.then_some(None))
        }

        fn kill(&mut self) -> io::Result<()> {
            self.0 = true;
            Ok(())
        }
    }

    #[test]
    fn kill_reaches_a_blocked_waiter() {
        let process = RemoteProcess::new(None, None, None, Box::new(RunsUntilKilled(false)));
        let handle = process.handle();
        let waiter = process.handle();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(waiter.wait());
        });

        thread::sleep(Duration::from_millis(30));
        handle.kill();
        let status = rx.recv_timeout(Duration::from_secs(5)).expect("waiter still blocked");
        assert_eq!(status.unwrap(), None);
    }

    /// Signals once its content has been read to the end.
    struct SignalAtEof {
        inner: Cursor<Vec<u8>>,
        done: Option<std::sync::mpsc::Sender<()>>,
    }

    impl Read for SignalAtEof {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            if n == 0 {
                if let Some(done) = self.done.take() {
                    let _ = done.send(());
                }
            }
            Ok(n)
        }
    }

    /// Yields nothing until the paired stream has been drained.
    struct AfterSignal {
        inner: Cursor<Vec<u8>>,
        ready: std::sync::mpsc::Receiver<()>,
        waited: bool,
    }

    impl Read for AfterSignal {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.waited {
                self.ready
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "stderr never drained"))?;
                self.waited = true;
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn collect_reads_stderr_alongside_stdout() {
        let (tx, rx) = std::sync::mpsc::channel();
        let noise = "warning\n".repeat(20_000);
        let process = RemoteProcess::new(
            None,
            Some(Box::new(AfterSignal {
                inner: Cursor::new(b"42\n".to_vec()),
                ready: rx,
                waited: false,
            })),
            Some(Box::new(SignalAtEof {
                inner: Cursor::new(noise.clone().into_bytes()),
                done: Some(tx),
            })),
            Box::new(Exited(Some(0))),
        );

        let output = process.collect().unwrap();
        assert_eq!(output.stdout_text(), "42\n");
        assert_eq!(output.stderr, noise);
        assert!(output.success());
    }
}
