//! # inkmirror-core
//!
//! Data-plane for mirroring the screen and stylus of a remote e-paper
//! tablet by reading raw memory over a plain remote shell.
//!
//! This crate contains:
//! - **Window**: `MemoryWindow` page-aligned address resolution
//! - **Command**: `CaptureCommand` / `PointerCommand` remote pipelines
//! - **Decompress**: `StreamDecompressor` for the lz4/zstd capture stream
//! - **Assembler**: `FrameAssembler` slicing frames off the byte stream
//! - **Pointer**: `PointerDecoder` stylus gesture state machine
//! - **Remote**: `RemoteShell` seam and the `ssh`-backed `SshShell`
//! - **Workers**: `FrameCapture` and `PointerStream` with their handles
//! - **Error**: `MirrorError`, a typed, `thiserror`-based error hierarchy

pub mod assembler;
pub mod capture;
pub mod command;
pub mod decompress;
pub mod error;
pub mod input;
pub mod pointer;
pub mod profile;
pub mod remote;
pub mod session;
pub mod types;
pub mod window;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use assembler::FrameAssembler;
pub use capture::{CaptureEnd, CaptureHandle, CaptureOptions, FrameCapture};
pub use command::{CaptureCommand, CaptureCommandBuilder, PointerCommand};
pub use decompress::{Compression, StreamDecompressor};
pub use error::MirrorError;
pub use input::{PointerHandle, PointerStream};
pub use pointer::{Contact, EventRecord, PointerDecoder, PointerState};
pub use remote::{RemoteControl, RemoteOutput, RemoteProcess, RemoteShell, SshShell};
pub use session::{CaptureSettings, start_capture, start_pointer};
pub use types::{FrameBuffer, FrameStats, PixelFormat, PointerEvent, StreamEvent};
pub use window::MemoryWindow;
