//! # inkmirror: e-paper tablet mirror client
//!
//! Connects to a tablet over SSH, streams its framebuffer and stylus
//! input, and reports what arrives.
//!
//! - [`config`]: TOML configuration with defaults for every field.
//! - [`service`]: one capture + pointer session, stoppable from outside.

pub mod config;
pub mod service;
