//! Configuration for the mirror client.

use std::path::Path;

use serde::{Deserialize, Serialize};

use inkmirror_core::profile;
use inkmirror_core::{CaptureSettings, Compression, PixelFormat, SshShell};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Connection to the tablet.
    pub remote: RemoteConfig,
    /// Framebuffer capture settings.
    pub capture: CaptureConfig,
    /// Stylus settings.
    pub pointer: PointerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// SSH connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Tablet address (USB networking default).
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Private key passed to `ssh -i`.
    pub identity_file: Option<String>,
    /// Client binary to run.
    pub ssh_binary: String,
}

/// Framebuffer capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Remote compression filter, may include flags.
    pub decompressor_path: String,
    /// Remote byte-count extractor.
    pub extractor_path: String,
    /// Seconds to wait on the device before the first read.
    pub startup_delay_secs: Option<u32>,
    /// "lz4" or "zstd"; must match the remote filter.
    pub compression: Compression,
    /// "gray8" or "gray16".
    pub pixel_format: PixelFormat,
    /// Process owning the framebuffer mapping.
    pub process_name: String,
}

/// Stylus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    pub enabled: bool,
    /// Input device node on the tablet.
    pub device: String,
    /// Pressure above which the stylus counts as pressed.
    pub threshold: i32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "10.11.99.1".into(),
            user: "root".into(),
            port: 22,
            identity_file: None,
            ssh_binary: "ssh".into(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decompressor_path: profile::DEFAULT_DECOMPRESSOR_PATH.into(),
            extractor_path: profile::DEFAULT_EXTRACTOR_PATH.into(),
            startup_delay_secs: None,
            compression: Compression::Lz4,
            pixel_format: PixelFormat::Gray8,
            process_name: profile::DISPLAY_PROCESS.into(),
        }
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: profile::DEFAULT_INPUT_DEVICE.into(),
            threshold: profile::DEFAULT_PRESSURE_THRESHOLD,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MirrorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Build the SSH shell described by `remote`.
    pub fn to_shell(&self) -> SshShell {
        let r = &self.remote;
        let mut shell = SshShell::new(r.host.clone())
            .with_user(r.user.clone())
            .with_port(r.port)
            .with_ssh_binary(r.ssh_binary.clone());
        if let Some(identity) = &r.identity_file {
            shell = shell.with_identity_file(identity.clone());
        }
        shell
    }

    /// Convert capture settings into core `CaptureSettings`.
    pub fn to_capture_settings(&self) -> CaptureSettings {
        let c = &self.capture;
        CaptureSettings {
            decompressor_path: Some(c.decompressor_path.clone()),
            extractor_path: Some(c.extractor_path.clone()),
            startup_delay_secs: c.startup_delay_secs,
            compression: c.compression,
            pixel_format: c.pixel_format,
            process_name: c.process_name.clone(),
            ..CaptureSettings::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = MirrorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("host"));
        assert!(text.contains("threshold"));
        assert!(text.contains("compression = \"lz4\""));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = MirrorConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MirrorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.remote.port, 22);
        assert_eq!(parsed.pointer.threshold, 1000);
        assert_eq!(parsed.capture.pixel_format, PixelFormat::Gray8);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: MirrorConfig = toml::from_str(
            r#"
            [capture]
            compression = "zstd"
            startup_delay_secs = 3

            [pointer]
            device = "/dev/input/event1"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.capture.compression, Compression::Zstd);
        assert_eq!(parsed.capture.startup_delay_secs, Some(3));
        assert_eq!(parsed.capture.extractor_path, profile::DEFAULT_EXTRACTOR_PATH);
        assert_eq!(parsed.pointer.device, "/dev/input/event1");
        assert_eq!(parsed.remote.host, "10.11.99.1");
    }

    #[test]
    fn converts_to_core_types() {
        let mut cfg = MirrorConfig::default();
        cfg.remote.identity_file = Some("/keys/tablet".into());
        let shell = cfg.to_shell();
        assert_eq!(shell.identity_file.as_deref(), Some("/keys/tablet"));

        let settings = cfg.to_capture_settings();
        assert_eq!(settings.decompressor_path.as_deref(), Some("$HOME/lz4"));
        assert_eq!(settings.pid, None);
    }
}
