//! Agent configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/wsprint/agent.toml`
//! - Windows: `%APPDATA%/wsprint/agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wsprint_printer::PageBounds;
use wsprint_protocol::constants::{
    DEFAULT_HOST, DEFAULT_PORT, PRINT_TIMEOUT, WS_IDLE_TIMEOUT, WS_MAX_MESSAGE_SIZE,
    WS_PING_PERIOD,
};
use wsprint_server::{ReplyPolicy, ServerConfig};

/// Which printer sink to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterBackend {
    /// The operating system's default printer.
    #[default]
    System,
    /// Log jobs without printing.
    Log,
}

/// Page geometry used when rendering a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Width in hundredths of an inch.
    pub width: u32,
    /// Height in hundredths of an inch.
    pub height: u32,
    /// Raster resolution.
    pub dpi: u32,
}

impl Default for PageConfig {
    fn default() -> Self {
        let letter = PageBounds::LETTER;
        Self {
            width: letter.width,
            height: letter.height,
            dpi: letter.dpi,
        }
    }
}

impl PageConfig {
    pub fn bounds(&self) -> PageBounds {
        PageBounds {
            width: self.width,
            height: self.height,
            dpi: self.dpi,
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface to listen on.
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket server port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Seconds without traffic before a client is disconnected.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds a single print may take before it is abandoned.
    #[serde(default = "default_print_timeout")]
    pub print_timeout_secs: u64,

    /// Seconds between keep-alive pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Whether rejected requests and printer failures are answered.
    #[serde(default)]
    pub reply_policy: ReplyPolicy,

    /// Printer sink.
    #[serde(default)]
    pub printer: PrinterBackend,

    #[serde(default)]
    pub page: PageConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_message_size() -> usize {
    WS_MAX_MESSAGE_SIZE
}

fn default_idle_timeout() -> u64 {
    WS_IDLE_TIMEOUT.as_secs()
}

fn default_print_timeout() -> u64 {
    PRINT_TIMEOUT.as_secs()
}

fn default_ping_interval() -> u64 {
    WS_PING_PERIOD.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            idle_timeout_secs: default_idle_timeout(),
            print_timeout_secs: default_print_timeout(),
            ping_interval_secs: default_ping_interval(),
            reply_policy: ReplyPolicy::default(),
            printer: PrinterBackend::default(),
            page: PageConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default path, or creates a default if
    /// not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            Self::read(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Loads configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        Self::read(path)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_message_size > 0, "max_message_size must be positive");
        anyhow::ensure!(self.idle_timeout_secs > 0, "idle_timeout_secs must be positive");
        anyhow::ensure!(self.print_timeout_secs > 0, "print_timeout_secs must be positive");
        anyhow::ensure!(self.ping_interval_secs > 0, "ping_interval_secs must be positive");
        anyhow::ensure!(self.page.dpi > 0, "page.dpi must be positive");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_message_size: self.max_message_size,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ping_period: Duration::from_secs(self.ping_interval_secs),
        }
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.print_timeout_secs)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("wsprint").join("agent.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("wsprint")
            .join("agent.toml"))
    }
}
