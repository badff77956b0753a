//! `nwwatch serve`: watch a steps folder and serve viewers in the foreground.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use nwwatch_daemon::config::{CLIENT_BUFFER, DEBOUNCE_WINDOW, DEFAULT_HOST, DEFAULT_PORT};
use nwwatch_daemon::{start_blocking, DaemonConfig, LogFormat, StopPolicy};

/// Arguments for `nwwatch serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Folder containing `<id>.json` step files.
    pub dir: PathBuf,

    /// Address to bind.
    #[arg(long, default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Quiet period before a file change is applied.
    #[arg(long, default_value_t = DEBOUNCE_WINDOW.as_millis() as u64)]
    pub debounce_ms: u64,

    /// Frames queued per viewer before it is dropped as unresponsive.
    #[arg(long, default_value_t = CLIENT_BUFFER)]
    pub client_buffer: usize,

    /// Dashboard bundle to serve at `/`.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Treat stopping an already-stopped watch as an error.
    #[arg(long)]
    pub strict_stop: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let config = self.into_config();
        let dir = config.steps_dir.display().to_string();
        start_blocking(config).with_context(|| format!("nwwatch serve failed for '{dir}'"))
    }

    fn into_config(self) -> DaemonConfig {
        let mut config = DaemonConfig::new(self.dir);
        config.bind = SocketAddr::new(self.host, self.port);
        config.debounce = Duration::from_millis(self.debounce_ms);
        config.client_buffer = self.client_buffer;
        config.static_dir = self.static_dir;
        if self.strict_stop {
            config.stop_policy = StopPolicy::Strict;
        }
        if self.log_json {
            config.log_format = LogFormat::Json;
        }
        config
    }
}
