use std::path::PathBuf;

use clap::Parser;

/// harvid-server: an HTTP video frame server.
#[derive(Debug, Parser, Clone)]
#[command(name = "harvid-server", version, about)]
pub struct Config {
    /// Directory media files are served from.
    #[arg(default_value = ".")]
    pub docroot: PathBuf,

    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1:1554")]
    pub listen: String,

    /// Maximum number of concurrently open decoders.
    #[arg(long, default_value_t = 8)]
    pub pool_size: usize,

    /// Maximum number of idle decoders kept warm per pool.
    #[arg(long, default_value_t = 4)]
    pub idle_decoder_cap: usize,

    /// Frame cache capacity, in megabytes.
    #[arg(long, default_value_t = 256)]
    pub cache_mb: usize,

    /// Allow admin-only operations (cache purge, dotfile serving).
    #[arg(long, default_value_t = false)]
    pub admin: bool,

    /// Disable the directory index endpoint entirely.
    #[arg(long, default_value_t = false)]
    pub no_index: bool,

    /// Log verbosity.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn cache_max_bytes(&self) -> usize {
        self.cache_mb * 1024 * 1024
    }
}
