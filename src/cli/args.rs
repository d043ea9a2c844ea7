//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Flags
//!
//! - `--config <path>`: Proxy configuration file (required)
//! - `--cache-dir <dir>`: Override the cache directory
//! - `--addr <addr>`: Listen address
//! - `--upstream <url>`: Override the upstream proxy
//! - `--drain-timeout <secs>`: Shutdown drain timeout
//! - `--debug`: Enable debug logging (also `DEBUG` in the environment)

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::server::DEFAULT_ADDR;

/// Modgate - A caching Go module proxy that serves modules straight from git
#[derive(Parser, Debug)]
#[command(name = "modgate")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
EXAMPLES:
    # Serve modules listed in a config file
    modgate --config /etc/modgate.toml

    # Point Go at it
    GOPROXY=http://localhost:7589 go get go.example.com/lib@latest")]
pub struct Cli {
    /// Proxy configuration file
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Directory holding cached working copies (overrides the config file)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Upstream module proxy (overrides the config file)
    #[arg(long, value_name = "URL")]
    pub upstream: Option<String>,

    /// Seconds to wait for open connections on shutdown
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub drain_timeout: u64,

    /// Enable debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Shutdown drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_is_required() {
        assert!(Cli::try_parse_from(["modgate"]).is_err());
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["modgate", "--config", "m.toml"]).unwrap();
        assert_eq!(cli.addr, DEFAULT_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(cli.drain_timeout(), Duration::from_secs(10));
        assert!(cli.cache_dir.is_none());
        assert!(cli.upstream.is_none());
    }

    #[test]
    fn overrides() {
        let cli = Cli::try_parse_from([
            "modgate",
            "--config",
            "m.toml",
            "--cache-dir",
            "/tmp/c",
            "--addr",
            "127.0.0.1:9000",
            "--upstream",
            "http://mirror",
            "--drain-timeout",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(cli.addr.port(), 9000);
        assert_eq!(cli.upstream.as_deref(), Some("http://mirror"));
        assert_eq!(cli.drain_timeout(), Duration::from_secs(3));
    }
}
