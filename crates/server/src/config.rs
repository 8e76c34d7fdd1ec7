use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Workspace backend: stores REST tool definitions and serves them as MCP tools.
#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-workspace-server", version, about)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, env = "MCP_WORKSPACE_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Directory for workspace documents (in-memory when unset).
    #[arg(long, env = "MCP_WORKSPACE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Upstream call timeout in seconds; 0 disables it.
    #[arg(long, env = "MCP_WORKSPACE_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[arg(long, env = "MCP_WORKSPACE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "MCP_WORKSPACE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    #[must_use]
    pub fn upstream_timeout(&self) -> Option<Duration> {
        (self.upstream_timeout_secs > 0).then(|| Duration::from_secs(self.upstream_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["mcp-workspace-server"]).expect("parse");
        assert_eq!(args.bind.to_string(), "127.0.0.1:8787");
        assert_eq!(args.data_dir, None);
        assert_eq!(args.upstream_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let args = Args::try_parse_from([
            "mcp-workspace-server",
            "--upstream-timeout-secs",
            "0",
            "--log-format",
            "json",
            "--data-dir",
            "/tmp/ws",
        ])
        .expect("parse");
        assert_eq!(args.upstream_timeout(), None);
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/ws")));
    }
}
