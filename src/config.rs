use clap::Parser;
use std::path::PathBuf;

/// KBM recap sidecar: JSON-lines requests on stdin, responses on stdout.
#[derive(Debug, Parser)]
#[command(name = "kbmrecapd", version, about)]
pub struct Args {
    /// Workspace directory to open at startup.
    #[arg(long, env = "KBMRECAPD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `kbmrecapd=trace`. Logs go to stderr.
    #[arg(long, env = "KBMRECAPD_LOG", default_value = "info")]
    pub log_filter: String,
}
