mod bucket;
mod calc;
mod config;
mod db;
mod error;
mod evaluation;
mod ipc;
mod model;
mod pivot;
mod reconcile;
mod store;
mod village;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = config::Args::parse();
    init_tracing(&args.log_filter);

    let mut state = ipc::AppState::default();
    if let Some(path) = args.workspace.as_deref() {
        if let Err(e) = state.open_workspace(path) {
            error!(workspace = %path.display(), error = %e, "startup workspace failed to open");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "kbmrecapd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
