//! tsbridge entry point
//!
//! Logging goes to stderr (stdout belongs to the LSP stream). Exit codes:
//! 0 clean shutdown, 1 fatal configuration error, 2 the tsserver crash
//! loop gave up.

mod args;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tsbridge_session::{Backend, BackendOptions};

use crate::args::Args;

fn init_logging(level: u8) {
    let directive = match level {
        1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tsbridge={directive},{directive}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let (level, conflicting) = args.effective_log_level();
    init_logging(level);
    if conflicting {
        warn!("--log-level and --tsserver-log-level disagree; using --log-level");
    }

    if !args.stdio {
        eprintln!("tsbridge: --stdio is required");
        return ExitCode::from(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("tsbridge: failed to start runtime: {err}");
            return ExitCode::from(1);
        }
    };

    let crash_flag = Arc::new(AtomicBool::new(false));
    let options = BackendOptions {
        tsserver_path: args.tsserver_path,
        bundled_tsserver_path: bundled_tsserver(),
        tsserver_log_file: args.tsserver_log_file,
        tsserver_log_verbosity: args.tsserver_log_verbosity,
    };

    runtime.block_on(async {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let flag = crash_flag.clone();
        let (service, socket) =
            LspService::new(move |client| Backend::new(client, options, flag));
        Server::new(stdin, stdout, socket).serve(service).await;
    });

    if crash_flag.load(Ordering::SeqCst) {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

/// A TypeScript installation shipped next to the binary, if any.
fn bundled_tsserver() -> Option<std::path::PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join("typescript/lib/tsserver.js");
    candidate.is_file().then_some(candidate)
}
