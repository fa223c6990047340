//! Spawning and supervising the tsserver child process
//!
//! Arguments are derived from the resolved [`ApiVersion`] and the launch
//! configuration; the transport is either framed stdio or, on new enough
//! servers, a node IPC channel on fd 3. Crash handling is a moving-window
//! policy: five restarts inside ten seconds is fatal, five inside five
//! minutes is a warning. Intentional restarts reset the window.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use tsbridge_protocol::{ApiVersion, StdioCodec};

use crate::cancellation::PipeCanceller;
use crate::client::{MessageSink, MessageStream};
use crate::error::{Result, TsServerError};

/// Which of the (up to) two server processes this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// The full project-aware server.
    Semantic,
    /// The optional parse-only sidecar answering while projects load.
    Syntax,
}

impl ServerKind {
    pub fn label(self) -> &'static str {
        match self {
            ServerKind::Semantic => "semantic",
            ServerKind::Syntax => "syntax",
        }
    }
}

/// tsserver log verbosity, mirroring `--logVerbosity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVerbosity {
    Terse,
    Normal,
    Verbose,
}

impl LogVerbosity {
    pub fn as_arg(self) -> &'static str {
        match self {
            LogVerbosity::Terse => "terse",
            LogVerbosity::Normal => "normal",
            LogVerbosity::Verbose => "verbose",
        }
    }
}

/// Everything needed to launch one tsserver process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub tsserver_path: PathBuf,
    pub version: ApiVersion,
    pub kind: ServerKind,
    pub log_file: Option<PathBuf>,
    pub log_verbosity: Option<LogVerbosity>,
    pub locale: Option<String>,
    pub global_plugins: Vec<String>,
    pub plugin_probe_locations: Vec<PathBuf>,
    pub npm_location: Option<PathBuf>,
    pub disable_automatic_typing_acquisition: bool,
    /// `--max-old-space-size`, in megabytes.
    pub max_tsserver_memory: Option<u64>,
    /// Ask for the IPC transport; silently ignored below 4.9.
    pub use_node_ipc: bool,
}

impl SpawnConfig {
    pub fn new(tsserver_path: PathBuf, version: ApiVersion, kind: ServerKind) -> Self {
        Self {
            tsserver_path,
            version,
            kind,
            log_file: None,
            log_verbosity: None,
            locale: None,
            global_plugins: Vec::new(),
            plugin_probe_locations: Vec::new(),
            npm_location: None,
            disable_automatic_typing_acquisition: false,
            max_tsserver_memory: None,
            use_node_ipc: false,
        }
    }

    fn uses_ipc(&self) -> bool {
        self.use_node_ipc && self.version.supports_node_ipc() && cfg!(unix)
    }

    /// The tsserver argv (everything after the script path).
    fn server_args(&self, canceller: &PipeCanceller) -> Vec<String> {
        let mut args = Vec::new();
        if self.uses_ipc() {
            args.push("--useNodeIpc".into());
        } else {
            args.push("--stdio".into());
        }
        if self.version.supports_inferred_project_per_project_root() {
            args.push("--useInferredProjectPerProjectRoot".into());
        }
        if self.disable_automatic_typing_acquisition {
            args.push("--disableAutomaticTypingAcquisition".into());
        }
        if self.kind == ServerKind::Syntax {
            args.push("--syntaxOnly".into());
        }
        args.push("--cancellationPipeName".into());
        args.push(canceller.pipe_arg());
        if let Some(log_file) = &self.log_file {
            args.push("--logFile".into());
            args.push(log_file.display().to_string());
            args.push("--logVerbosity".into());
            args.push(
                self.log_verbosity
                    .unwrap_or(LogVerbosity::Normal)
                    .as_arg()
                    .into(),
            );
        }
        if let Some(locale) = &self.locale {
            args.push("--locale".into());
            args.push(locale.clone());
        }
        if !self.global_plugins.is_empty() {
            args.push("--globalPlugins".into());
            args.push(self.global_plugins.join(","));
        }
        if !self.plugin_probe_locations.is_empty() {
            args.push("--pluginProbeLocations".into());
            args.push(
                self.plugin_probe_locations
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        if let Some(npm) = &self.npm_location {
            args.push("--npmLocation".into());
            args.push(npm.display().to_string());
        }
        args
    }

    /// Arguments for node itself, ahead of the script path.
    fn node_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(megabytes) = self.max_tsserver_memory {
            args.push(format!("--max-old-space-size={megabytes}"));
        }
        if let Ok(port) = std::env::var("TSS_DEBUG") {
            args.push(format!("--inspect={port}"));
        } else if let Ok(port) = std::env::var("TSS_DEBUG_BRK") {
            args.push(format!("--inspect-brk={port}"));
        }
        args
    }
}

/// The per-instance scratch space under the system temp root:
/// `typescript-language-server-<uid>/<rand>/`, holding the cancellation
/// pipes and default log files. Removed when dropped.
pub struct InstanceDirs {
    base: PathBuf,
    inner: tempfile::TempDir,
}

impl InstanceDirs {
    pub fn new() -> std::io::Result<Self> {
        let base = std::env::temp_dir().join(format!(
            "typescript-language-server-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&base)?;
        let inner = tempfile::TempDir::new_in(&base)?;
        Ok(Self { base, inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn cancellation_prefix(&self, kind: ServerKind) -> PathBuf {
        self.inner
            .path()
            .join(format!("tscancellation-{}.", kind.label()))
    }

    pub fn default_log_file(&self, kind: ServerKind) -> PathBuf {
        self.inner.path().join(format!("tsserver-{}.log", kind.label()))
    }
}

impl Drop for InstanceDirs {
    fn drop(&mut self) {
        // TempDir removes the inner directory; the uid-level parent goes
        // too once it is empty.
        let _ = std::fs::remove_dir(&self.base);
    }
}

/// A live tsserver child with its framed transport.
pub struct SpawnedServer {
    pub kind: ServerKind,
    pub version: ApiVersion,
    pub child: Child,
    pub sink: MessageSink,
    pub stream: MessageStream,
    pub canceller: PipeCanceller,
}

/// Fork tsserver and wire up the transport the version supports.
pub fn spawn_server(config: &SpawnConfig, dirs: &InstanceDirs) -> Result<SpawnedServer> {
    let node = which::which("node")
        .map_err(|_| TsServerError::Config("could not find `node` on PATH".into()))?;
    let canceller = PipeCanceller::new(dirs.cancellation_prefix(config.kind));

    let mut command = Command::new(node);
    command
        .args(config.node_args())
        .arg(&config.tsserver_path)
        .args(config.server_args(&canceller))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // tsserver resolves its own imports relative to the lib root.
    if let Some(lib_root) = config.tsserver_path.parent() {
        command.env("NODE_PATH", lib_root);
    }

    let use_ipc = config.uses_ipc();
    let (mut child, sink, stream) = if use_ipc {
        #[cfg(unix)]
        {
            ipc::spawn_with_channel(command)?
        }
        #[cfg(not(unix))]
        {
            unreachable!("uses_ipc is false off unix")
        }
    } else {
        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TsServerError::Config("tsserver stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TsServerError::Config("tsserver stdout not piped".into()))?;
        let sink: MessageSink = Box::pin(FramedWrite::new(stdin, StdioCodec::new()));
        let stream: MessageStream = Box::pin(FramedRead::new(stdout, StdioCodec::new()));
        (child, sink, stream)
    };

    if let Some(stderr) = child.stderr.take() {
        let kind = config.kind;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = kind.label(), "tsserver stderr: {line}");
            }
        });
    }

    info!(
        server = config.kind.label(),
        version = %config.version,
        pid = ?child.id(),
        ipc = use_ipc,
        "tsserver spawned"
    );

    Ok(SpawnedServer {
        kind: config.kind,
        version: config.version.clone(),
        child,
        sink,
        stream,
        canceller,
    })
}

#[cfg(unix)]
mod ipc {
    //! The node IPC channel: a socketpair handed to the child as fd 3, with
    //! newline-delimited JSON serialization.

    use std::os::fd::{IntoRawFd, RawFd};

    use tokio_util::codec::{FramedRead, FramedWrite};
    use tsbridge_protocol::NodeIpcCodec;

    use super::*;

    pub(super) fn spawn_with_channel(
        mut command: Command,
    ) -> Result<(Child, MessageSink, MessageStream)> {
        let (parent, child_end) = std::os::unix::net::UnixStream::pair()?;
        let child_fd: RawFd = child_end.into_raw_fd();

        command
            .env("NODE_CHANNEL_FD", "3")
            .env("NODE_CHANNEL_SERIALIZATION_MODE", "json")
            .stdin(Stdio::null());
        unsafe {
            command.pre_exec(move || {
                // dup2 clears CLOEXEC on the destination, so fd 3 survives
                // the exec.
                nix::unistd::dup2(child_fd, 3)
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }

        let child = command.spawn()?;
        // The child holds its own copy now.
        let _ = nix::unistd::close(child_fd);

        parent.set_nonblocking(true)?;
        let parent = tokio::net::UnixStream::from_std(parent)?;
        let (read_half, write_half) = parent.into_split();
        let sink: MessageSink = Box::pin(FramedWrite::new(write_half, NodeIpcCodec::new()));
        let stream: MessageStream = Box::pin(FramedRead::new(read_half, NodeIpcCodec::new()));
        Ok((child, sink, stream))
    }
}

/// Why a restart is or is not allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartVerdict {
    Proceed,
    /// Crashing often, but not often enough to give up.
    Warn,
    /// Crash loop; stop restarting and surface an error.
    Fatal,
}

const FATAL_WINDOW: Duration = Duration::from_secs(10);
const WARN_WINDOW: Duration = Duration::from_secs(5 * 60);
const CRASH_THRESHOLD: usize = 5;

/// Moving window over recent crashes.
#[derive(Debug, Default)]
pub struct RestartTracker {
    crashes: VecDeque<Instant>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unexpected exit and judge whether restarting is sane.
    pub fn record_crash(&mut self) -> RestartVerdict {
        self.record_crash_at(Instant::now())
    }

    fn record_crash_at(&mut self, now: Instant) -> RestartVerdict {
        self.crashes.push_back(now);
        while let Some(oldest) = self.crashes.front() {
            if now.duration_since(*oldest) > WARN_WINDOW {
                self.crashes.pop_front();
            } else {
                break;
            }
        }

        let within_fatal = self
            .crashes
            .iter()
            .filter(|crash| now.duration_since(**crash) <= FATAL_WINDOW)
            .count();
        if within_fatal >= CRASH_THRESHOLD {
            return RestartVerdict::Fatal;
        }
        if self.crashes.len() >= CRASH_THRESHOLD {
            warn!(crashes = self.crashes.len(), "tsserver is crashing frequently");
            return RestartVerdict::Warn;
        }
        RestartVerdict::Proceed
    }

    /// Intentional restarts (configuration or plugin changes) do not count
    /// against the window.
    pub fn reset(&mut self) {
        self.crashes.clear();
    }
}

/// Drain helper used at shutdown: SIGTERM, wait briefly, then kill.
pub async fn terminate(mut child: Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "tsserver exited"),
        _ => {
            warn!("tsserver did not exit after SIGTERM, killing");
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: ServerKind, version: &str) -> SpawnConfig {
        SpawnConfig::new(
            PathBuf::from("/lib/tsserver.js"),
            version.parse().unwrap(),
            kind,
        )
    }

    fn canceller() -> PipeCanceller {
        PipeCanceller::new(PathBuf::from("/tmp/tscancellation-"))
    }

    #[test]
    fn test_args_for_modern_semantic_server() {
        let mut cfg = config(ServerKind::Semantic, "5.3.2");
        cfg.disable_automatic_typing_acquisition = true;
        let args = cfg.server_args(&canceller());
        assert!(args.contains(&"--stdio".to_string()));
        assert!(args.contains(&"--useInferredProjectPerProjectRoot".to_string()));
        assert!(args.contains(&"--disableAutomaticTypingAcquisition".to_string()));
        assert!(!args.contains(&"--syntaxOnly".to_string()));
        let pipe_index = args
            .iter()
            .position(|arg| arg == "--cancellationPipeName")
            .unwrap();
        assert!(args[pipe_index + 1].ends_with('*'));
    }

    #[test]
    fn test_ipc_requested_and_gated() {
        let mut cfg = config(ServerKind::Semantic, "5.0.0");
        cfg.use_node_ipc = true;
        assert!(cfg.server_args(&canceller()).contains(&"--useNodeIpc".to_string()));

        let mut old = config(ServerKind::Semantic, "4.8.4");
        old.use_node_ipc = true;
        let args = old.server_args(&canceller());
        assert!(args.contains(&"--stdio".to_string()));
        assert!(!args.contains(&"--useNodeIpc".to_string()));
    }

    #[test]
    fn test_syntax_server_args() {
        let args = config(ServerKind::Syntax, "4.9.5").server_args(&canceller());
        assert!(args.contains(&"--syntaxOnly".to_string()));
    }

    #[test]
    fn test_log_args_default_verbosity() {
        let mut cfg = config(ServerKind::Semantic, "5.0.0");
        cfg.log_file = Some(PathBuf::from("/tmp/t.log"));
        let args = cfg.server_args(&canceller());
        let index = args.iter().position(|arg| arg == "--logVerbosity").unwrap();
        assert_eq!(args[index + 1], "normal");
    }

    #[test]
    fn test_memory_limit_is_a_node_arg() {
        let mut cfg = config(ServerKind::Semantic, "5.0.0");
        cfg.max_tsserver_memory = Some(4096);
        assert_eq!(cfg.node_args(), vec!["--max-old-space-size=4096"]);
    }

    #[test]
    fn test_restart_tracker_fatal_on_tight_loop() {
        let mut tracker = RestartTracker::new();
        let start = Instant::now();
        for i in 0..4 {
            let verdict = tracker.record_crash_at(start + Duration::from_secs(i));
            assert_eq!(verdict, RestartVerdict::Proceed, "crash {i}");
        }
        assert_eq!(
            tracker.record_crash_at(start + Duration::from_secs(4)),
            RestartVerdict::Fatal
        );
    }

    #[test]
    fn test_restart_tracker_warns_on_slow_loop() {
        let mut tracker = RestartTracker::new();
        let start = Instant::now();
        for i in 0..4 {
            tracker.record_crash_at(start + Duration::from_secs(i * 60));
        }
        assert_eq!(
            tracker.record_crash_at(start + Duration::from_secs(4 * 60)),
            RestartVerdict::Warn
        );
    }

    #[test]
    fn test_restart_tracker_reset_clears_window() {
        let mut tracker = RestartTracker::new();
        let start = Instant::now();
        for i in 0..4 {
            tracker.record_crash_at(start + Duration::from_secs(i));
        }
        tracker.reset();
        assert_eq!(
            tracker.record_crash_at(start + Duration::from_secs(4)),
            RestartVerdict::Proceed
        );
    }

    #[test]
    fn test_instance_dirs_layout() {
        let dirs = InstanceDirs::new().unwrap();
        let prefix = dirs.cancellation_prefix(ServerKind::Semantic);
        assert!(prefix
            .to_string_lossy()
            .contains("typescript-language-server-"));
        assert!(prefix.to_string_lossy().ends_with("tscancellation-semantic."));
        assert!(dirs.path().exists());
    }
}
