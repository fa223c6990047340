//! The typed tsserver client and its lifecycle supervisor
//!
//! [`TsClient`] is what the rest of the adapter talks to: typed `execute`,
//! `execute_async` and `notify` entrypoints, routing between the semantic
//! and optional syntax server, and the crash/restart policy. Server state
//! is a tagged variant; only `Running` accepts requests, everything else
//! answers `NoServer`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};
use tsbridge_protocol::command::{self, CommandSpec};
use tsbridge_protocol::ApiVersion;

use crate::client::{spawn_actor, ExitReason, RequestOptions, ServerEvent, ServerHandle};
use crate::error::{Result, TsServerError};
use crate::outcome::ResponseOutcome;
use crate::process::{
    spawn_server, InstanceDirs, LogVerbosity, RestartTracker, RestartVerdict, ServerKind,
    SpawnConfig,
};
use crate::resolver::TsServerResolution;
use crate::router::{ExecutionTarget, RouteTarget, RouterState, SyntaxRouter};

/// Launch options that survive restarts.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    pub log_file: Option<std::path::PathBuf>,
    pub log_verbosity: Option<LogVerbosity>,
    pub locale: Option<String>,
    pub global_plugins: Vec<String>,
    pub plugin_probe_locations: Vec<std::path::PathBuf>,
    pub npm_location: Option<std::path::PathBuf>,
    pub disable_automatic_typing_acquisition: bool,
    pub max_tsserver_memory: Option<u64>,
    pub use_node_ipc: bool,
    /// Run the syntax-only sidecar when the version allows it.
    pub use_syntax_server: bool,
}

/// Lifecycle notices the session reacts to (re-opening buffers, user
/// messages). Crash notifications are throttled by the restart policy.
#[derive(Debug, Clone)]
pub enum LifecycleNotice {
    Started { version: ApiVersion },
    /// A new process is up after a crash; mirror state must be replayed.
    Restarted,
    CrashWarning,
    Fatal { message: String },
}

enum ServerState {
    None,
    Running(RunningServers),
    Errored { message: String },
}

struct RunningServers {
    generation: u64,
    primary: ServerHandle,
    syntax: Option<ServerHandle>,
}

struct Inner {
    resolution: TsServerResolution,
    launch: LaunchConfig,
    dirs: InstanceDirs,
    state: RwLock<ServerState>,
    /// Serializes restarts so two exits cannot both respawn.
    lifecycle: Mutex<()>,
    tracker: Mutex<RestartTracker>,
    generation: AtomicU64,
    router: SyntaxRouter,
    events_in: mpsc::UnboundedSender<ServerEvent>,
    notices: mpsc::UnboundedSender<LifecycleNotice>,
}

/// Handle to the supervised server pair. Clones share one supervisor.
#[derive(Clone)]
pub struct TsClient {
    inner: Arc<Inner>,
}

impl TsClient {
    /// Build the client. Events (diagnostics and friends, in arrival
    /// order) and lifecycle notices are delivered on the returned
    /// receivers.
    pub fn new(
        resolution: TsServerResolution,
        launch: LaunchConfig,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<LifecycleNotice>,
    )> {
        let dirs = InstanceDirs::new()?;
        let router = SyntaxRouter::new(Arc::new(RouterState::default()));
        let (events_in, mut events_internal) = mpsc::unbounded_channel::<ServerEvent>();
        let (events_out, events_rx) = mpsc::unbounded_channel();
        let (notices, notices_rx) = mpsc::unbounded_channel();

        // Single multiplexer: watch project-loading state here, then hand
        // the event to the session untouched.
        let forward_router = router.clone();
        tokio::spawn(async move {
            while let Some(event) = events_internal.recv().await {
                forward_router.note_event(&event.event.event);
                if events_out.send(event).is_err() {
                    break;
                }
            }
        });

        let inner = Arc::new(Inner {
            resolution,
            launch,
            dirs,
            state: RwLock::new(ServerState::None),
            lifecycle: Mutex::new(()),
            tracker: Mutex::new(RestartTracker::new()),
            generation: AtomicU64::new(0),
            router,
            events_in,
            notices,
        });

        Ok((Self { inner }, events_rx, notices_rx))
    }

    pub fn api_version(&self) -> ApiVersion {
        self.inner.resolution.version.clone()
    }

    pub fn router(&self) -> &SyntaxRouter {
        &self.inner.router
    }

    /// Spawn the initial process pair.
    pub async fn start(&self) -> Result<ApiVersion> {
        let _guard = self.inner.lifecycle.lock().await;
        self.spawn_generation().await?;
        let version = self.inner.resolution.version.clone();
        let _ = self
            .inner
            .notices
            .send(LifecycleNotice::Started {
                version: version.clone(),
            });
        Ok(version)
    }

    async fn spawn_generation(&self) -> Result<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let version = &self.inner.resolution.version;

        let primary = self.spawn_kind(ServerKind::Semantic, generation)?;
        let syntax = if self.inner.launch.use_syntax_server && version.supports_syntax_server() {
            match self.spawn_kind(ServerKind::Syntax, generation) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(%err, "syntax server failed to start, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        *self.inner.state.write().await = ServerState::Running(RunningServers {
            generation,
            primary,
            syntax,
        });
        Ok(())
    }

    fn spawn_kind(&self, kind: ServerKind, generation: u64) -> Result<ServerHandle> {
        let launch = &self.inner.launch;
        let mut config = SpawnConfig::new(
            self.inner.resolution.tsserver_path.clone(),
            self.inner.resolution.version.clone(),
            kind,
        );
        config.log_verbosity = launch.log_verbosity;
        config.log_file = match (&launch.log_file, launch.log_verbosity) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(_)) => Some(self.inner.dirs.default_log_file(kind)),
            (None, None) => None,
        };
        config.locale = launch.locale.clone();
        config.global_plugins = launch.global_plugins.clone();
        config.plugin_probe_locations = launch.plugin_probe_locations.clone();
        config.npm_location = launch.npm_location.clone();
        config.disable_automatic_typing_acquisition = launch.disable_automatic_typing_acquisition;
        config.max_tsserver_memory = launch.max_tsserver_memory;
        config.use_node_ipc = launch.use_node_ipc;

        let spawned = spawn_server(&config, &self.inner.dirs)?;
        let (handle, join) = spawn_actor(spawned, self.inner.events_in.clone());

        let watcher = self.clone();
        tokio::spawn(async move {
            let reason = match join.await {
                Ok(reason) => reason,
                Err(err) => {
                    error!(%err, "server actor panicked");
                    ExitReason::ProcessExited
                }
            };
            watcher.handle_exit(kind, generation, reason).await;
        });

        Ok(handle)
    }

    async fn handle_exit(&self, kind: ServerKind, generation: u64, reason: ExitReason) {
        if matches!(reason, ExitReason::Shutdown) {
            return;
        }
        let _guard = self.inner.lifecycle.lock().await;

        // A restart already replaced this generation; stale exit.
        {
            let state = self.inner.state.read().await;
            match &*state {
                ServerState::Running(running) if running.generation == generation => {}
                _ => return,
            }
        }

        let detail = match &reason {
            ExitReason::FatalError(message) => format!("fatal error: {message}"),
            ExitReason::Protocol(err) => format!("protocol error: {err}"),
            ExitReason::ProcessExited => "process exited".to_string(),
            ExitReason::Shutdown => unreachable!(),
        };
        warn!(server = kind.label(), %detail, "tsserver went down");

        // Kill the sibling too; buffer state cannot be trusted half-replayed.
        if let ServerState::Running(running) =
            std::mem::replace(&mut *self.inner.state.write().await, ServerState::None)
        {
            running.primary.shutdown().await;
            if let Some(syntax) = running.syntax {
                syntax.shutdown().await;
            }
        }

        let verdict = self.inner.tracker.lock().await.record_crash();
        match verdict {
            RestartVerdict::Fatal => {
                let message = format!(
                    "The TypeScript server crashed repeatedly ({detail}); not restarting."
                );
                error!("{message}");
                *self.inner.state.write().await = ServerState::Errored {
                    message: message.clone(),
                };
                let _ = self.inner.notices.send(LifecycleNotice::Fatal { message });
            }
            verdict => {
                if verdict == RestartVerdict::Warn {
                    let _ = self.inner.notices.send(LifecycleNotice::CrashWarning);
                }
                match self.spawn_generation().await {
                    Ok(()) => {
                        info!(server = kind.label(), "tsserver restarted");
                        let _ = self.inner.notices.send(LifecycleNotice::Restarted);
                    }
                    Err(err) => {
                        let message = format!("failed to restart tsserver: {err}");
                        error!("{message}");
                        *self.inner.state.write().await = ServerState::Errored {
                            message: message.clone(),
                        };
                        let _ = self.inner.notices.send(LifecycleNotice::Fatal { message });
                    }
                }
            }
        }
    }

    /// Intentional restart (configuration or plugin change). Resets the
    /// crash window and replays nothing itself; the session re-opens
    /// buffers on the `Restarted` notice.
    pub async fn restart(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.tracker.lock().await.reset();
        if let ServerState::Running(running) =
            std::mem::replace(&mut *self.inner.state.write().await, ServerState::None)
        {
            running.primary.shutdown().await;
            if let Some(syntax) = running.syntax {
                syntax.shutdown().await;
            }
        }
        self.spawn_generation().await?;
        let _ = self.inner.notices.send(LifecycleNotice::Restarted);
        Ok(())
    }

    /// Orderly dispose: flush, cancel with "server disposed", SIGTERM.
    pub async fn shutdown(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        if let ServerState::Running(running) =
            std::mem::replace(&mut *self.inner.state.write().await, ServerState::None)
        {
            running.primary.shutdown().await;
            if let Some(syntax) = running.syntax {
                syntax.shutdown().await;
            }
        }
    }

    async fn handles_for(
        &self,
        command: &str,
        target: Option<ExecutionTarget>,
    ) -> std::result::Result<(ServerHandle, Option<ServerHandle>), ResponseOutcome<Value>> {
        let state = self.inner.state.read().await;
        let running = match &*state {
            ServerState::Running(running) => running,
            _ => return Err(ResponseOutcome::NoServer),
        };
        match (&running.syntax, self.inner.router.route(command, target)) {
            // Single-server setups route everything to the one process.
            (None, _) => Ok((running.primary.clone(), None)),
            (Some(syntax), RouteTarget::Syntax) => Ok((syntax.clone(), None)),
            (Some(_), RouteTarget::Semantic) => Ok((running.primary.clone(), None)),
            (Some(syntax), RouteTarget::Both) => {
                Ok((running.primary.clone(), Some(syntax.clone())))
            }
        }
    }

    /// Execute a typed command and decode its body.
    pub async fn execute<C: CommandSpec>(
        &self,
        args: C::Args,
        options: RequestOptions,
    ) -> ResponseOutcome<C::Body> {
        self.execute_targeted::<C>(args, options, None).await
    }

    /// Execute with an explicit routing override.
    pub async fn execute_targeted<C: CommandSpec>(
        &self,
        args: C::Args,
        options: RequestOptions,
        target: Option<ExecutionTarget>,
    ) -> ResponseOutcome<C::Body> {
        let arguments = match serde_json::to_value(&args) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                error!(command = C::COMMAND, %err, "unserializable arguments");
                return ResponseOutcome::ServerError(format!(
                    "could not serialize {} arguments",
                    C::COMMAND
                ));
            }
        };
        let outcome = self
            .execute_raw(C::COMMAND, arguments, options, target)
            .await;
        outcome.map(decode::<C>).and_then_body()
    }

    /// Untyped execution; the building block for the typed surface and for
    /// async commands whose payload arrives as events.
    pub async fn execute_raw(
        &self,
        command: &str,
        arguments: Option<Value>,
        options: RequestOptions,
        target: Option<ExecutionTarget>,
    ) -> ResponseOutcome<Value> {
        let (primary, fan_out) = match self.handles_for(command, target).await {
            Ok(handles) => handles,
            Err(outcome) => return outcome,
        };

        match fan_out {
            None => primary.request(command, arguments, options).await,
            Some(secondary) => {
                // Shared command on two servers: the semantic answer is
                // authoritative; divergence is fatal.
                let (first, second) = tokio::join!(
                    primary.request(command, arguments.clone(), options.clone()),
                    secondary.request(command, arguments, options)
                );
                let diverged = matches!(
                    (&first, &second),
                    (ResponseOutcome::Response(_) | ResponseOutcome::NoContent, ResponseOutcome::ServerError(_))
                        | (ResponseOutcome::ServerError(_), ResponseOutcome::Response(_) | ResponseOutcome::NoContent)
                );
                if diverged {
                    let message = "syntax and semantic servers diverged on a shared command";
                    error!(command, message);
                    self.fatal_error(message).await;
                }
                first
            }
        }
    }

    /// Async request (`geterr*`): resolves on `requestCompleted`; the
    /// payload arrives separately as events.
    pub async fn execute_async(
        &self,
        command: &str,
        arguments: Value,
        options: RequestOptions,
    ) -> ResponseOutcome<Value> {
        debug_assert!(command::is_async(command));
        self.execute_raw(command, Some(arguments), options, None)
            .await
    }

    /// Fire-and-forget fence traffic (`open`/`change`/`close`).
    pub async fn notify(&self, command: &str, arguments: Value) {
        if let Ok((primary, fan_out)) = self.handles_for(command, None).await {
            primary.notify(command, Some(arguments.clone()));
            if let Some(secondary) = fan_out {
                secondary.notify(command, Some(arguments));
            }
        }
    }

    /// Cancel every inflight request scoped to `path`, on both servers.
    pub async fn cancel_for_resource(&self, path: &str) {
        let state = self.inner.state.read().await;
        if let ServerState::Running(running) = &*state {
            running.primary.cancel_for_resource(path);
            if let Some(syntax) = &running.syntax {
                syntax.cancel_for_resource(path);
            }
        }
    }

    /// Escalation point for unrecoverable request failures: kill and
    /// restart the pair.
    pub async fn fatal_error(&self, message: &str) {
        error!(%message, "killing tsserver after fatal error");
        let _guard = self.inner.lifecycle.lock().await;
        if let ServerState::Running(running) =
            std::mem::replace(&mut *self.inner.state.write().await, ServerState::None)
        {
            running.primary.shutdown().await;
            if let Some(syntax) = running.syntax {
                syntax.shutdown().await;
            }
        }
        // The exit watchers see a stale generation, so restart here.
        if self.spawn_generation().await.is_ok() {
            let _ = self.inner.notices.send(LifecycleNotice::Restarted);
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.inner.state.read().await, ServerState::Running(_))
    }

    /// The error message when the server pair is gone for good.
    pub async fn fatal_message(&self) -> Option<String> {
        match &*self.inner.state.read().await {
            ServerState::Errored { message } => Some(message.clone()),
            _ => None,
        }
    }
}

fn decode<C: CommandSpec>(body: Value) -> ResponseOutcome<C::Body> {
    match serde_json::from_value::<C::Body>(body) {
        Ok(decoded) => ResponseOutcome::Response(decoded),
        Err(err) => {
            warn!(command = C::COMMAND, %err, "undecodable response body");
            ResponseOutcome::ServerError(format!("malformed {} response", C::COMMAND))
        }
    }
}

/// Local helper: flatten `ResponseOutcome<ResponseOutcome<T>>` produced by
/// mapping a decoder over an outcome.
trait AndThenBody<T> {
    fn and_then_body(self) -> ResponseOutcome<T>;
}

impl<T> AndThenBody<T> for ResponseOutcome<ResponseOutcome<T>> {
    fn and_then_body(self) -> ResponseOutcome<T> {
        match self {
            ResponseOutcome::Response(inner) => inner,
            ResponseOutcome::NoContent => ResponseOutcome::NoContent,
            ResponseOutcome::Cancelled(reason) => ResponseOutcome::Cancelled(reason),
            ResponseOutcome::NoServer => ResponseOutcome::NoServer,
            ResponseOutcome::ServerError(message) => ResponseOutcome::ServerError(message),
        }
    }
}

impl std::fmt::Debug for TsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsClient")
            .field("version", &self.inner.resolution.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_then_body_flattens() {
        let nested: ResponseOutcome<ResponseOutcome<u32>> =
            ResponseOutcome::Response(ResponseOutcome::Response(1));
        assert_eq!(nested.and_then_body(), ResponseOutcome::Response(1));

        let cancelled: ResponseOutcome<ResponseOutcome<u32>> =
            ResponseOutcome::Cancelled("x".into());
        assert_eq!(
            cancelled.and_then_body(),
            ResponseOutcome::Cancelled("x".into())
        );
    }
}
