//! The owning session object
//!
//! Created during `initialize` and shared by the endpoint handlers: the
//! supervised tsserver client, the document mirror, the configuration
//! manager and the diagnostics scheduler, plus the pumps that turn server
//! events and lifecycle notices into editor traffic. Nothing here is a
//! global; dropping the session tears the whole stack down.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    Diagnostic, MessageType, NumberOrString, ProgressParams, ProgressParamsValue, Url,
    WorkDoneProgress, WorkDoneProgressBegin, WorkDoneProgressCreateParams, WorkDoneProgressEnd,
};
use tracing::{debug, info, warn};
use tsbridge_protocol::command::{names, CommandSpec, GetSupportedCodeFixes};
use tsbridge_protocol::message::event_names;
use tsbridge_protocol::types::DiagnosticEventBody;
use tsbridge_protocol::ApiVersion;
use tsbridge_tsserver::{
    LaunchConfig, LifecycleNotice, LogVerbosity, RequestOptions, ResponseOutcome, ServerEvent,
    TsClient, TsServerError, VersionResolver,
};

use crate::configuration::ConfigurationManager;
use crate::diagnostics::{
    DiagnosticsPublisher, DiagnosticsScheduler, GetErrExecutor, DEFAULT_DEBOUNCE,
};
use crate::documents::{BufferSync, Document, DocumentMirror};

/// Options resolved before `initialize` (CLI) plus the editor's
/// initialization options.
#[derive(Debug, Default)]
pub struct SessionOptions {
    pub workspace_root: Option<PathBuf>,
    pub tsserver_path: Option<PathBuf>,
    pub bundled_tsserver_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_verbosity: Option<LogVerbosity>,
    pub initialization_options: Option<Value>,
    /// Shared with the binary, which exits 2 when the crash-loop policy
    /// gives up.
    pub crash_flag: Arc<AtomicBool>,
}

/// The `tsserver` block of the initialization options.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TsServerInitOptions {
    path: Option<PathBuf>,
    locale: Option<String>,
    global_plugins: Vec<String>,
    plugin_probe_locations: Vec<PathBuf>,
    npm_location: Option<PathBuf>,
    disable_automatic_typing_acquisition: bool,
    max_ts_server_memory: Option<u64>,
    use_node_ipc: bool,
    use_syntax_server: bool,
}

pub struct Session {
    pub client: TsClient,
    pub mirror: Arc<DocumentMirror>,
    pub config: Arc<ConfigurationManager>,
    pub diagnostics: DiagnosticsScheduler,
    pub lsp: tower_lsp::Client,
    pub api_version: ApiVersion,
    /// Set when the crash-loop policy gave up; the binary exits 2.
    pub crash_loop: Arc<AtomicBool>,
    /// Codes `getCodeFixes` can act on. Fetched once, reset on restart.
    fixable_codes: Mutex<Option<HashSet<String>>>,
}

/// Narrow mirror-facing slice of the client (fences + resource cancels).
struct ClientSync(TsClient);

#[async_trait]
impl BufferSync for ClientSync {
    async fn send_fence(&self, command: &'static str, arguments: Value) {
        self.0.notify(command, arguments).await;
    }

    async fn cancel_inflight_for(&self, path: &str) {
        self.0.cancel_for_resource(path).await;
    }
}

struct ClientGetErr(TsClient);

#[async_trait]
impl GetErrExecutor for ClientGetErr {
    async fn geterr(
        &self,
        files: Vec<String>,
        token: CancellationToken,
    ) -> ResponseOutcome<Value> {
        let options = RequestOptions {
            token: Some(token),
            ..Default::default()
        };
        self.0
            .execute_async(names::GETERR, json!({ "files": files, "delay": 0 }), options)
            .await
    }
}

struct LspPublisher(tower_lsp::Client);

#[async_trait]
impl DiagnosticsPublisher for LspPublisher {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.0.publish_diagnostics(uri, diagnostics, version).await;
    }
}

impl Session {
    /// Resolve, spawn and wire everything. Fails only on configuration
    /// problems; a missing tsserver is one.
    pub async fn initialize(
        lsp: tower_lsp::Client,
        options: SessionOptions,
    ) -> Result<Arc<Self>, TsServerError> {
        let init_options = options.initialization_options.unwrap_or(Value::Null);
        let tsserver_options: TsServerInitOptions = match init_options.get("tsserver") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| TsServerError::Config(format!("invalid tsserver options: {err}")))?,
            None => TsServerInitOptions::default(),
        };

        let user_path = options.tsserver_path.or(tsserver_options.path);
        let resolver = VersionResolver::new(
            user_path,
            options.workspace_root.iter().cloned().collect(),
            options.bundled_tsserver_path,
        );
        let (resolution, warnings) = resolver.resolve();
        for warning in &warnings {
            lsp.show_message(MessageType::WARNING, warning.clone()).await;
        }
        let resolution = resolution.ok_or(TsServerError::NotFound)?;
        let api_version = resolution.version.clone();
        info!(version = %api_version, path = %resolution.tsserver_path.display(), "resolved tsserver");

        let launch = LaunchConfig {
            log_file: options.log_file,
            log_verbosity: options.log_verbosity,
            locale: tsserver_options.locale,
            global_plugins: tsserver_options.global_plugins,
            plugin_probe_locations: tsserver_options.plugin_probe_locations,
            npm_location: tsserver_options.npm_location,
            disable_automatic_typing_acquisition: tsserver_options
                .disable_automatic_typing_acquisition,
            max_tsserver_memory: tsserver_options.max_ts_server_memory,
            use_node_ipc: tsserver_options.use_node_ipc,
            use_syntax_server: tsserver_options.use_syntax_server,
        };

        let (client, events, notices) = TsClient::new(resolution, launch)?;
        client.start().await?;

        let config = Arc::new(ConfigurationManager::new(options.workspace_root.clone()));
        if !init_options.is_null() {
            config.update(&init_options);
        }

        let crash_flag = options.crash_flag;
        let mirror = Arc::new(DocumentMirror::new(
            Arc::new(ClientSync(client.clone())),
            options.workspace_root,
        ));
        let diagnostics = DiagnosticsScheduler::new(
            Arc::new(ClientGetErr(client.clone())),
            Arc::new(LspPublisher(lsp.clone())),
            mirror.clone(),
            config.clone(),
        );

        config.push(&client).await;

        let session = Arc::new(Self {
            client,
            mirror,
            config,
            diagnostics,
            lsp,
            api_version,
            crash_loop: crash_flag,
            fixable_codes: Mutex::new(None),
        });

        session.clone().spawn_event_pump(events);
        session.clone().spawn_notice_pump(notices);
        Ok(session)
    }

    fn spawn_event_pump(self: Arc<Self>, mut events: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
        tokio::spawn(async move {
            let mut progress_active = false;
            while let Some(ServerEvent { event, .. }) = events.recv().await {
                match event.event.as_str() {
                    event_names::SYNTAX_DIAG
                    | event_names::SEMANTIC_DIAG
                    | event_names::SUGGESTION_DIAG => {
                        let Some(body) = event.body else { continue };
                        match serde_json::from_value::<DiagnosticEventBody>(body) {
                            Ok(parsed) => {
                                self.diagnostics.handle_event(&event.event, parsed).await
                            }
                            Err(err) => warn!(%err, "undecodable diagnostics event"),
                        }
                    }
                    event_names::PROJECT_LOADING_START => {
                        if !progress_active {
                            progress_active = true;
                            self.project_loading_progress(true).await;
                        }
                    }
                    event_names::PROJECT_LOADING_FINISH => {
                        if progress_active {
                            progress_active = false;
                            self.project_loading_progress(false).await;
                        }
                    }
                    event_names::PROJECTS_UPDATED_IN_BACKGROUND => {
                        self.diagnostics.request_all(DEFAULT_DEBOUNCE).await;
                    }
                    event_names::TYPES_INSTALLER_INITIALIZATION_FAILED => {
                        self.lsp
                            .show_message(
                                MessageType::WARNING,
                                "The automatic types installer could not start.",
                            )
                            .await;
                    }
                    // Unknown event kinds are logged and discarded.
                    other => debug!(event = other, "ignoring tsserver event"),
                }
            }
        });
    }

    fn spawn_notice_pump(
        self: Arc<Self>,
        mut notices: tokio::sync::mpsc::UnboundedReceiver<LifecycleNotice>,
    ) {
        tokio::spawn(async move {
            while let Some(notice) = notices.recv().await {
                match notice {
                    LifecycleNotice::Started { version } => {
                        debug!(%version, "tsserver started");
                        self.lsp
                            .log_message(
                                MessageType::INFO,
                                format!("Using TypeScript {version}"),
                            )
                            .await;
                    }
                    LifecycleNotice::Restarted => {
                        // Fresh process: replay buffers, re-push settings,
                        // forget the old capability cache, re-lint.
                        *self.fixable_codes.lock().await = None;
                        self.mirror.replay_open().await;
                        self.config.push(&self.client).await;
                        self.diagnostics.request_all(DEFAULT_DEBOUNCE).await;
                    }
                    LifecycleNotice::CrashWarning => {
                        self.lsp
                            .show_message(
                                MessageType::WARNING,
                                "The TypeScript server is crashing repeatedly.",
                            )
                            .await;
                    }
                    LifecycleNotice::Fatal { message } => {
                        self.crash_loop.store(true, Ordering::SeqCst);
                        self.lsp.show_message(MessageType::ERROR, message).await;
                    }
                }
            }
        });
    }

    async fn project_loading_progress(&self, begin: bool) {
        let token = NumberOrString::String("tsbridge/projectLoading".into());
        if begin {
            let created = self
                .lsp
                .send_request::<tower_lsp::lsp_types::request::WorkDoneProgressCreate>(
                    WorkDoneProgressCreateParams {
                        token: token.clone(),
                    },
                )
                .await;
            if created.is_err() {
                return;
            }
            self.lsp
                .send_notification::<tower_lsp::lsp_types::notification::Progress>(ProgressParams {
                    token,
                    value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(
                        WorkDoneProgressBegin {
                            title: "Loading project".into(),
                            ..Default::default()
                        },
                    )),
                })
                .await;
        } else {
            self.lsp
                .send_notification::<tower_lsp::lsp_types::notification::Progress>(ProgressParams {
                    token,
                    value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(
                        WorkDoneProgressEnd { message: None },
                    )),
                })
                .await;
        }
    }

    /// Document snapshot for a URI, if mirrored.
    pub async fn document(&self, uri: &Url) -> Option<Document> {
        let path = self.mirror.path_of(uri);
        self.mirror.snapshot(&path).await
    }

    /// Typed execute shorthand.
    pub async fn execute<C: CommandSpec>(
        &self,
        args: C::Args,
        options: RequestOptions,
    ) -> ResponseOutcome<C::Body> {
        self.client.execute::<C>(args, options).await
    }

    /// The lazily fetched set of fixable diagnostic codes.
    pub async fn fixable_codes(&self) -> HashSet<String> {
        let mut cached = self.fixable_codes.lock().await;
        if let Some(codes) = cached.as_ref() {
            return codes.clone();
        }
        let codes: HashSet<String> = match self
            .client
            .execute::<GetSupportedCodeFixes>((), RequestOptions::default())
            .await
        {
            ResponseOutcome::Response(codes) => codes.into_iter().collect(),
            _ => return HashSet::new(),
        };
        *cached = Some(codes.clone());
        codes
    }

    /// Drain and dispose; every pending request resolves `Cancelled`.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }
}
