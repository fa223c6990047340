//! The LSP endpoint surface
//!
//! `Backend` binds every supported endpoint to the session. It owns no
//! protocol state itself: `initialize` builds the [`Session`] and the
//! handlers delegate into the feature modules.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::request::{
    GotoImplementationParams, GotoImplementationResponse, GotoTypeDefinitionParams,
    GotoTypeDefinitionResponse,
};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};
use tsbridge_tsserver::{LogVerbosity, TsServerError};

use crate::diagnostics::{edit_delay, DEFAULT_DEBOUNCE};
use crate::features;
use crate::session::{Session, SessionOptions};

/// Startup knobs resolved before the editor connects (CLI flags).
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub tsserver_path: Option<PathBuf>,
    pub bundled_tsserver_path: Option<PathBuf>,
    pub tsserver_log_file: Option<PathBuf>,
    pub tsserver_log_verbosity: Option<LogVerbosity>,
}

/// `$/typescriptVersion`, pushed once after `initialized`.
#[derive(Debug)]
pub enum TypescriptVersionNotification {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypescriptVersionParams {
    pub version: String,
    pub source: String,
}

impl Notification for TypescriptVersionNotification {
    type Params = TypescriptVersionParams;
    const METHOD: &'static str = "$/typescriptVersion";
}

pub struct Backend {
    client: Client,
    options: BackendOptions,
    crash_flag: Arc<AtomicBool>,
    session: tokio::sync::RwLock<Option<Arc<Session>>>,
}

impl Backend {
    pub fn new(client: Client, options: BackendOptions, crash_flag: Arc<AtomicBool>) -> Self {
        Self {
            client,
            options,
            crash_flag,
            session: tokio::sync::RwLock::new(None),
        }
    }

    async fn session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error {
                code: ErrorCode::ServerError(-32002),
                message: "session not initialized".into(),
                data: None,
            })
    }

    fn capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                        include_text: Some(false),
                    })),
                },
            )),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            completion_provider: Some(CompletionOptions {
                resolve_provider: Some(true),
                trigger_characters: Some(
                    [".", "\"", "'", "`", "/", "@", "<", "#", " "]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                ..Default::default()
            }),
            signature_help_provider: Some(SignatureHelpOptions {
                trigger_characters: Some(vec!["(".into(), ",".into(), "<".into()]),
                retrigger_characters: Some(vec![")".into()]),
                work_done_progress_options: Default::default(),
            }),
            definition_provider: Some(OneOf::Left(true)),
            type_definition_provider: Some(TypeDefinitionProviderCapability::Simple(true)),
            implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
            references_provider: Some(OneOf::Left(true)),
            document_highlight_provider: Some(OneOf::Left(true)),
            document_symbol_provider: Some(OneOf::Left(true)),
            workspace_symbol_provider: Some(OneOf::Left(true)),
            code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
                code_action_kinds: Some(vec![
                    CodeActionKind::QUICKFIX,
                    CodeActionKind::REFACTOR,
                    CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
                ]),
                resolve_provider: Some(true),
                work_done_progress_options: Default::default(),
            })),
            code_lens_provider: Some(CodeLensOptions {
                resolve_provider: Some(true),
            }),
            document_formatting_provider: Some(OneOf::Left(true)),
            document_range_formatting_provider: Some(OneOf::Left(true)),
            rename_provider: Some(OneOf::Right(RenameOptions {
                prepare_provider: Some(true),
                work_done_progress_options: Default::default(),
            })),
            folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
            selection_range_provider: Some(SelectionRangeProviderCapability::Simple(true)),
            semantic_tokens_provider: Some(
                SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                    legend: features::semantic_tokens::legend(),
                    range: Some(true),
                    full: Some(SemanticTokensFullOptions::Bool(true)),
                    work_done_progress_options: Default::default(),
                }),
            ),
            linked_editing_range_provider: Some(LinkedEditingRangeServerCapabilities::Simple(
                true,
            )),
            call_hierarchy_provider: Some(CallHierarchyServerCapability::Simple(true)),
            inlay_hint_provider: Some(OneOf::Left(true)),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: features::workspace::COMMANDS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                work_done_progress_options: Default::default(),
            }),
            workspace: Some(WorkspaceServerCapabilities {
                workspace_folders: None,
                file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                    will_rename: Some(FileOperationRegistrationOptions {
                        filters: vec![FileOperationFilter {
                            scheme: Some("file".into()),
                            pattern: FileOperationPattern {
                                glob: "**/*.{ts,tsx,js,jsx,mts,cts,mjs,cjs}".into(),
                                matches: Some(FileOperationPatternKind::File),
                                options: None,
                            },
                        }],
                    }),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let workspace_root = workspace_root_from_params(&params);
        let options = SessionOptions {
            workspace_root,
            tsserver_path: self.options.tsserver_path.clone(),
            bundled_tsserver_path: self.options.bundled_tsserver_path.clone(),
            log_file: self.options.tsserver_log_file.clone(),
            log_verbosity: self.options.tsserver_log_verbosity,
            initialization_options: params.initialization_options,
            crash_flag: self.crash_flag.clone(),
        };

        let session = Session::initialize(self.client.clone(), options)
            .await
            .map_err(|err| match err {
                TsServerError::Config(message) => Error {
                    code: ErrorCode::InvalidParams,
                    message: message.into(),
                    data: None,
                },
                other => Error {
                    code: ErrorCode::InternalError,
                    message: other.to_string().into(),
                    data: None,
                },
            })?;
        *self.session.write().await = Some(session);

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: Self::capabilities(),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        info!(version = %session.api_version, "session ready");
        self.client
            .send_notification::<TypescriptVersionNotification>(TypescriptVersionParams {
                version: session.api_version.to_string(),
                source: "tsbridge".to_string(),
            })
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(session) = self.session.read().await.clone() {
            session.shutdown().await;
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        let document = params.text_document;
        let Some(path) = session
            .mirror
            .open(document.uri, document.language_id, document.version, document.text)
            .await
        else {
            return;
        };
        session.diagnostics.request_file(&path, DEFAULT_DEBOUNCE).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        match session
            .mirror
            .change(
                &params.text_document.uri,
                params.text_document.version,
                params.content_changes,
            )
            .await
        {
            Ok((path, line_count)) => {
                session
                    .diagnostics
                    .request_file(&path, edit_delay(line_count))
                    .await;
            }
            Err(err) => warn!(%err, "didChange rejected"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        if let Some(path) = session.mirror.close(&params.text_document.uri).await {
            session.diagnostics.forget_file(&path).await;
            // Cross-file errors may move when a buffer reverts to disk.
            session.diagnostics.request_all(DEFAULT_DEBOUNCE).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        let path = session.mirror.path_of(&params.text_document.uri);
        if session.mirror.is_open(&path).await {
            session.diagnostics.request_file(&path, DEFAULT_DEBOUNCE).await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Ok(session) = self.session().await else {
            return;
        };
        debug!("workspace configuration changed");
        session.config.update(&params.settings);
        session.config.push(&session.client).await;
        session.diagnostics.request_all(DEFAULT_DEBOUNCE).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        features::hover::hover(&*self.session().await?, params).await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        features::completions::completion(&*self.session().await?, params).await
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        features::completions::resolve(&*self.session().await?, item).await
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        features::hover::signature_help(&*self.session().await?, params).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        features::navigation::definition(&*self.session().await?, params).await
    }

    async fn goto_type_definition(
        &self,
        params: GotoTypeDefinitionParams,
    ) -> Result<Option<GotoTypeDefinitionResponse>> {
        features::navigation::type_definition(&*self.session().await?, params).await
    }

    async fn goto_implementation(
        &self,
        params: GotoImplementationParams,
    ) -> Result<Option<GotoImplementationResponse>> {
        features::navigation::implementation(&*self.session().await?, params).await
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        features::navigation::references(&*self.session().await?, params).await
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        features::navigation::document_highlight(&*self.session().await?, params).await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        features::navigation::document_symbol(&*self.session().await?, params).await
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        features::navigation::workspace_symbol(&*self.session().await?, params).await
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        features::code_actions::code_action(&*self.session().await?, params).await
    }

    async fn code_action_resolve(&self, action: CodeAction) -> Result<CodeAction> {
        features::code_actions::resolve(&*self.session().await?, action).await
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        features::code_lens::code_lens(&*self.session().await?, params).await
    }

    async fn code_lens_resolve(&self, lens: CodeLens) -> Result<CodeLens> {
        features::code_lens::resolve(&*self.session().await?, lens).await
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        features::editing::formatting(&*self.session().await?, params).await
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        features::editing::range_formatting(&*self.session().await?, params).await
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        features::editing::rename(&*self.session().await?, params).await
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        features::editing::prepare_rename(&*self.session().await?, params).await
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        features::editing::folding_range(&*self.session().await?, params).await
    }

    async fn selection_range(
        &self,
        params: SelectionRangeParams,
    ) -> Result<Option<Vec<SelectionRange>>> {
        features::editing::selection_range(&*self.session().await?, params).await
    }

    async fn linked_editing_range(
        &self,
        params: LinkedEditingRangeParams,
    ) -> Result<Option<LinkedEditingRanges>> {
        features::editing::linked_editing_range(&*self.session().await?, params).await
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        features::semantic_tokens::full(&*self.session().await?, params).await
    }

    async fn semantic_tokens_range(
        &self,
        params: SemanticTokensRangeParams,
    ) -> Result<Option<SemanticTokensRangeResult>> {
        features::semantic_tokens::range(&*self.session().await?, params).await
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        features::inlay_hints::inlay_hint(&*self.session().await?, params).await
    }

    async fn prepare_call_hierarchy(
        &self,
        params: CallHierarchyPrepareParams,
    ) -> Result<Option<Vec<CallHierarchyItem>>> {
        features::call_hierarchy::prepare(&*self.session().await?, params).await
    }

    async fn incoming_calls(
        &self,
        params: CallHierarchyIncomingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
        features::call_hierarchy::incoming_calls(&*self.session().await?, params).await
    }

    async fn outgoing_calls(
        &self,
        params: CallHierarchyOutgoingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
        features::call_hierarchy::outgoing_calls(&*self.session().await?, params).await
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        features::workspace::execute_command(&*self.session().await?, params).await
    }

    async fn will_rename_files(&self, params: RenameFilesParams) -> Result<Option<WorkspaceEdit>> {
        features::workspace::will_rename_files(&*self.session().await?, params).await
    }
}

#[allow(deprecated)]
fn workspace_root_from_params(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        if let Some(folder) = folders.first() {
            if let Ok(path) = folder.uri.to_file_path() {
                return Some(path);
            }
        }
    }
    if let Some(root_uri) = &params.root_uri {
        if let Ok(path) = root_uri.to_file_path() {
            return Some(path);
        }
    }
    params.root_path.as_ref().map(PathBuf::from)
}
