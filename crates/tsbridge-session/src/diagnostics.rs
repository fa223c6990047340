//! The debounced diagnostics pipeline
//!
//! tsserver pushes diagnostics: a `geterr` request fans out into
//! `syntaxDiag`/`semanticDiag`/`suggestionDiag` events per file, terminated
//! by `requestCompleted`. The scheduler coalesces dirty files behind a
//! debounce, keeps at most one batch alive (a new one cancels its
//! predecessor), and republishes the combined per-file set on every event.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticTag, Location as LspLocation,
    NumberOrString, Url,
};
use tracing::{debug, warn};
use tsbridge_protocol::filepath::uri_from_path;
use tsbridge_protocol::message::event_names;
use tsbridge_protocol::types::{DiagnosticEventBody, TsDiagnostic};
use tsbridge_tsserver::ResponseOutcome;

use crate::configuration::ConfigurationManager;
use crate::convert::{range_from_ts, severity_from_category};
use crate::documents::DocumentMirror;

/// Default debounce between an edit burst and the batch it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Per-edit re-request delay scales with buffer size, clamped to keep both
/// small and huge files responsive.
pub fn edit_delay(line_count: u32) -> Duration {
    let millis = (line_count as u64).div_ceil(20).clamp(300, 800);
    Duration::from_millis(millis)
}

/// How a batch is issued; the session wires this to the tsserver client.
#[async_trait]
pub trait GetErrExecutor: Send + Sync {
    async fn geterr(&self, files: Vec<String>, token: CancellationToken)
        -> ResponseOutcome<Value>;
}

/// Where translated diagnostics go; the session wires this to the editor.
#[async_trait]
pub trait DiagnosticsPublisher: Send + Sync {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DiagKind {
    Syntax,
    Semantic,
    Suggestion,
}

impl DiagKind {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            event_names::SYNTAX_DIAG => Some(DiagKind::Syntax),
            event_names::SEMANTIC_DIAG => Some(DiagKind::Semantic),
            event_names::SUGGESTION_DIAG => Some(DiagKind::Suggestion),
            _ => None,
        }
    }
}

#[derive(Default)]
struct FileDiagnostics {
    syntax: Vec<Diagnostic>,
    semantic: Vec<Diagnostic>,
    suggestion: Vec<Diagnostic>,
}

impl FileDiagnostics {
    fn combined(&self) -> Vec<Diagnostic> {
        self.syntax
            .iter()
            .chain(self.semantic.iter())
            .chain(self.suggestion.iter())
            .cloned()
            .collect()
    }
}

struct SchedulerState {
    /// Dirty files ordered by last enqueue; no duplicates.
    pending: Vec<String>,
    /// Invalidates sleeping debounce timers when a newer one supersedes.
    timer_generation: u64,
    /// The single live batch, if any.
    batch: Option<(u64, CancellationToken)>,
    next_batch_id: u64,
    files: HashMap<String, FileDiagnostics>,
}

#[derive(Clone)]
pub struct DiagnosticsScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    executor: Arc<dyn GetErrExecutor>,
    publisher: Arc<dyn DiagnosticsPublisher>,
    mirror: Arc<DocumentMirror>,
    config: Arc<ConfigurationManager>,
    state: Mutex<SchedulerState>,
}

impl DiagnosticsScheduler {
    pub fn new(
        executor: Arc<dyn GetErrExecutor>,
        publisher: Arc<dyn DiagnosticsPublisher>,
        mirror: Arc<DocumentMirror>,
        config: Arc<ConfigurationManager>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                publisher,
                mirror,
                config,
                state: Mutex::new(SchedulerState {
                    pending: Vec::new(),
                    timer_generation: 0,
                    batch: None,
                    next_batch_id: 0,
                    files: HashMap::new(),
                }),
            }),
        }
    }

    /// Mark one file dirty and (re)arm the debounce.
    pub async fn request_file(&self, path: &str, delay: Duration) {
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.pending.retain(|pending| pending != path);
            state.pending.push(path.to_string());
            state.timer_generation += 1;
            state.timer_generation
        };
        self.arm_timer(generation, delay);
    }

    /// Mark every open document dirty; used after close and restart.
    pub async fn request_all(&self, delay: Duration) {
        let open = self.inner.mirror.open_paths().await;
        let generation = {
            let mut state = self.inner.state.lock().await;
            for path in open {
                state.pending.retain(|pending| pending != &path);
                state.pending.push(path);
            }
            state.timer_generation += 1;
            state.timer_generation
        };
        self.arm_timer(generation, delay);
    }

    fn arm_timer(&self, generation: u64, delay: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = scheduler.inner.state.lock().await.timer_generation;
            if current == generation {
                scheduler.fire().await;
            }
        });
    }

    /// Issue the batch: cancel the previous one, merge pending with every
    /// open document, send one `geterr`.
    async fn fire(&self) {
        let open = self.inner.mirror.open_paths().await;
        let (files, token) = {
            let mut state = self.inner.state.lock().await;
            if let Some((_, token)) = state.batch.take() {
                token.cancel();
            }
            let mut files = std::mem::take(&mut state.pending);
            for path in open {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
            if files.is_empty() {
                return;
            }
            let token = CancellationToken::new();
            state.next_batch_id += 1;
            let id = state.next_batch_id;
            state.batch = Some((id, token.clone()));
            (files, (id, token))
        };

        debug!(count = files.len(), "issuing geterr batch");
        let (id, cancel) = token;
        let outcome = self.inner.executor.geterr(files, cancel).await;
        if let ResponseOutcome::ServerError(message) = &outcome {
            warn!(%message, "geterr failed");
        }

        let mut state = self.inner.state.lock().await;
        if matches!(&state.batch, Some((current, _)) if *current == id) {
            state.batch = None;
        }
    }

    /// Preempt diagnostics for latency-sensitive work: cancel the running
    /// batch, run `f`, then re-schedule.
    pub async fn interrupt<T>(&self, f: impl Future<Output = T>) -> T {
        let interrupted = {
            let mut state = self.inner.state.lock().await;
            match state.batch.take() {
                Some((_, token)) => {
                    token.cancel();
                    true
                }
                None => false,
            }
        };
        let result = f.await;
        if interrupted {
            self.request_all(DEFAULT_DEBOUNCE).await;
        }
        result
    }

    /// Translate one diagnostics event and publish the file's combined set.
    pub async fn handle_event(&self, event: &str, body: DiagnosticEventBody) {
        let Some(kind) = DiagKind::from_event(event) else {
            return;
        };
        let ignored = self.inner.config.ignored_codes();
        let translated: Vec<Diagnostic> = body
            .diagnostics
            .iter()
            .filter(|diagnostic| {
                diagnostic
                    .code
                    .map_or(true, |code| !ignored.contains(&code))
            })
            .map(lsp_diagnostic)
            .collect();

        let combined = {
            let mut state = self.inner.state.lock().await;
            let entry = state.files.entry(body.file.clone()).or_default();
            match kind {
                DiagKind::Syntax => entry.syntax = translated,
                DiagKind::Semantic => entry.semantic = translated,
                DiagKind::Suggestion => entry.suggestion = translated,
            }
            entry.combined()
        };

        let Ok(uri) = uri_from_path(&body.file) else {
            warn!(file = %body.file, "diagnostics for unmappable path");
            return;
        };
        let version = self.inner.mirror.version_of(&body.file).await;
        self.inner.publisher.publish(uri, combined, version).await;
    }

    /// Drop a closed file's state and clear its published diagnostics.
    pub async fn forget_file(&self, path: &str) {
        self.inner.state.lock().await.files.remove(path);
        if let Ok(uri) = uri_from_path(path) {
            self.inner.publisher.publish(uri, Vec::new(), None).await;
        }
    }

    #[cfg(test)]
    async fn has_live_batch(&self) -> bool {
        self.inner.state.lock().await.batch.is_some()
    }
}

/// One pushed diagnostic in LSP shape: kind, range, code, source `ts`,
/// with `Unnecessary`/`Deprecated` tags where tsserver marks them.
pub fn lsp_diagnostic(diagnostic: &TsDiagnostic) -> Diagnostic {
    let mut tags = Vec::new();
    if diagnostic.reports_unnecessary.is_some() {
        tags.push(DiagnosticTag::UNNECESSARY);
    }
    if diagnostic.reports_deprecated.is_some() {
        tags.push(DiagnosticTag::DEPRECATED);
    }
    let related_information = diagnostic.related_information.as_ref().map(|related| {
        related
            .iter()
            .filter_map(|info| {
                let span = info.span.as_ref()?;
                let uri = uri_from_path(&span.file).ok()?;
                Some(DiagnosticRelatedInformation {
                    location: LspLocation {
                        uri,
                        range: range_from_ts(tsbridge_protocol::types::TextSpan {
                            start: span.start,
                            end: span.end,
                        }),
                    },
                    message: info.message.clone(),
                })
            })
            .collect()
    });

    Diagnostic {
        range: range_from_ts(tsbridge_protocol::types::TextSpan {
            start: diagnostic.start,
            end: diagnostic.end,
        }),
        severity: Some(severity_from_category(&diagnostic.category)),
        code: diagnostic.code.map(|code| NumberOrString::Number(code as i32)),
        source: Some(diagnostic.source.clone().unwrap_or_else(|| "ts".to_string())),
        message: diagnostic.text.clone(),
        tags: (!tags.is_empty()).then_some(tags),
        related_information,
        ..Diagnostic::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::BufferSync;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower_lsp::lsp_types::Position;
    use tsbridge_protocol::types::Location;

    struct NullSync;

    #[async_trait]
    impl BufferSync for NullSync {
        async fn send_fence(&self, _command: &'static str, _arguments: Value) {}
        async fn cancel_inflight_for(&self, _path: &str) {}
    }

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<Vec<String>>>,
        tokens: Mutex<Vec<CancellationToken>>,
        block: bool,
    }

    #[async_trait]
    impl GetErrExecutor for RecordingExecutor {
        async fn geterr(
            &self,
            files: Vec<String>,
            token: CancellationToken,
        ) -> ResponseOutcome<Value> {
            self.calls.lock().await.push(files);
            self.tokens.lock().await.push(token.clone());
            if self.block {
                token.cancelled().await;
                return ResponseOutcome::Cancelled("batch cancelled".into());
            }
            ResponseOutcome::NoContent
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(Url, Vec<Diagnostic>)>>,
        count: AtomicUsize,
    }

    #[async_trait]
    impl DiagnosticsPublisher for RecordingPublisher {
        async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, _version: Option<i32>) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.published.lock().await.push((uri, diagnostics));
        }
    }

    async fn scheduler(
        block: bool,
    ) -> (
        DiagnosticsScheduler,
        Arc<RecordingExecutor>,
        Arc<RecordingPublisher>,
        Arc<DocumentMirror>,
    ) {
        let executor = Arc::new(RecordingExecutor {
            block,
            ..Default::default()
        });
        let publisher = Arc::new(RecordingPublisher::default());
        let mirror = Arc::new(DocumentMirror::new(Arc::new(NullSync), None));
        let config = Arc::new(ConfigurationManager::new(None));
        let scheduler = DiagnosticsScheduler::new(
            executor.clone(),
            publisher.clone(),
            mirror.clone(),
            config,
        );
        (scheduler, executor, publisher, mirror)
    }

    fn ts_diag(code: i32, text: &str) -> TsDiagnostic {
        TsDiagnostic {
            start: Location::new(1, 7),
            end: Location::new(1, 13),
            text: text.into(),
            category: "error".into(),
            code: Some(code),
            source: None,
            reports_unnecessary: None,
            reports_deprecated: None,
            related_information: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_requests_coalesce_into_one_batch() {
        let (scheduler, executor, _publisher, mirror) = scheduler(false).await;
        mirror
            .open(
                Url::parse("file:///p/a.ts").unwrap(),
                "typescript".into(),
                1,
                "const x = 1;".into(),
            )
            .await;

        for _ in 0..5 {
            scheduler
                .request_file("/p/a.ts", Duration::from_millis(300))
                .await;
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;

        let calls = executor.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["/p/a.ts".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_batch_cancels_previous() {
        let (scheduler, executor, _publisher, _mirror) = scheduler(true).await;

        scheduler
            .request_file("/p/a.ts", Duration::from_millis(10))
            .await;
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.has_live_batch().await);

        scheduler
            .request_file("/p/b.ts", Duration::from_millis(10))
            .await;
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        let tokens = executor.tokens.lock().await;
        assert_eq!(tokens.len(), 2);
        assert!(tokens[0].is_cancelled());
        assert!(!tokens[1].is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_merges_open_documents() {
        let (scheduler, executor, _publisher, mirror) = scheduler(false).await;
        mirror
            .open(
                Url::parse("file:///p/other.ts").unwrap(),
                "typescript".into(),
                1,
                "let y;".into(),
            )
            .await;

        scheduler
            .request_file("/p/a.ts", Duration::from_millis(10))
            .await;
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        let calls = executor.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(&"/p/a.ts".to_string()));
        assert!(calls[0].contains(&"/p/other.ts".to_string()));
        // The explicitly dirtied file keeps its enqueue position.
        assert_eq!(calls[0][0], "/p/a.ts");
    }

    #[tokio::test]
    async fn test_events_publish_combined_per_file() {
        let (scheduler, _executor, publisher, _mirror) = scheduler(false).await;

        scheduler
            .handle_event(
                "syntaxDiag",
                DiagnosticEventBody {
                    file: "/p/a.ts".into(),
                    diagnostics: vec![ts_diag(1005, "';' expected.")],
                },
            )
            .await;
        scheduler
            .handle_event(
                "semanticDiag",
                DiagnosticEventBody {
                    file: "/p/a.ts".into(),
                    diagnostics: vec![ts_diag(2322, "Type 'string' is not assignable.")],
                },
            )
            .await;

        let published = publisher.published.lock().await;
        assert_eq!(published.len(), 2);
        // Second publish carries both kinds.
        assert_eq!(published[1].1.len(), 2);
        assert_eq!(
            published[1].1[1].code,
            Some(NumberOrString::Number(2322))
        );
        assert_eq!(published[1].1[0].source.as_deref(), Some("ts"));
    }

    #[tokio::test]
    async fn test_ignored_codes_are_filtered() {
        let executor = Arc::new(RecordingExecutor::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let mirror = Arc::new(DocumentMirror::new(Arc::new(NullSync), None));
        let config = Arc::new(ConfigurationManager::new(None));
        config.update(&json!({"diagnostics": {"ignoredCodes": [6133]}}));
        let scheduler =
            DiagnosticsScheduler::new(executor, publisher.clone(), mirror, config);

        scheduler
            .handle_event(
                "suggestionDiag",
                DiagnosticEventBody {
                    file: "/p/a.ts".into(),
                    diagnostics: vec![ts_diag(6133, "unused"), ts_diag(2322, "bad type")],
                },
            )
            .await;

        let published = publisher.published.lock().await;
        assert_eq!(published[0].1.len(), 1);
        assert_eq!(published[0].1[0].code, Some(NumberOrString::Number(2322)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_and_reschedules() {
        let (scheduler, executor, _publisher, _mirror) = scheduler(true).await;
        scheduler
            .request_file("/p/a.ts", Duration::from_millis(10))
            .await;
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.has_live_batch().await);

        let value = scheduler.interrupt(async { 42 }).await;
        assert_eq!(value, 42);
        assert!(executor.tokens.lock().await[0].is_cancelled());

        // The interrupted batch is re-armed behind the default debounce.
        tokio::time::advance(DEFAULT_DEBOUNCE + Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert_eq!(executor.calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_edit_delay_clamps() {
        assert_eq!(edit_delay(10), Duration::from_millis(300));
        assert_eq!(edit_delay(6_000), Duration::from_millis(300));
        assert_eq!(edit_delay(10_000), Duration::from_millis(500));
        assert_eq!(edit_delay(1_000_000), Duration::from_millis(800));
    }

    #[test]
    fn test_diagnostic_translation_tags() {
        let mut diagnostic = ts_diag(6385, "deprecated symbol");
        diagnostic.reports_deprecated = Some(json!({}));
        let translated = lsp_diagnostic(&diagnostic);
        assert_eq!(translated.tags, Some(vec![DiagnosticTag::DEPRECATED]));
        assert_eq!(translated.range.start, Position::new(0, 6));
        assert_eq!(translated.severity, Some(tower_lsp::lsp_types::DiagnosticSeverity::ERROR));
    }
}
