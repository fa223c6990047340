//! Edit-to-publish pipeline tests
//!
//! Drives the document mirror and the diagnostics scheduler together over
//! fakes: an edit marks the buffer dirty, the debounce coalesces, one
//! geterr batch goes out, and pushed events surface as published
//! diagnostics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    Diagnostic, NumberOrString, Position, Range, TextDocumentContentChangeEvent, Url,
};
use tsbridge_protocol::types::{DiagnosticEventBody, Location, TsDiagnostic};
use tsbridge_session::configuration::ConfigurationManager;
use tsbridge_session::diagnostics::{
    edit_delay, DiagnosticsPublisher, DiagnosticsScheduler, GetErrExecutor,
};
use tsbridge_session::documents::{BufferSync, DocumentMirror};
use tsbridge_tsserver::ResponseOutcome;

#[derive(Default)]
struct FenceRecorder {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl BufferSync for FenceRecorder {
    async fn send_fence(&self, command: &'static str, _arguments: Value) {
        self.commands.lock().await.push(command.to_string());
    }

    async fn cancel_inflight_for(&self, _path: &str) {}
}

#[derive(Default)]
struct BatchRecorder {
    batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl GetErrExecutor for BatchRecorder {
    async fn geterr(
        &self,
        files: Vec<String>,
        _token: CancellationToken,
    ) -> ResponseOutcome<Value> {
        self.batches.lock().await.push(files);
        ResponseOutcome::NoContent
    }
}

#[derive(Default)]
struct PublishRecorder {
    published: Mutex<Vec<(Url, Vec<Diagnostic>)>>,
}

#[async_trait]
impl DiagnosticsPublisher for PublishRecorder {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, _version: Option<i32>) {
        self.published.lock().await.push((uri, diagnostics));
    }
}

struct Fixture {
    mirror: Arc<DocumentMirror>,
    scheduler: DiagnosticsScheduler,
    fences: Arc<FenceRecorder>,
    batches: Arc<BatchRecorder>,
    published: Arc<PublishRecorder>,
}

fn fixture() -> Fixture {
    let fences = Arc::new(FenceRecorder::default());
    let batches = Arc::new(BatchRecorder::default());
    let published = Arc::new(PublishRecorder::default());
    let mirror = Arc::new(DocumentMirror::new(fences.clone(), None));
    let config = Arc::new(ConfigurationManager::new(None));
    let scheduler = DiagnosticsScheduler::new(
        batches.clone(),
        published.clone(),
        mirror.clone(),
        config,
    );
    Fixture {
        mirror,
        scheduler,
        fences,
        batches,
        published,
    }
}

fn uri() -> Url {
    Url::parse("file:///p/a.ts").unwrap()
}

fn assignability_error() -> TsDiagnostic {
    TsDiagnostic {
        start: Location::new(1, 7),
        end: Location::new(1, 13),
        text: "Type 'string' is not assignable to type 'number'.".into(),
        category: "error".into(),
        code: Some(2322),
        source: None,
        reports_unnecessary: None,
        reports_deprecated: None,
        related_information: None,
    }
}

#[tokio::test(start_paused = true)]
async fn change_triggers_debounced_diagnostics() {
    let fixture = fixture();
    fixture
        .mirror
        .open(uri(), "typescript".into(), 1, "const x: number = 1;\n".into())
        .await
        .unwrap();

    let (path, line_count) = fixture
        .mirror
        .change(
            &uri(),
            2,
            vec![TextDocumentContentChangeEvent {
                range: Some(Range::new(Position::new(0, 18), Position::new(0, 19))),
                range_length: None,
                text: "\"x\"".into(),
            }],
        )
        .await
        .unwrap();
    fixture.scheduler.request_file(&path, edit_delay(line_count)).await;

    // Nothing may fire before the debounce elapses.
    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::task::yield_now().await;
    assert!(fixture.batches.batches.lock().await.is_empty());

    tokio::time::advance(Duration::from_millis(600)).await;
    tokio::task::yield_now().await;
    let batches = fixture.batches.batches.lock().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec!["/p/a.ts".to_string()]);
    drop(batches);

    // The pushed event lands as exactly one published diagnostic.
    fixture
        .scheduler
        .handle_event(
            "semanticDiag",
            DiagnosticEventBody {
                file: "/p/a.ts".into(),
                diagnostics: vec![assignability_error()],
            },
        )
        .await;

    let published = fixture.published.published.lock().await;
    assert_eq!(published.len(), 1);
    let (published_uri, diagnostics) = &published[0];
    assert_eq!(published_uri, &uri());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, Some(NumberOrString::Number(2322)));
    assert_eq!(diagnostics[0].range.start, Position::new(0, 6));
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_produce_one_batch() {
    let fixture = fixture();
    fixture
        .mirror
        .open(uri(), "typescript".into(), 1, "let a = 1;\n".into())
        .await
        .unwrap();

    for version in 2..7 {
        let (path, line_count) = fixture
            .mirror
            .change(
                &uri(),
                version,
                vec![TextDocumentContentChangeEvent {
                    range: Some(Range::new(Position::new(0, 8), Position::new(0, 9))),
                    range_length: None,
                    text: version.to_string(),
                }],
            )
            .await
            .unwrap();
        fixture.scheduler.request_file(&path, edit_delay(line_count)).await;
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    tokio::time::advance(Duration::from_millis(900)).await;
    tokio::task::yield_now().await;
    assert_eq!(fixture.batches.batches.lock().await.len(), 1);

    // The buffer saw the whole edit burst in order.
    let fences = fixture.fences.commands.lock().await;
    assert_eq!(
        *fences,
        vec!["open", "change", "change", "change", "change", "change"]
    );
}

#[tokio::test]
async fn closing_clears_published_diagnostics() {
    let fixture = fixture();
    fixture
        .mirror
        .open(uri(), "typescript".into(), 1, "const x = 1;\n".into())
        .await
        .unwrap();

    fixture
        .scheduler
        .handle_event(
            "semanticDiag",
            DiagnosticEventBody {
                file: "/p/a.ts".into(),
                diagnostics: vec![assignability_error()],
            },
        )
        .await;
    let path = fixture.mirror.close(&uri()).await.unwrap();
    fixture.scheduler.forget_file(&path).await;

    let published = fixture.published.published.lock().await;
    assert_eq!(published.len(), 2);
    assert!(published[1].1.is_empty());
}
