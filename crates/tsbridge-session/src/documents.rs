//! The open-document mirror
//!
//! Every document the editor opens is mirrored here and kept in lockstep
//! with tsserver's buffer: `didOpen`/`didChange`/`didClose` become
//! `open`/`change`/`close` fence commands, with incremental edits applied
//! locally against a UTF-16-aware line index. Changes are announced with
//! pre-edit coordinates, and inflight requests scoped to a document are
//! cancelled before its text moves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};
use tracing::{debug, warn};
use tsbridge_protocol::command::names;
use tsbridge_protocol::filepath::path_from_uri;
use tsbridge_protocol::types::{ChangeRequestArgs, OpenRequestArgs};

use crate::convert::{position_to_ts, script_kind_name};
use crate::line_index::LineIndex;

/// The slice of the tsserver client the mirror needs: fence notifications
/// and resource-scoped cancellation. Narrow on purpose, so the mirror and
/// the client do not hold references to each other.
#[async_trait]
pub trait BufferSync: Send + Sync {
    async fn send_fence(&self, command: &'static str, arguments: Value);
    async fn cancel_inflight_for(&self, path: &str);
}

#[derive(Debug, Error, PartialEq)]
pub enum MirrorError {
    #[error("document {0} is not open")]
    NotOpen(String),
    #[error("version {incoming} does not advance {current} for {path}")]
    StaleVersion {
        path: String,
        current: i32,
        incoming: i32,
    },
}

/// One mirrored document.
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: Url,
    pub path: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
    pub line_index: LineIndex,
}

impl Document {
    pub fn line_count(&self) -> u32 {
        self.line_index.line_count()
    }

    pub fn offset_of(&self, position: Position) -> usize {
        self.line_index.offset_of(&self.text, position)
    }

    pub fn position_of(&self, offset: usize) -> Position {
        self.line_index.position_of(&self.text, offset)
    }

    pub fn utf16_offset_of(&self, position: Position) -> u32 {
        self.line_index.utf16_offset_of(&self.text, position)
    }

    pub fn utf16_len(&self) -> u32 {
        self.line_index.utf16_len(&self.text)
    }

    /// The document's end as an LSP position.
    pub fn end_position(&self) -> Position {
        self.line_index.position_of(&self.text, self.text.len())
    }
}

/// Open documents keyed by tsserver path.
pub struct DocumentMirror {
    sync: Arc<dyn BufferSync>,
    workspace_root: Option<PathBuf>,
    documents: RwLock<HashMap<String, Document>>,
}

impl DocumentMirror {
    pub fn new(sync: Arc<dyn BufferSync>, workspace_root: Option<PathBuf>) -> Self {
        Self {
            sync,
            workspace_root,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// The tsserver path for a URI. Pure; does not require the document to
    /// be open.
    pub fn path_of(&self, uri: &Url) -> String {
        path_from_uri(uri)
    }

    /// Mirror a newly opened document. Returns its path, or `None` for
    /// unsupported language ids.
    pub async fn open(
        &self,
        uri: Url,
        language_id: String,
        version: i32,
        text: String,
    ) -> Option<String> {
        let Some(script_kind) = script_kind_name(&language_id) else {
            debug!(%uri, %language_id, "ignoring unsupported language");
            return None;
        };
        let path = path_from_uri(&uri);

        let arguments = OpenRequestArgs {
            file: path.clone(),
            file_content: text.clone(),
            script_kind_name: script_kind.to_string(),
            project_root_path: self
                .workspace_root
                .as_ref()
                .map(|root| root.to_string_lossy().into_owned()),
        };
        self.sync
            .send_fence(names::OPEN, serde_json::to_value(arguments).ok()?)
            .await;

        let document = Document {
            uri,
            path: path.clone(),
            language_id,
            version,
            line_index: LineIndex::new(&text),
            text,
        };
        self.documents.write().await.insert(path.clone(), document);
        Some(path)
    }

    /// Apply incremental edits and forward them. Each `change` names the
    /// range *before* the local edit is applied. Returns the path and the
    /// post-edit line count for diagnostics re-scheduling.
    pub async fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(String, u32), MirrorError> {
        let path = path_from_uri(uri);
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&path)
            .ok_or_else(|| MirrorError::NotOpen(path.clone()))?;
        if version <= document.version {
            return Err(MirrorError::StaleVersion {
                path,
                current: document.version,
                incoming: version,
            });
        }

        // Inflight work against the old text is garbage; flush it first.
        self.sync.cancel_inflight_for(&path).await;

        for change in changes {
            let (start, end, byte_range) = match change.range {
                Some(range) => {
                    let start_byte = document.offset_of(range.start);
                    let end_byte = document.offset_of(range.end);
                    (
                        position_to_ts(range.start),
                        position_to_ts(range.end),
                        start_byte..end_byte,
                    )
                }
                // Full replacement: one change spanning the whole buffer.
                None => (
                    position_to_ts(Position::new(0, 0)),
                    position_to_ts(document.end_position()),
                    0..document.text.len(),
                ),
            };

            let arguments = ChangeRequestArgs {
                file: path.clone(),
                line: start.line,
                offset: start.offset,
                end_line: end.line,
                end_offset: end.offset,
                insert_string: change.text.clone(),
            };
            if let Ok(arguments) = serde_json::to_value(arguments) {
                self.sync.send_fence(names::CHANGE, arguments).await;
            }

            document.text.replace_range(byte_range, &change.text);
            document.line_index = LineIndex::new(&document.text);
        }
        document.version = version;
        let line_count = document.line_count();
        Ok((path, line_count))
    }

    /// Drop the mirror entry and tell tsserver. Returns the path if the
    /// document was open.
    pub async fn close(&self, uri: &Url) -> Option<String> {
        let path = path_from_uri(uri);
        let removed = self.documents.write().await.remove(&path)?;
        self.sync.cancel_inflight_for(&path).await;
        self.sync
            .send_fence(
                names::CLOSE,
                serde_json::json!({ "file": removed.path }),
            )
            .await;
        Some(path)
    }

    /// Re-send `open` for every mirrored document, after a server restart.
    pub async fn replay_open(&self) {
        let documents = self.documents.read().await;
        for document in documents.values() {
            let arguments = OpenRequestArgs {
                file: document.path.clone(),
                file_content: document.text.clone(),
                script_kind_name: script_kind_name(&document.language_id)
                    .unwrap_or("TS")
                    .to_string(),
                project_root_path: self
                    .workspace_root
                    .as_ref()
                    .map(|root| root.to_string_lossy().into_owned()),
            };
            match serde_json::to_value(arguments) {
                Ok(arguments) => self.sync.send_fence(names::OPEN, arguments).await,
                Err(err) => warn!(%err, "could not replay open"),
            }
        }
    }

    pub async fn snapshot(&self, path: &str) -> Option<Document> {
        self.documents.read().await.get(path).cloned()
    }

    pub async fn is_open(&self, path: &str) -> bool {
        self.documents.read().await.contains_key(path)
    }

    pub async fn open_paths(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    pub async fn version_of(&self, path: &str) -> Option<i32> {
        self.documents.read().await.get(path).map(|doc| doc.version)
    }

    pub fn workspace_root(&self) -> Option<&PathBuf> {
        self.workspace_root.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use tower_lsp::lsp_types::Range;

    #[derive(Default)]
    struct RecordingSync {
        sent: Mutex<Vec<(String, Value)>>,
        cancelled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BufferSync for RecordingSync {
        async fn send_fence(&self, command: &'static str, arguments: Value) {
            self.sent.lock().await.push((command.to_string(), arguments));
        }

        async fn cancel_inflight_for(&self, path: &str) {
            self.cancelled.lock().await.push(path.to_string());
        }
    }

    fn uri() -> Url {
        Url::parse("file:///p/a.ts").unwrap()
    }

    fn mirror() -> (Arc<RecordingSync>, DocumentMirror) {
        let sync = Arc::new(RecordingSync::default());
        let mirror = DocumentMirror::new(sync.clone(), Some(PathBuf::from("/p")));
        (sync, mirror)
    }

    #[tokio::test]
    async fn test_open_sends_fence_with_script_kind() {
        let (sync, mirror) = mirror();
        let path = mirror
            .open(uri(), "typescript".into(), 1, "const x = 1;\n".into())
            .await
            .unwrap();
        assert_eq!(path, "/p/a.ts");

        let sent = sync.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "open");
        assert_eq!(sent[0].1["scriptKindName"], "TS");
        assert_eq!(sent[0].1["projectRootPath"], "/p");
        assert_eq!(sent[0].1["fileContent"], "const x = 1;\n");
    }

    #[tokio::test]
    async fn test_unsupported_language_is_rejected() {
        let (sync, mirror) = mirror();
        let path = mirror.open(uri(), "rust".into(), 1, "fn main() {}".into()).await;
        assert!(path.is_none());
        assert!(sync.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_change_sends_pre_edit_coordinates() {
        let (sync, mirror) = mirror();
        mirror
            .open(uri(), "typescript".into(), 1, "const x: number = 1;\n".into())
            .await
            .unwrap();

        // Replace "number" (chars 9..15 on line 0) with "string".
        let change = TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 9), Position::new(0, 15))),
            range_length: None,
            text: "string".into(),
        };
        mirror.change(&uri(), 2, vec![change]).await.unwrap();

        let sent = sync.sent.lock().await;
        let (command, arguments) = &sent[1];
        assert_eq!(command, "change");
        assert_eq!(arguments["line"], 1);
        assert_eq!(arguments["offset"], 10);
        assert_eq!(arguments["endLine"], 1);
        assert_eq!(arguments["endOffset"], 16);
        assert_eq!(arguments["insertString"], "string");

        let doc = mirror.snapshot("/p/a.ts").await.unwrap();
        assert_eq!(doc.text, "const x: string = 1;\n");
        assert_eq!(doc.version, 2);
    }

    #[tokio::test]
    async fn test_change_cancels_inflight_before_applying() {
        let (sync, mirror) = mirror();
        mirror
            .open(uri(), "typescript".into(), 1, "let a = 1;\n".into())
            .await
            .unwrap();
        let change = TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 4), Position::new(0, 5))),
            range_length: None,
            text: "b".into(),
        };
        mirror.change(&uri(), 2, vec![change]).await.unwrap();
        assert_eq!(*sync.cancelled.lock().await, vec!["/p/a.ts".to_string()]);
    }

    #[tokio::test]
    async fn test_version_must_strictly_increase() {
        let (_sync, mirror) = mirror();
        mirror
            .open(uri(), "typescript".into(), 3, "let a = 1;\n".into())
            .await
            .unwrap();
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "let b = 2;\n".into(),
        };
        let result = mirror.change(&uri(), 3, vec![change]).await;
        assert_eq!(
            result,
            Err(MirrorError::StaleVersion {
                path: "/p/a.ts".into(),
                current: 3,
                incoming: 3,
            })
        );
    }

    #[tokio::test]
    async fn test_full_replacement_spans_whole_buffer() {
        let (sync, mirror) = mirror();
        mirror
            .open(uri(), "typescript".into(), 1, "line one\nline two".into())
            .await
            .unwrap();
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "fresh\n".into(),
        };
        mirror.change(&uri(), 2, vec![change]).await.unwrap();

        let sent = sync.sent.lock().await;
        let (_, arguments) = &sent[1];
        assert_eq!(arguments["line"], 1);
        assert_eq!(arguments["offset"], 1);
        assert_eq!(arguments["endLine"], 2);
        assert_eq!(arguments["endOffset"], 9);

        let doc = mirror.snapshot("/p/a.ts").await.unwrap();
        assert_eq!(doc.text, "fresh\n");
    }

    #[tokio::test]
    async fn test_close_removes_and_notifies() {
        let (sync, mirror) = mirror();
        mirror
            .open(uri(), "typescript".into(), 1, "x".into())
            .await
            .unwrap();
        let path = mirror.close(&uri()).await.unwrap();
        assert_eq!(path, "/p/a.ts");
        assert!(!mirror.is_open("/p/a.ts").await);

        let sent = sync.sent.lock().await;
        assert_eq!(sent[1].0, "close");
        assert_eq!(sent[1].1["file"], "/p/a.ts");
        assert_eq!(*sync.cancelled.lock().await, vec!["/p/a.ts".to_string()]);
    }

    #[tokio::test]
    async fn test_change_on_unopened_document_errors() {
        let (_sync, mirror) = mirror();
        let result = mirror.change(&uri(), 1, vec![]).await;
        assert_eq!(result, Err(MirrorError::NotOpen("/p/a.ts".into())));
    }
}
