//! Per-endpoint request handlers
//!
//! Each module binds a slice of the LSP surface to tsserver commands: shape
//! the arguments, run the typed command, translate the body. The shared
//! helpers here map [`ResponseOutcome`] onto JSON-RPC results: cancelled
//! requests become `RequestCancelled` errors, empty bodies become `None`.

use std::collections::HashMap;

use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::{Location, TextEdit, Url, WorkspaceEdit};
use tsbridge_protocol::filepath::uri_from_path;
use tsbridge_protocol::types::{CodeEdit, FileCodeEdits, FileLocationRequestArgs, FileSpan, TextSpan};
use tsbridge_tsserver::ResponseOutcome;

use crate::convert::{position_to_ts, range_from_ts};

pub mod call_hierarchy;
pub mod code_actions;
pub mod code_lens;
pub mod completions;
pub mod editing;
pub mod hover;
pub mod inlay_hints;
pub mod navigation;
pub mod semantic_tokens;
pub mod workspace;

/// LSP `RequestCancelled`, which tower-lsp's error codes do not name.
pub const REQUEST_CANCELLED: i64 = -32800;

pub fn request_cancelled() -> Error {
    Error {
        code: ErrorCode::ServerError(REQUEST_CANCELLED),
        message: "request cancelled".into(),
        data: None,
    }
}

pub fn no_server() -> Error {
    Error {
        code: ErrorCode::InternalError,
        message: "the TypeScript server is not running".into(),
        data: None,
    }
}

pub fn server_error(message: String) -> Error {
    Error {
        code: ErrorCode::InternalError,
        message: message.into(),
        data: None,
    }
}

/// Map an outcome onto an LSP response; `f` translates the body and may
/// still produce `None` for an empty result.
pub fn respond<T, R>(
    outcome: ResponseOutcome<T>,
    f: impl FnOnce(T) -> Option<R>,
) -> Result<Option<R>> {
    match outcome {
        ResponseOutcome::Response(body) => Ok(f(body)),
        ResponseOutcome::NoContent => Ok(None),
        ResponseOutcome::Cancelled(_) => Err(request_cancelled()),
        ResponseOutcome::NoServer => Err(no_server()),
        ResponseOutcome::ServerError(message) => Err(server_error(message)),
    }
}

pub fn location_args(file: impl Into<String>, position: tower_lsp::lsp_types::Position) -> FileLocationRequestArgs {
    let location = position_to_ts(position);
    FileLocationRequestArgs {
        file: file.into(),
        line: location.line,
        offset: location.offset,
    }
}

/// LSP location for a file span; spans for unmappable paths are dropped.
pub fn lsp_location(span: &FileSpan) -> Option<Location> {
    let uri = uri_from_path(&span.file).ok()?;
    Some(Location {
        uri,
        range: range_from_ts(TextSpan {
            start: span.start,
            end: span.end,
        }),
    })
}

pub fn text_edit(edit: &CodeEdit) -> TextEdit {
    TextEdit {
        range: range_from_ts(TextSpan {
            start: edit.start,
            end: edit.end,
        }),
        new_text: edit.new_text.clone(),
    }
}

/// A workspace edit from tsserver's per-file edit groups.
pub fn workspace_edit(edits: &[FileCodeEdits]) -> WorkspaceEdit {
    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    for file_edits in edits {
        let Ok(uri) = uri_from_path(&file_edits.file_name) else {
            continue;
        };
        changes
            .entry(uri)
            .or_default()
            .extend(file_edits.text_changes.iter().map(text_edit));
    }
    WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbridge_protocol::types::Location as TsLocation;

    #[test]
    fn test_respond_maps_arms() {
        let ok: Result<Option<u32>> = respond(ResponseOutcome::Response(5), |n| Some(n * 2));
        assert_eq!(ok.unwrap(), Some(10));

        let empty: Result<Option<u32>> = respond(ResponseOutcome::NoContent, |n| Some(n));
        assert_eq!(empty.unwrap(), None);

        let cancelled: Result<Option<u32>> =
            respond(ResponseOutcome::Cancelled("x".into()), |n| Some(n));
        assert_eq!(
            cancelled.unwrap_err().code,
            ErrorCode::ServerError(REQUEST_CANCELLED)
        );
    }

    #[test]
    fn test_workspace_edit_groups_by_uri() {
        let edits = vec![FileCodeEdits {
            file_name: "/p/a.ts".into(),
            text_changes: vec![CodeEdit {
                start: TsLocation::new(1, 1),
                end: TsLocation::new(1, 1),
                new_text: "import x;\n".into(),
            }],
        }];
        let edit = workspace_edit(&edits);
        let changes = edit.changes.unwrap();
        let uri = Url::parse("file:///p/a.ts").unwrap();
        assert_eq!(changes[&uri].len(), 1);
        assert_eq!(changes[&uri][0].new_text, "import x;\n");
    }
}
