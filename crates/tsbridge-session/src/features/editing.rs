//! Formatting, rename and structural ranges

use std::collections::HashMap;

use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::{
    DocumentFormattingParams, DocumentRangeFormattingParams, FoldingRange, FoldingRangeKind,
    FoldingRangeParams, LinkedEditingRangeParams, LinkedEditingRanges, Position,
    PrepareRenameResponse, Range, RenameParams, SelectionRange, SelectionRangeParams,
    TextDocumentPositionParams, TextEdit, Url, WorkspaceEdit,
};
use tsbridge_protocol::command::{
    Format, GetOutliningSpans, LinkedEditingRange, Rename, SelectionRange as SelectionRangeCommand,
};
use tsbridge_protocol::filepath::uri_from_path;
use tsbridge_protocol::types::{
    FileRequestArgs, FormatRequestArgs, RenameRequestArgs, SelectionRangeItem,
    SelectionRangeRequestArgs,
};
use tsbridge_tsserver::RequestOptions;

use crate::convert::{file_range_args, position_to_ts, range_from_ts};
use crate::documents::Document;
use crate::features::{respond, text_edit};
use crate::session::Session;

pub async fn formatting(
    session: &Session,
    params: DocumentFormattingParams,
) -> Result<Option<Vec<TextEdit>>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let full = Range::new(Position::new(0, 0), document.end_position());
    format_range(session, &document, full, params.options.tab_size, params.options.insert_spaces)
        .await
}

pub async fn range_formatting(
    session: &Session,
    params: DocumentRangeFormattingParams,
) -> Result<Option<Vec<TextEdit>>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    format_range(
        session,
        &document,
        params.range,
        params.options.tab_size,
        params.options.insert_spaces,
    )
    .await
}

async fn format_range(
    session: &Session,
    document: &Document,
    range: Range,
    tab_size: u32,
    insert_spaces: bool,
) -> Result<Option<Vec<TextEdit>>> {
    session
        .config
        .ensure_configured_for_document(
            &session.client,
            &document.path,
            Some(tab_size),
            Some(insert_spaces),
        )
        .await;

    let args = FormatRequestArgs {
        range: file_range_args(&document.path, range),
        options: None,
    };
    let outcome = session.execute::<Format>(args, RequestOptions::default()).await;
    respond(outcome, |edits| {
        Some(edits.iter().map(text_edit).collect())
    })
}

pub async fn rename(session: &Session, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
    let position_params = params.text_document_position;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let location = position_to_ts(position_params.position);
    let args = RenameRequestArgs {
        file: document.path.clone(),
        line: location.line,
        offset: location.offset,
        find_in_comments: Some(false),
        find_in_strings: Some(false),
    };
    let outcome = session.execute::<Rename>(args, RequestOptions::default()).await;

    match outcome.into_body() {
        None => Ok(None),
        Some(body) if !body.info.can_rename => Err(Error {
            code: ErrorCode::InvalidRequest,
            message: body
                .info
                .localized_error_message
                .unwrap_or_else(|| "This element cannot be renamed.".to_string())
                .into(),
            data: None,
        }),
        Some(body) => {
            let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
            for group in &body.locs {
                let Ok(uri) = uri_from_path(&group.file) else {
                    continue;
                };
                let edits = changes.entry(uri).or_default();
                for span in &group.locs {
                    let new_text = format!(
                        "{}{}{}",
                        span.prefix_text.as_deref().unwrap_or(""),
                        params.new_name,
                        span.suffix_text.as_deref().unwrap_or(""),
                    );
                    edits.push(TextEdit {
                        range: range_from_ts(tsbridge_protocol::types::TextSpan {
                            start: span.start,
                            end: span.end,
                        }),
                        new_text,
                    });
                }
            }
            Ok(Some(WorkspaceEdit {
                changes: Some(changes),
                ..Default::default()
            }))
        }
    }
}

pub async fn prepare_rename(
    session: &Session,
    params: TextDocumentPositionParams,
) -> Result<Option<PrepareRenameResponse>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let location = position_to_ts(params.position);
    let args = RenameRequestArgs {
        file: document.path,
        line: location.line,
        offset: location.offset,
        find_in_comments: Some(false),
        find_in_strings: Some(false),
    };
    let outcome = session.execute::<Rename>(args, RequestOptions::default()).await;
    respond(outcome, |body| {
        if !body.info.can_rename {
            return None;
        }
        body.info
            .trigger_span
            .map(|span| PrepareRenameResponse::Range(range_from_ts(span)))
    })
}

pub async fn folding_range(
    session: &Session,
    params: FoldingRangeParams,
) -> Result<Option<Vec<FoldingRange>>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let args = FileRequestArgs {
        file: document.path.clone(),
    };
    let outcome = session
        .execute::<GetOutliningSpans>(args, RequestOptions::default())
        .await;
    respond(outcome, |spans| {
        Some(
            spans
                .iter()
                .filter_map(|span| {
                    let range = range_from_ts(span.text_span);
                    if range.start.line >= range.end.line {
                        return None;
                    }
                    let kind = match span.kind.as_str() {
                        "comment" => Some(FoldingRangeKind::Comment),
                        "imports" => Some(FoldingRangeKind::Imports),
                        "region" => Some(FoldingRangeKind::Region),
                        _ => None,
                    };
                    // Keep the closing brace visible when it sits alone.
                    let end_line = if folded_tail_is_brace(&document, range) {
                        range.end.line - 1
                    } else {
                        range.end.line
                    };
                    if end_line <= range.start.line {
                        return None;
                    }
                    Some(FoldingRange {
                        start_line: range.start.line,
                        start_character: Some(range.start.character),
                        end_line,
                        kind,
                        ..Default::default()
                    })
                })
                .collect(),
        )
    })
}

fn folded_tail_is_brace(document: &Document, range: Range) -> bool {
    let end = document.offset_of(range.end);
    document.text[..end]
        .chars()
        .next_back()
        .map(|last| last == '}' || last == ')')
        .unwrap_or(false)
}

pub async fn selection_range(
    session: &Session,
    params: SelectionRangeParams,
) -> Result<Option<Vec<SelectionRange>>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let args = SelectionRangeRequestArgs {
        file: document.path,
        locations: params.positions.iter().copied().map(position_to_ts).collect(),
    };
    let outcome = session
        .execute::<SelectionRangeCommand>(args, RequestOptions::default())
        .await;
    respond(outcome, |items| {
        Some(items.iter().map(selection_range_chain).collect())
    })
}

fn selection_range_chain(item: &SelectionRangeItem) -> SelectionRange {
    SelectionRange {
        range: range_from_ts(item.text_span),
        parent: item
            .parent
            .as_ref()
            .map(|parent| Box::new(selection_range_chain(parent))),
    }
}

pub async fn linked_editing_range(
    session: &Session,
    params: LinkedEditingRangeParams,
) -> Result<Option<LinkedEditingRanges>> {
    if !session.api_version.supports_linked_editing() {
        return Ok(None);
    }
    let position_params = params.text_document_position_params;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let args = super::location_args(&document.path, position_params.position);
    let outcome = session
        .execute::<LinkedEditingRange>(args, RequestOptions::default())
        .await;
    respond(outcome, |body| {
        Some(LinkedEditingRanges {
            ranges: body.ranges.iter().copied().map(range_from_ts).collect(),
            word_pattern: body.word_pattern,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_index::LineIndex;

    fn document(text: &str) -> Document {
        Document {
            uri: Url::parse("file:///p/a.ts").unwrap(),
            path: "/p/a.ts".into(),
            language_id: "typescript".into(),
            version: 1,
            line_index: LineIndex::new(text),
            text: text.into(),
        }
    }

    #[test]
    fn test_folded_tail_detection() {
        let doc = document("function f() {\n  return 1;\n}\n");
        let range = Range::new(Position::new(0, 13), Position::new(2, 1));
        assert!(folded_tail_is_brace(&doc, range));

        let comment = document("// a\n// b\n");
        let range = Range::new(Position::new(0, 0), Position::new(1, 4));
        assert!(!folded_tail_is_brace(&comment, range));
    }

    #[test]
    fn test_selection_range_chain_preserves_parents() {
        use tsbridge_protocol::types::{Location as TsLocation, TextSpan};
        let item = SelectionRangeItem {
            text_span: TextSpan {
                start: TsLocation::new(2, 3),
                end: TsLocation::new(2, 8),
            },
            parent: Some(Box::new(SelectionRangeItem {
                text_span: TextSpan {
                    start: TsLocation::new(1, 1),
                    end: TsLocation::new(4, 1),
                },
                parent: None,
            })),
        };
        let chain = selection_range_chain(&item);
        assert_eq!(chain.range.start, Position::new(1, 2));
        assert_eq!(chain.parent.unwrap().range.start, Position::new(0, 0));
    }
}
