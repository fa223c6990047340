//! Completion and completion-item resolution

use serde::{Deserialize, Serialize};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemLabelDetails, CompletionItemTag, CompletionParams,
    CompletionResponse, CompletionTextEdit, CompletionTriggerKind, Documentation,
    InsertTextFormat, MarkupContent, MarkupKind, Position, TextEdit,
};
use tracing::warn;
use tsbridge_protocol::command::{CompletionEntryDetails, CompletionInfo};
use tsbridge_protocol::types::{
    CompletionDetailsRequestArgs, CompletionEntry, CompletionEntryIdentifier,
    CompletionInfoRequestArgs, TextSpan,
};
use tsbridge_tsserver::RequestOptions;

use crate::convert::{completion_kind_from_ts, position_to_ts, range_from_ts};
use crate::features::{respond, text_edit};
use crate::markdown;
use crate::session::Session;

/// Trigger characters tsserver understands; anything else is sent as an
/// invoked completion.
const TRIGGER_CHARACTERS: &[&str] = &[".", "\"", "'", "`", "/", "@", "<", "#", " "];

/// Resolve payload carried on each item through the client round-trip.
#[derive(Debug, Serialize, Deserialize)]
struct ResolveData {
    file: String,
    line: u32,
    offset: u32,
    entry: CompletionEntryIdentifier,
}

pub async fn completion(
    session: &Session,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>> {
    let position_params = params.text_document_position;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let location = position_to_ts(position_params.position);

    let trigger_character = params
        .context
        .as_ref()
        .and_then(|context| context.trigger_character.as_deref())
        .filter(|ch| TRIGGER_CHARACTERS.contains(ch))
        .map(str::to_string);

    let args = CompletionInfoRequestArgs {
        file: document.path.clone(),
        line: location.line,
        offset: location.offset,
        trigger_kind: params.context.as_ref().map(|context| {
            if context.trigger_kind == CompletionTriggerKind::TRIGGER_CHARACTER {
                2
            } else if context.trigger_kind
                == CompletionTriggerKind::TRIGGER_FOR_INCOMPLETE_COMPLETIONS
            {
                3
            } else {
                1
            }
        }),
        trigger_character,
    };
    let options = RequestOptions {
        cancel_on_resource_change: Some(document.path.clone()),
        ..Default::default()
    };

    // Completion latency beats diagnostics churn.
    let outcome = session
        .diagnostics
        .interrupt(session.execute::<CompletionInfo>(args, options))
        .await;

    respond(outcome, |body| {
        let is_incomplete = body.is_incomplete.unwrap_or(false);
        let items = body
            .entries
            .iter()
            .map(|entry| {
                completion_item(
                    entry,
                    &document.path,
                    position_params.position,
                    body.optional_replacement_span,
                )
            })
            .collect();
        Some(CompletionResponse::List(tower_lsp::lsp_types::CompletionList {
            is_incomplete,
            items,
        }))
    })
}

fn completion_item(
    entry: &CompletionEntry,
    path: &str,
    position: Position,
    default_span: Option<TextSpan>,
) -> CompletionItem {
    let location = position_to_ts(position);
    let data = ResolveData {
        file: path.to_string(),
        line: location.line,
        offset: location.offset,
        entry: CompletionEntryIdentifier {
            name: entry.name.clone(),
            source: entry.source.clone(),
            data: entry.data.clone(),
        },
    };

    let text_edit = entry
        .replacement_span
        .or(default_span)
        .map(|span| {
            CompletionTextEdit::Edit(TextEdit {
                range: range_from_ts(span),
                new_text: entry
                    .insert_text
                    .clone()
                    .unwrap_or_else(|| entry.name.clone()),
            })
        });

    let tags = entry
        .kind_modifiers
        .split(',')
        .any(|modifier| modifier == "deprecated")
        .then(|| vec![CompletionItemTag::DEPRECATED]);

    let label_details = entry.label_details.as_ref().map(|details| {
        CompletionItemLabelDetails {
            detail: details.detail.clone(),
            description: details.description.clone(),
        }
    });

    CompletionItem {
        label: entry.name.clone(),
        kind: Some(completion_kind_from_ts(&entry.kind)),
        sort_text: Some(entry.sort_text.clone()),
        filter_text: entry.filter_text.clone(),
        insert_text: entry.insert_text.clone(),
        insert_text_format: entry
            .is_snippet
            .unwrap_or(false)
            .then_some(InsertTextFormat::SNIPPET),
        text_edit,
        preselect: entry.is_recommended,
        label_details,
        tags,
        data: serde_json::to_value(data).ok(),
        ..Default::default()
    }
}

pub async fn resolve(session: &Session, mut item: CompletionItem) -> Result<CompletionItem> {
    let Some(data) = item.data.take() else {
        return Ok(item);
    };
    let resolve_data: ResolveData = match serde_json::from_value(data) {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, "completion item with foreign resolve data");
            return Ok(item);
        }
    };

    let args = CompletionDetailsRequestArgs {
        file: resolve_data.file.clone(),
        line: resolve_data.line,
        offset: resolve_data.offset,
        entry_names: vec![resolve_data.entry],
    };
    let outcome = session
        .execute::<CompletionEntryDetails>(args, RequestOptions::default())
        .await;

    let details = match outcome.into_body().and_then(|mut list| {
        if list.is_empty() {
            None
        } else {
            Some(list.remove(0))
        }
    }) {
        Some(details) => details,
        None => return Ok(item),
    };

    item.detail = Some(markdown::plain(&details.display_parts));
    let docs =
        markdown::documentation_with_tags(details.documentation.as_ref(), details.tags.as_deref());
    if !docs.is_empty() {
        item.documentation = Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: docs,
        }));
    }

    // Auto-import and friends land as extra edits in the same file.
    if let Some(actions) = &details.code_actions {
        let mut additional = Vec::new();
        let mut descriptions = Vec::new();
        for action in actions {
            descriptions.push(action.description.clone());
            for file_edits in &action.changes {
                if file_edits.file_name == resolve_data.file {
                    additional.extend(file_edits.text_changes.iter().map(text_edit));
                }
            }
        }
        if !additional.is_empty() {
            item.additional_text_edits = Some(additional);
        }
        if !descriptions.is_empty() {
            item.detail = Some(match item.detail.take() {
                Some(detail) => format!("{}\n{detail}", descriptions.join(" ")),
                None => descriptions.join(" "),
            });
        }
    }

    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> CompletionEntry {
        CompletionEntry {
            name: name.into(),
            kind: "const".into(),
            sort_text: "11".into(),
            kind_modifiers: String::new(),
            insert_text: None,
            filter_text: None,
            is_snippet: None,
            replacement_span: None,
            has_action: None,
            source: None,
            source_display: None,
            label_details: None,
            is_recommended: None,
            is_import_statement_completion: None,
            data: None,
        }
    }

    #[test]
    fn test_completion_item_carries_resolve_data() {
        let item = completion_item(&entry("foo"), "/p/a.ts", Position::new(0, 4), None);
        assert_eq!(item.label, "foo");
        let data = item.data.unwrap();
        assert_eq!(data["file"], "/p/a.ts");
        assert_eq!(data["line"], 1);
        assert_eq!(data["offset"], 5);
        assert_eq!(data["entry"]["name"], "foo");
    }

    #[test]
    fn test_deprecated_modifier_tags_item() {
        let mut deprecated = entry("old");
        deprecated.kind_modifiers = "deprecated,declare".into();
        let item = completion_item(&deprecated, "/p/a.ts", Position::new(0, 0), None);
        assert_eq!(item.tags, Some(vec![CompletionItemTag::DEPRECATED]));
    }

    #[test]
    fn test_snippet_entries_get_snippet_format() {
        let mut snippet = entry("log");
        snippet.is_snippet = Some(true);
        snippet.insert_text = Some("log(${1:msg})".into());
        let item = completion_item(&snippet, "/p/a.ts", Position::new(0, 0), None);
        assert_eq!(item.insert_text_format, Some(InsertTextFormat::SNIPPET));
        assert_eq!(item.insert_text.as_deref(), Some("log(${1:msg})"));
    }
}
