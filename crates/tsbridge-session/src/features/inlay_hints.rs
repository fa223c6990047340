//! Inlay hints

use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::{InlayHint, InlayHintKind, InlayHintLabel, InlayHintParams};
use tsbridge_protocol::command::ProvideInlayHints;
use tsbridge_protocol::types::{InlayHintItem, InlayHintsRequestArgs};
use tsbridge_tsserver::RequestOptions;

use crate::convert::position_from_ts;
use crate::documents::Document;
use crate::features::respond;
use crate::session::Session;

pub async fn inlay_hint(session: &Session, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
    if !session.api_version.supports_inlay_hints() {
        return Err(Error {
            code: ErrorCode::InvalidRequest,
            message: format!(
                "Inlay hints require TypeScript 4.4 or newer (running {})",
                session.api_version
            )
            .into(),
            data: None,
        });
    }
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };

    let start = document.utf16_offset_of(params.range.start);
    let end = document.utf16_offset_of(params.range.end);
    let args = InlayHintsRequestArgs {
        file: document.path.clone(),
        start,
        length: end.saturating_sub(start),
    };
    let options = RequestOptions {
        cancel_on_resource_change: Some(document.path.clone()),
        ..Default::default()
    };

    let outcome = session.execute::<ProvideInlayHints>(args, options).await;
    respond(outcome, |hints| {
        Some(hints.iter().map(|hint| lsp_hint(hint, &document)).collect())
    })
}

fn lsp_hint(hint: &InlayHintItem, _document: &Document) -> InlayHint {
    let kind = match hint.kind.as_str() {
        "Type" => Some(InlayHintKind::TYPE),
        "Parameter" => Some(InlayHintKind::PARAMETER),
        _ => None,
    };
    InlayHint {
        position: position_from_ts(hint.position),
        label: InlayHintLabel::String(hint.text.clone()),
        kind,
        text_edits: None,
        tooltip: None,
        padding_left: hint.whitespace_before,
        padding_right: hint.whitespace_after,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_index::LineIndex;
    use tower_lsp::lsp_types::{Position, Url};
    use tsbridge_protocol::types::Location as TsLocation;

    #[test]
    fn test_hint_translation() {
        let document = Document {
            uri: Url::parse("file:///p/a.ts").unwrap(),
            path: "/p/a.ts".into(),
            language_id: "typescript".into(),
            version: 1,
            text: "const x = 1;\n".into(),
            line_index: LineIndex::new("const x = 1;\n"),
        };
        let hint = InlayHintItem {
            text: ": number".into(),
            position: TsLocation::new(1, 8),
            kind: "Type".into(),
            whitespace_before: None,
            whitespace_after: Some(true),
            display_parts: None,
        };
        let translated = lsp_hint(&hint, &document);
        assert_eq!(translated.position, Position::new(0, 7));
        assert_eq!(translated.kind, Some(InlayHintKind::TYPE));
        assert_eq!(translated.padding_right, Some(true));
        match translated.label {
            InlayHintLabel::String(text) => assert_eq!(text, ": number"),
            other => panic!("unexpected label {other:?}"),
        }
    }
}
