//! Semantic tokens from encoded classifications
//!
//! tsserver's `encodedSemanticClassifications-full` returns a flat
//! `(offset, length, classification)` triple stream in UTF-16 file
//! offsets. A classification packs `(token_type + 1) << 8 | modifier_set`;
//! the legend below must stay aligned with that encoding.

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    Position, SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens,
    SemanticTokensLegend, SemanticTokensParams, SemanticTokensRangeParams,
    SemanticTokensRangeResult, SemanticTokensResult,
};
use tsbridge_protocol::command::EncodedSemanticClassificationsFull;
use tsbridge_protocol::types::EncodedSemanticClassificationsRequestArgs;
use tsbridge_tsserver::RequestOptions;

use crate::documents::Document;
use crate::features::respond;
use crate::session::Session;

const TYPE_OFFSET: u32 = 8;
const MODIFIER_MASK: u32 = (1 << TYPE_OFFSET) - 1;

/// Token types in classification order.
pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: vec![
            SemanticTokenType::CLASS,
            SemanticTokenType::ENUM,
            SemanticTokenType::INTERFACE,
            SemanticTokenType::NAMESPACE,
            SemanticTokenType::TYPE_PARAMETER,
            SemanticTokenType::TYPE,
            SemanticTokenType::PARAMETER,
            SemanticTokenType::VARIABLE,
            SemanticTokenType::ENUM_MEMBER,
            SemanticTokenType::PROPERTY,
            SemanticTokenType::FUNCTION,
            SemanticTokenType::METHOD,
        ],
        token_modifiers: vec![
            SemanticTokenModifier::DECLARATION,
            SemanticTokenModifier::STATIC,
            SemanticTokenModifier::ASYNC,
            SemanticTokenModifier::READONLY,
            SemanticTokenModifier::DEFAULT_LIBRARY,
            SemanticTokenModifier::new("local"),
        ],
    }
}

pub async fn full(
    session: &Session,
    params: SemanticTokensParams,
) -> Result<Option<SemanticTokensResult>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let length = document.utf16_len();
    let tokens = classifications(session, &document, 0, length).await?;
    Ok(tokens.map(SemanticTokensResult::Tokens))
}

pub async fn range(
    session: &Session,
    params: SemanticTokensRangeParams,
) -> Result<Option<SemanticTokensRangeResult>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let start = document.utf16_offset_of(params.range.start);
    let end = document.utf16_offset_of(params.range.end);
    let tokens = classifications(session, &document, start, end.saturating_sub(start)).await?;
    Ok(tokens.map(SemanticTokensRangeResult::Tokens))
}

async fn classifications(
    session: &Session,
    document: &Document,
    start: u32,
    length: u32,
) -> Result<Option<SemanticTokens>> {
    let args = EncodedSemanticClassificationsRequestArgs {
        file: document.path.clone(),
        start,
        length,
        format: Some("2020".to_string()),
    };
    let options = RequestOptions {
        cancel_on_resource_change: Some(document.path.clone()),
        ..Default::default()
    };
    let outcome = session
        .execute::<EncodedSemanticClassificationsFull>(args, options)
        .await;
    respond(outcome, |body| {
        Some(SemanticTokens {
            result_id: None,
            data: encode_tokens(document, &body.spans),
        })
    })
}

/// Delta-encode the triple stream against the legend.
fn encode_tokens(document: &Document, spans: &[u32]) -> Vec<SemanticToken> {
    let type_count = legend().token_types.len() as u32;
    let mut tokens = Vec::with_capacity(spans.len() / 3);
    let mut previous = Position::new(0, 0);
    for triple in spans.chunks_exact(3) {
        let [offset, length, classification] = [triple[0], triple[1], triple[2]];
        let Some(token_type) = (classification >> TYPE_OFFSET).checked_sub(1) else {
            continue;
        };
        if token_type >= type_count {
            continue;
        }
        let modifiers = classification & MODIFIER_MASK;
        let position = document
            .line_index
            .position_of_utf16(&document.text, offset);
        // The stream is sorted by offset; drop anything that is not.
        if position < previous {
            continue;
        }

        let delta_line = position.line - previous.line;
        let delta_start = if delta_line == 0 {
            position.character - previous.character
        } else {
            position.character
        };
        tokens.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: modifiers,
        });
        previous = position;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_index::LineIndex;
    use tower_lsp::lsp_types::Url;

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

    fn classification(token_type: u32, modifiers: u32) -> u32 {
        ((token_type + 1) << TYPE_OFFSET) | modifiers
    }

    #[test]
    fn test_delta_encoding_across_lines() {
        let doc = document("const x = 1;\nfunction f() {}\n");
        // "x" at offset 6 (variable, declaration), "f" at offset 22 (function).
        let spans = vec![
            6,
            1,
            classification(7, 0b1),
            22,
            1,
            classification(10, 0b1),
        ];
        let tokens = encode_tokens(&doc, &spans);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].delta_line, 0);
        assert_eq!(tokens[0].delta_start, 6);
        assert_eq!(tokens[0].token_type, 7);
        assert_eq!(tokens[0].token_modifiers_bitset, 1);

        assert_eq!(tokens[1].delta_line, 1);
        assert_eq!(tokens[1].delta_start, 9);
        assert_eq!(tokens[1].token_type, 10);
    }

    #[test]
    fn test_out_of_legend_classifications_are_dropped() {
        let doc = document("let y;\n");
        let spans = vec![4, 1, classification(40, 0)];
        assert!(encode_tokens(&doc, &spans).is_empty());
    }
}
