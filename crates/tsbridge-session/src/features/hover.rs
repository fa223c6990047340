//! Hover and signature help

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    Documentation, Hover, HoverContents, HoverParams, MarkupContent, MarkupKind,
    ParameterInformation, ParameterLabel, SignatureHelp, SignatureHelpParams,
    SignatureInformation,
};
use tsbridge_protocol::command::{Quickinfo, SignatureHelp as SignatureHelpCommand};
use tsbridge_protocol::types::{SignatureHelpItem, SignatureHelpRequestArgs, TextSpan};
use tsbridge_tsserver::RequestOptions;

use crate::convert::range_from_ts;
use crate::features::{location_args, respond};
use crate::markdown;
use crate::session::Session;

pub async fn hover(session: &Session, params: HoverParams) -> Result<Option<Hover>> {
    let position_params = params.text_document_position_params;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let args = location_args(&document.path, position_params.position);

    let outcome = session
        .diagnostics
        .interrupt(session.execute::<Quickinfo>(args, RequestOptions::default()))
        .await;

    respond(outcome, |body| {
        let mut value = format!("```typescript\n{}\n```", body.display_string);
        let docs = markdown::documentation_with_tags(body.documentation.as_ref(), body.tags.as_deref());
        if !docs.is_empty() {
            value.push_str("\n\n");
            value.push_str(&docs);
        }
        Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: Some(range_from_ts(TextSpan {
                start: body.start,
                end: body.end,
            })),
        })
    })
}

pub async fn signature_help(
    session: &Session,
    params: SignatureHelpParams,
) -> Result<Option<SignatureHelp>> {
    let position_params = params.text_document_position_params;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let location = location_args(&document.path, position_params.position);
    let args = SignatureHelpRequestArgs {
        file: location.file,
        line: location.line,
        offset: location.offset,
        trigger_reason: None,
    };

    let outcome = session
        .execute::<SignatureHelpCommand>(args, RequestOptions::default())
        .await;

    respond(outcome, |body| {
        let signatures = body.items.iter().map(signature_information).collect();
        Some(SignatureHelp {
            signatures,
            active_signature: Some(body.selected_item_index),
            active_parameter: Some(body.argument_index),
        })
    })
}

fn signature_information(item: &SignatureHelpItem) -> SignatureInformation {
    let prefix = markdown::plain(&item.prefix_display_parts);
    let separator = markdown::plain(&item.separator_display_parts);
    let suffix = markdown::plain(&item.suffix_display_parts);

    let mut label = prefix;
    let mut parameters = Vec::new();
    for (index, parameter) in item.parameters.iter().enumerate() {
        if index > 0 {
            label.push_str(&separator);
        }
        let text = markdown::plain(&parameter.display_parts);
        let start = label.chars().map(char::len_utf16).sum::<usize>() as u32;
        let end = start + text.chars().map(char::len_utf16).sum::<usize>() as u32;
        label.push_str(&text);
        let documentation = (!parameter.documentation.is_empty()).then(|| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown::plain(&parameter.documentation),
            })
        });
        parameters.push(ParameterInformation {
            label: ParameterLabel::LabelOffsets([start, end]),
            documentation,
        });
    }
    label.push_str(&suffix);

    let documentation = (!item.documentation.is_empty()).then(|| {
        Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown::plain(&item.documentation),
        })
    });

    SignatureInformation {
        label,
        documentation,
        parameters: Some(parameters),
        active_parameter: None,
    }
}
