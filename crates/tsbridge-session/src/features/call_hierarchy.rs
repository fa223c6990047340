//! Call hierarchy: prepare, incoming, outgoing

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams, CallHierarchyItem,
    CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
    SymbolTag,
};
use tsbridge_protocol::command::{
    PrepareCallHierarchy, ProvideCallHierarchyIncomingCalls, ProvideCallHierarchyOutgoingCalls,
};
use tsbridge_protocol::filepath::{path_from_uri, uri_from_path};
use tsbridge_protocol::types::{self, CallHierarchyItemOrList};
use tsbridge_tsserver::RequestOptions;

use crate::convert::{range_from_ts, symbol_kind_from_ts};
use crate::features::{location_args, respond};
use crate::session::Session;

pub async fn prepare(
    session: &Session,
    params: CallHierarchyPrepareParams,
) -> Result<Option<Vec<CallHierarchyItem>>> {
    let position_params = params.text_document_position_params;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let args = location_args(&document.path, position_params.position);
    let outcome = session
        .execute::<PrepareCallHierarchy>(args, RequestOptions::default())
        .await;
    respond(outcome, |body| {
        let items = match body {
            CallHierarchyItemOrList::One(item) => vec![*item],
            CallHierarchyItemOrList::Many(items) => items,
        };
        Some(items.iter().filter_map(lsp_item).collect())
    })
}

pub async fn incoming_calls(
    session: &Session,
    params: CallHierarchyIncomingCallsParams,
) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
    let args = location_args(
        path_from_uri(&params.item.uri),
        params.item.selection_range.start,
    );
    let outcome = session
        .execute::<ProvideCallHierarchyIncomingCalls>(args, RequestOptions::default())
        .await;
    respond(outcome, |calls| {
        Some(
            calls
                .iter()
                .filter_map(|call| {
                    Some(CallHierarchyIncomingCall {
                        from: lsp_item(&call.from)?,
                        from_ranges: call.from_spans.iter().copied().map(range_from_ts).collect(),
                    })
                })
                .collect(),
        )
    })
}

pub async fn outgoing_calls(
    session: &Session,
    params: CallHierarchyOutgoingCallsParams,
) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
    let args = location_args(
        path_from_uri(&params.item.uri),
        params.item.selection_range.start,
    );
    let outcome = session
        .execute::<ProvideCallHierarchyOutgoingCalls>(args, RequestOptions::default())
        .await;
    respond(outcome, |calls| {
        Some(
            calls
                .iter()
                .filter_map(|call| {
                    Some(CallHierarchyOutgoingCall {
                        to: lsp_item(&call.to)?,
                        from_ranges: call.from_spans.iter().copied().map(range_from_ts).collect(),
                    })
                })
                .collect(),
        )
    })
}

fn lsp_item(item: &types::CallHierarchyItem) -> Option<CallHierarchyItem> {
    let uri = uri_from_path(&item.file).ok()?;
    let deprecated = item
        .kind_modifiers
        .as_deref()
        .map(|modifiers| modifiers.split(',').any(|m| m == "deprecated"))
        .unwrap_or(false);
    Some(CallHierarchyItem {
        name: item.name.clone(),
        kind: symbol_kind_from_ts(&item.kind),
        tags: deprecated.then(|| vec![SymbolTag::DEPRECATED]),
        detail: item.container_name.clone(),
        uri,
        range: range_from_ts(item.span),
        selection_range: range_from_ts(item.selection_span),
        data: None,
    })
}
