//! Go-to targets, references, highlights and symbols

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DocumentHighlight, DocumentHighlightKind, DocumentHighlightParams, DocumentSymbol,
    DocumentSymbolParams, DocumentSymbolResponse, GotoDefinitionParams, GotoDefinitionResponse,
    Location, ReferenceParams, SymbolInformation, Url, WorkspaceSymbolParams,
};
use tsbridge_protocol::command::{
    Definition, DocumentHighlights, Implementation, NavTree, Navto, References, TypeDefinition,
};
use tsbridge_protocol::filepath::uri_from_path;
use tsbridge_protocol::types::{
    DocumentHighlightsRequestArgs, FileRequestArgs, NavigationTree, NavtoRequestArgs,
};
use tsbridge_tsserver::RequestOptions;

use crate::convert::{range_from_ts, symbol_kind_from_ts};
use crate::features::{location_args, lsp_location, respond};
use crate::session::Session;

macro_rules! goto_handler {
    ($name:ident, $command:ty) => {
        pub async fn $name(
            session: &Session,
            params: GotoDefinitionParams,
        ) -> Result<Option<GotoDefinitionResponse>> {
            let position_params = params.text_document_position_params;
            let Some(document) = session.document(&position_params.text_document.uri).await
            else {
                return Ok(None);
            };
            let args = location_args(&document.path, position_params.position);
            let outcome = session.execute::<$command>(args, RequestOptions::default()).await;
            respond(outcome, |spans| {
                let locations: Vec<Location> =
                    spans.iter().filter_map(lsp_location).collect();
                Some(GotoDefinitionResponse::Array(locations))
            })
        }
    };
}

goto_handler!(definition, Definition);
goto_handler!(type_definition, TypeDefinition);
goto_handler!(implementation, Implementation);

pub async fn references(session: &Session, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
    let position_params = params.text_document_position;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let args = location_args(&document.path, position_params.position);
    let include_declaration = params.context.include_declaration;

    let outcome = session.execute::<References>(args, RequestOptions::default()).await;
    respond(outcome, |body| {
        Some(
            body.refs
                .iter()
                .filter(|reference| {
                    include_declaration || !reference.is_definition.unwrap_or(false)
                })
                .filter_map(|reference| lsp_location(&reference.span))
                .collect(),
        )
    })
}

pub async fn document_highlight(
    session: &Session,
    params: DocumentHighlightParams,
) -> Result<Option<Vec<DocumentHighlight>>> {
    let position_params = params.text_document_position_params;
    let Some(document) = session.document(&position_params.text_document.uri).await else {
        return Ok(None);
    };
    let location = location_args(&document.path, position_params.position);
    let args = DocumentHighlightsRequestArgs {
        file: location.file,
        line: location.line,
        offset: location.offset,
        files_to_search: vec![document.path.clone()],
    };

    let outcome = session
        .execute::<DocumentHighlights>(args, RequestOptions::default())
        .await;
    respond(outcome, |items| {
        let highlights = items
            .iter()
            .filter(|item| item.file == document.path)
            .flat_map(|item| &item.highlight_spans)
            .map(|span| DocumentHighlight {
                range: range_from_ts(tsbridge_protocol::types::TextSpan {
                    start: span.start,
                    end: span.end,
                }),
                kind: Some(match span.kind.as_str() {
                    "writtenReference" => DocumentHighlightKind::WRITE,
                    _ => DocumentHighlightKind::READ,
                }),
            })
            .collect();
        Some(highlights)
    })
}

pub async fn document_symbol(
    session: &Session,
    params: DocumentSymbolParams,
) -> Result<Option<DocumentSymbolResponse>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let args = FileRequestArgs {
        file: document.path.clone(),
    };
    let outcome = session.execute::<NavTree>(args, RequestOptions::default()).await;
    respond(outcome, |tree| {
        // The root node is the file itself; its children are the symbols.
        let symbols: Vec<DocumentSymbol> = tree
            .child_items
            .unwrap_or_default()
            .iter()
            .filter_map(document_symbol_from_tree)
            .collect();
        Some(DocumentSymbolResponse::Nested(symbols))
    })
}

fn document_symbol_from_tree(tree: &NavigationTree) -> Option<DocumentSymbol> {
    let range = range_from_ts(*tree.spans.first()?);
    let selection_range = tree.name_span.map(range_from_ts).unwrap_or(range);
    let children: Vec<DocumentSymbol> = tree
        .child_items
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(document_symbol_from_tree)
        .collect();
    #[allow(deprecated)]
    Some(DocumentSymbol {
        name: tree.text.clone(),
        detail: None,
        kind: symbol_kind_from_ts(&tree.kind),
        tags: None,
        deprecated: None,
        range,
        selection_range,
        children: (!children.is_empty()).then_some(children),
    })
}

pub async fn workspace_symbol(
    session: &Session,
    params: WorkspaceSymbolParams,
) -> Result<Option<Vec<SymbolInformation>>> {
    // navto needs any open file to anchor the project lookup.
    let Some(file) = session.mirror.open_paths().await.into_iter().next() else {
        return Ok(None);
    };
    let args = NavtoRequestArgs {
        search_value: params.query,
        file: Some(file),
        max_result_count: Some(256),
    };
    let outcome = session.execute::<Navto>(args, RequestOptions::default()).await;
    respond(outcome, |items| {
        let symbols = items
            .iter()
            .filter_map(|item| {
                let uri: Url = uri_from_path(&item.file).ok()?;
                #[allow(deprecated)]
                Some(SymbolInformation {
                    name: item.name.clone(),
                    kind: symbol_kind_from_ts(&item.kind),
                    tags: None,
                    deprecated: None,
                    location: Location {
                        uri,
                        range: range_from_ts(tsbridge_protocol::types::TextSpan {
                            start: item.start,
                            end: item.end,
                        }),
                    },
                    container_name: item.container_name.clone(),
                })
            })
            .collect();
        Some(symbols)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbridge_protocol::types::{Location as TsLocation, TextSpan};

    fn tree(text: &str, kind: &str, children: Option<Vec<NavigationTree>>) -> NavigationTree {
        NavigationTree {
            text: text.into(),
            kind: kind.into(),
            kind_modifiers: String::new(),
            spans: vec![TextSpan {
                start: TsLocation::new(1, 1),
                end: TsLocation::new(3, 2),
            }],
            name_span: Some(TextSpan {
                start: TsLocation::new(1, 7),
                end: TsLocation::new(1, 10),
            }),
            child_items: children,
        }
    }

    #[test]
    fn test_document_symbol_tree_conversion() {
        let nav = tree(
            "Foo",
            "class",
            Some(vec![tree("bar", "method", None)]),
        );
        let symbol = document_symbol_from_tree(&nav).unwrap();
        assert_eq!(symbol.name, "Foo");
        assert_eq!(symbol.kind, tower_lsp::lsp_types::SymbolKind::CLASS);
        assert_eq!(symbol.selection_range.start.character, 6);
        let children = symbol.children.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "bar");
    }

    #[test]
    fn test_tree_without_spans_is_dropped() {
        let mut nav = tree("x", "const", None);
        nav.spans.clear();
        assert!(document_symbol_from_tree(&nav).is_none());
    }
}
