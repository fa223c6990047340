//! Reference code lenses over the navigation tree
//!
//! Lenses are placed on declarations from `navtree` and resolve lazily:
//! the reference count is only computed when the editor asks for it.

use serde::{Deserialize, Serialize};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{CodeLens, CodeLensParams, Command, Position};
use tracing::warn;
use tsbridge_protocol::command::{NavTree, References};
use tsbridge_protocol::types::{FileRequestArgs, NavigationTree};
use tsbridge_tsserver::RequestOptions;

use crate::convert::range_from_ts;
use crate::features::{location_args, respond};
use crate::session::Session;

/// Declaration kinds worth a lens.
const LENS_KINDS: &[&str] = &[
    "class",
    "interface",
    "enum",
    "function",
    "method",
    "const",
    "let",
    "var",
    "type",
];

#[derive(Debug, Serialize, Deserialize)]
struct LensData {
    file: String,
    line: u32,
    character: u32,
}

pub async fn code_lens(session: &Session, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let args = FileRequestArgs {
        file: document.path.clone(),
    };
    let outcome = session.execute::<NavTree>(args, RequestOptions::default()).await;
    respond(outcome, |tree| {
        let mut lenses = Vec::new();
        for child in tree.child_items.unwrap_or_default() {
            collect_lenses(&child, &document.path, 0, &mut lenses);
        }
        Some(lenses)
    })
}

fn collect_lenses(tree: &NavigationTree, path: &str, depth: usize, lenses: &mut Vec<CodeLens>) {
    if depth < 2 && LENS_KINDS.contains(&tree.kind.as_str()) {
        if let Some(range) = tree.name_span.map(range_from_ts) {
            let data = LensData {
                file: path.to_string(),
                line: range.start.line,
                character: range.start.character,
            };
            lenses.push(CodeLens {
                range,
                command: None,
                data: serde_json::to_value(data).ok(),
            });
        }
    }
    for child in tree.child_items.as_deref().unwrap_or_default() {
        collect_lenses(child, path, depth + 1, lenses);
    }
}

pub async fn resolve(session: &Session, mut lens: CodeLens) -> Result<CodeLens> {
    let Some(data) = lens.data.take() else {
        return Ok(lens);
    };
    let data: LensData = match serde_json::from_value(data) {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, "code lens with foreign data");
            return Ok(lens);
        }
    };

    let args = location_args(&data.file, Position::new(data.line, data.character));
    let outcome = session.execute::<References>(args, RequestOptions::default()).await;
    let count = outcome
        .into_body()
        .map(|body| {
            body.refs
                .iter()
                .filter(|reference| !reference.is_definition.unwrap_or(false))
                .count()
        })
        .unwrap_or(0);

    lens.command = Some(Command {
        title: match count {
            1 => "1 reference".to_string(),
            n => format!("{n} references"),
        },
        command: String::new(),
        arguments: None,
    });
    Ok(lens)
}
