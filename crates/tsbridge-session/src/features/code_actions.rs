//! Quickfixes, refactors and source actions
//!
//! Quickfixes come from `getCodeFixes`, driven by the diagnostics the
//! editor hands back in the request context and filtered by the fixable
//! code set. Refactors come from `getApplicableRefactors` and resolve
//! their edits lazily, as do fix-alls and organize-imports.

use serde::{Deserialize, Serialize};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, CodeActionResponse,
    Diagnostic, NumberOrString, Range,
};
use tracing::warn;
use tsbridge_protocol::command::{
    GetApplicableRefactors, GetCodeFixes, GetCombinedCodeFix, GetEditsForRefactor,
    OrganizeImports,
};
use tsbridge_protocol::types::{
    CombinedCodeFixScope, GetCodeFixesRequestArgs, GetCombinedCodeFixRequestArgs,
    GetEditsForRefactorRequestArgs, OrganizeImportsRequestArgs,
};
use tsbridge_tsserver::{RequestOptions, ResponseOutcome};

use crate::convert::file_range_args;
use crate::features::{respond, server_error, workspace_edit};
use crate::session::Session;

/// Deferred-edit payload round-tripped through `codeAction/resolve`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum ResolveData {
    Refactor {
        file: String,
        range: Range,
        refactor: String,
        action: String,
    },
    FixAll {
        file: String,
        fix_id: serde_json::Value,
    },
    OrganizeImports {
        file: String,
    },
}

pub async fn code_action(
    session: &Session,
    params: CodeActionParams,
) -> Result<Option<CodeActionResponse>> {
    let Some(document) = session.document(&params.text_document.uri).await else {
        return Ok(None);
    };
    let only = params.context.only.as_deref();
    let mut actions: CodeActionResponse = Vec::new();

    if kind_requested(only, &CodeActionKind::QUICKFIX) {
        quickfixes(session, &document.path, params.range, &params.context.diagnostics, &mut actions)
            .await;
    }

    if kind_requested(only, &CodeActionKind::REFACTOR) {
        refactors(session, &document.path, params.range, &mut actions).await;
    }

    if kind_requested(only, &CodeActionKind::SOURCE_ORGANIZE_IMPORTS) {
        let data = ResolveData::OrganizeImports {
            file: document.path.clone(),
        };
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: "Organize Imports".into(),
            kind: Some(CodeActionKind::SOURCE_ORGANIZE_IMPORTS),
            data: serde_json::to_value(data).ok(),
            ..Default::default()
        }));
    }

    Ok(Some(actions))
}

fn kind_requested(only: Option<&[CodeActionKind]>, kind: &CodeActionKind) -> bool {
    match only {
        None => true,
        Some(kinds) => kinds
            .iter()
            .any(|requested| kind.as_str().starts_with(requested.as_str())),
    }
}

async fn quickfixes(
    session: &Session,
    path: &str,
    range: Range,
    diagnostics: &[Diagnostic],
    actions: &mut CodeActionResponse,
) {
    let fixable = session.fixable_codes().await;
    let error_codes: Vec<i32> = diagnostics
        .iter()
        .filter_map(|diagnostic| match &diagnostic.code {
            Some(NumberOrString::Number(code)) => Some(*code as i32),
            Some(NumberOrString::String(code)) => code.parse().ok(),
            None => None,
        })
        .filter(|code| fixable.is_empty() || fixable.contains(&code.to_string()))
        .collect();
    if error_codes.is_empty() {
        return;
    }

    let args = GetCodeFixesRequestArgs {
        range: file_range_args(path, range),
        error_codes,
    };
    let outcome = session.execute::<GetCodeFixes>(args, RequestOptions::default()).await;
    let Some(fixes) = outcome.into_body() else {
        return;
    };

    for fix in fixes {
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: fix.action.description.clone(),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(diagnostics.to_vec()),
            edit: Some(workspace_edit(&fix.action.changes)),
            ..Default::default()
        }));
        if let Some(fix_id) = fix.fix_id {
            let data = ResolveData::FixAll {
                file: path.to_string(),
                fix_id,
            };
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title: fix
                    .fix_all_description
                    .unwrap_or_else(|| format!("{} (fix all)", fix.action.description)),
                kind: Some(CodeActionKind::QUICKFIX),
                data: serde_json::to_value(data).ok(),
                ..Default::default()
            }));
        }
    }
}

async fn refactors(session: &Session, path: &str, range: Range, actions: &mut CodeActionResponse) {
    let args = file_range_args(path, range);
    let outcome = session
        .execute::<GetApplicableRefactors>(args, RequestOptions::default())
        .await;
    let Some(infos) = outcome.into_body() else {
        return;
    };

    for info in infos {
        for action in info.actions {
            let kind = action
                .kind
                .as_deref()
                .map(|kind| CodeActionKind::from(kind.to_string()))
                .unwrap_or(CodeActionKind::REFACTOR);
            let data = ResolveData::Refactor {
                file: path.to_string(),
                range,
                refactor: info.name.clone(),
                action: action.name.clone(),
            };
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title: action.description.clone(),
                kind: Some(kind),
                disabled: action.not_applicable_reason.map(|reason| {
                    tower_lsp::lsp_types::CodeActionDisabled { reason }
                }),
                data: serde_json::to_value(data).ok(),
                ..Default::default()
            }));
        }
    }
}

pub async fn resolve(session: &Session, mut action: CodeAction) -> Result<CodeAction> {
    let Some(data) = action.data.take() else {
        return Ok(action);
    };
    let data: ResolveData = match serde_json::from_value(data) {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, "code action with foreign resolve data");
            return Ok(action);
        }
    };

    match data {
        ResolveData::Refactor {
            file,
            range,
            refactor,
            action: action_name,
        } => {
            let args = GetEditsForRefactorRequestArgs {
                range: file_range_args(&file, range),
                refactor,
                action: action_name,
            };
            let outcome = session
                .execute::<GetEditsForRefactor>(args, RequestOptions::default())
                .await;
            match outcome {
                ResponseOutcome::Response(info) => {
                    action.edit = Some(workspace_edit(&info.edits));
                }
                ResponseOutcome::ServerError(message) => return Err(server_error(message)),
                _ => {}
            }
        }
        ResolveData::FixAll { file, fix_id } => {
            let args = GetCombinedCodeFixRequestArgs {
                scope: CombinedCodeFixScope::file(file),
                fix_id,
            };
            let outcome = session
                .execute::<GetCombinedCodeFix>(args, RequestOptions::default())
                .await;
            if let ResponseOutcome::Response(body) = outcome {
                action.edit = Some(workspace_edit(&body.changes));
            }
        }
        ResolveData::OrganizeImports { file } => {
            let args = OrganizeImportsRequestArgs {
                scope: CombinedCodeFixScope::file(file),
                skip_destructive_code_actions: Some(false),
            };
            let outcome = session
                .execute::<OrganizeImports>(args, RequestOptions::default())
                .await;
            if let ResponseOutcome::Response(edits) = outcome {
                action.edit = Some(workspace_edit(&edits));
            }
        }
    }
    Ok(action)
}

/// Edits for the `_typescript.organizeImports` command path.
pub async fn organize_imports_edit(
    session: &Session,
    path: &str,
) -> Result<Option<tower_lsp::lsp_types::WorkspaceEdit>> {
    let args = OrganizeImportsRequestArgs {
        scope: CombinedCodeFixScope::file(path),
        skip_destructive_code_actions: Some(false),
    };
    let outcome = session
        .execute::<OrganizeImports>(args, RequestOptions::default())
        .await;
    respond(outcome, |edits| Some(workspace_edit(&edits)))
}
