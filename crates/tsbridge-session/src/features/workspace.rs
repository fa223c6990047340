//! Workspace-level operations: commands and file renames

use serde_json::Value;
use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::{
    ExecuteCommandParams, RenameFilesParams, Url, WorkspaceEdit,
};
use tracing::warn;
use tsbridge_protocol::command::{FindSourceDefinition, GetEditsForFileRename};
use tsbridge_protocol::filepath::path_from_uri;
use tsbridge_protocol::types::GetEditsForFileRenameRequestArgs;
use tsbridge_tsserver::{RequestOptions, ResponseOutcome};

use crate::features::{
    code_actions, location_args, lsp_location, respond, server_error, workspace_edit,
};
use crate::session::Session;

pub const ORGANIZE_IMPORTS: &str = "_typescript.organizeImports";
pub const APPLY_WORKSPACE_EDIT: &str = "_typescript.applyWorkspaceEdit";
pub const GO_TO_SOURCE_DEFINITION: &str = "_typescript.goToSourceDefinition";

pub const COMMANDS: &[&str] = &[ORGANIZE_IMPORTS, APPLY_WORKSPACE_EDIT, GO_TO_SOURCE_DEFINITION];

pub async fn execute_command(
    session: &Session,
    params: ExecuteCommandParams,
) -> Result<Option<Value>> {
    match params.command.as_str() {
        ORGANIZE_IMPORTS => {
            let uri = argument::<Url>(&params.arguments, 0)?;
            let path = path_from_uri(&uri);
            let Some(edit) = code_actions::organize_imports_edit(session, &path).await? else {
                return Ok(None);
            };
            apply_edit(session, edit).await?;
            Ok(None)
        }
        APPLY_WORKSPACE_EDIT => {
            let edit = argument::<WorkspaceEdit>(&params.arguments, 0)?;
            apply_edit(session, edit).await?;
            Ok(None)
        }
        GO_TO_SOURCE_DEFINITION => {
            if !session.api_version.supports_source_definition() {
                return Err(Error {
                    code: ErrorCode::InvalidRequest,
                    message: format!(
                        "Go to source definition requires TypeScript 4.7 or newer (running {})",
                        session.api_version
                    )
                    .into(),
                    data: None,
                });
            }
            let uri = argument::<Url>(&params.arguments, 0)?;
            let position = argument::<tower_lsp::lsp_types::Position>(&params.arguments, 1)?;
            let args = location_args(path_from_uri(&uri), position);
            let outcome = session
                .execute::<FindSourceDefinition>(args, RequestOptions::default())
                .await;
            respond(outcome, |spans| {
                let locations: Vec<_> = spans.iter().filter_map(lsp_location).collect();
                serde_json::to_value(locations).ok()
            })
        }
        unknown => Err(Error {
            code: ErrorCode::MethodNotFound,
            message: format!("unknown command {unknown}").into(),
            data: None,
        }),
    }
}

fn argument<T: serde::de::DeserializeOwned>(arguments: &[Value], index: usize) -> Result<T> {
    arguments
        .get(index)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .ok_or_else(|| Error {
            code: ErrorCode::InvalidParams,
            message: format!("missing or malformed argument {index}").into(),
            data: None,
        })
}

async fn apply_edit(session: &Session, edit: WorkspaceEdit) -> Result<()> {
    match session.lsp.apply_edit(edit).await {
        Ok(response) if response.applied => Ok(()),
        Ok(response) => {
            warn!(reason = ?response.failure_reason, "editor rejected workspace edit");
            Err(server_error(
                response
                    .failure_reason
                    .unwrap_or_else(|| "the editor rejected the edit".to_string()),
            ))
        }
        Err(err) => Err(server_error(err.to_string())),
    }
}

/// `workspace/willRenameFiles`: ask tsserver for import updates for each
/// rename and merge the edits.
pub async fn will_rename_files(
    session: &Session,
    params: RenameFilesParams,
) -> Result<Option<WorkspaceEdit>> {
    let mut merged: Option<WorkspaceEdit> = None;
    for rename in &params.files {
        let (Ok(old_uri), Ok(new_uri)) = (Url::parse(&rename.old_uri), Url::parse(&rename.new_uri))
        else {
            continue;
        };
        let args = GetEditsForFileRenameRequestArgs {
            old_file_path: path_from_uri(&old_uri),
            new_file_path: path_from_uri(&new_uri),
        };
        let outcome = session
            .execute::<GetEditsForFileRename>(args, RequestOptions::default())
            .await;
        let edits = match outcome {
            ResponseOutcome::Response(edits) => edits,
            ResponseOutcome::Cancelled(_) => return Err(super::request_cancelled()),
            _ => continue,
        };
        let edit = workspace_edit(&edits);
        merged = Some(match merged.take() {
            None => edit,
            Some(mut existing) => {
                if let (Some(base), Some(new)) = (existing.changes.as_mut(), edit.changes) {
                    for (uri, edits) in new {
                        base.entry(uri).or_default().extend(edits);
                    }
                }
                existing
            }
        });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_extraction() {
        let arguments = vec![serde_json::json!("file:///p/a.ts")];
        let uri: Url = argument(&arguments, 0).unwrap();
        assert_eq!(uri.as_str(), "file:///p/a.ts");

        let missing: Result<Url> = argument(&arguments, 1);
        assert_eq!(missing.unwrap_err().code, ErrorCode::InvalidParams);
    }
}
