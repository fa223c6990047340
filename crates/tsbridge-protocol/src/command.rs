//! The closed command table
//!
//! Command names are loosely typed on the wire; [`CommandSpec`] closes them
//! over Rust types so an `execute::<C>` call site can only pair a command
//! with its own argument and body shapes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::*;

/// Static pairing of a command name with its argument and body types.
pub trait CommandSpec {
    const COMMAND: &'static str;
    type Args: Serialize + Send + Sync;
    type Body: DeserializeOwned + Send;
}

/// Wire names for every command the engine issues.
pub mod names {
    pub const OPEN: &str = "open";
    pub const CLOSE: &str = "close";
    pub const CHANGE: &str = "change";
    pub const UPDATE_OPEN: &str = "updateOpen";
    pub const CONFIGURE: &str = "configure";
    pub const COMPILER_OPTIONS_FOR_INFERRED_PROJECTS: &str = "compilerOptionsForInferredProjects";
    pub const CONFIGURE_PLUGIN: &str = "configurePlugin";
    pub const PROJECT_INFO: &str = "projectInfo";
    pub const GETERR: &str = "geterr";
    pub const GETERR_FOR_PROJECT: &str = "geterrForProject";
    pub const QUICKINFO: &str = "quickinfo";
    pub const COMPLETION_INFO: &str = "completionInfo";
    pub const COMPLETION_ENTRY_DETAILS: &str = "completionEntryDetails";
    pub const DEFINITION: &str = "definition";
    pub const DEFINITION_AND_BOUND_SPAN: &str = "definitionAndBoundSpan";
    pub const TYPE_DEFINITION: &str = "typeDefinition";
    pub const IMPLEMENTATION: &str = "implementation";
    pub const REFERENCES: &str = "references";
    pub const RENAME: &str = "rename";
    pub const NAV_TREE: &str = "navtree";
    pub const NAVTO: &str = "navto";
    pub const DOCUMENT_HIGHLIGHTS: &str = "documentHighlights";
    pub const SIGNATURE_HELP: &str = "signatureHelp";
    pub const FORMAT: &str = "format";
    pub const FORMATONKEY: &str = "formatonkey";
    pub const DOC_COMMENT_TEMPLATE: &str = "docCommentTemplate";
    pub const GET_OUTLINING_SPANS: &str = "getOutliningSpans";
    pub const SELECTION_RANGE: &str = "selectionRange";
    pub const GET_CODE_FIXES: &str = "getCodeFixes";
    pub const GET_COMBINED_CODE_FIX: &str = "getCombinedCodeFix";
    pub const GET_SUPPORTED_CODE_FIXES: &str = "getSupportedCodeFixes";
    pub const GET_APPLICABLE_REFACTORS: &str = "getApplicableRefactors";
    pub const GET_EDITS_FOR_REFACTOR: &str = "getEditsForRefactor";
    pub const ORGANIZE_IMPORTS: &str = "organizeImports";
    pub const GET_EDITS_FOR_FILE_RENAME: &str = "getEditsForFileRename";
    pub const PROVIDE_INLAY_HINTS: &str = "provideInlayHints";
    pub const PREPARE_CALL_HIERARCHY: &str = "prepareCallHierarchy";
    pub const PROVIDE_CALL_HIERARCHY_INCOMING_CALLS: &str = "provideCallHierarchyIncomingCalls";
    pub const PROVIDE_CALL_HIERARCHY_OUTGOING_CALLS: &str = "provideCallHierarchyOutgoingCalls";
    pub const ENCODED_SEMANTIC_CLASSIFICATIONS_FULL: &str = "encodedSemanticClassifications-full";
    pub const JSX_CLOSING_TAG: &str = "jsxClosingTag";
    pub const LINKED_EDITING_RANGE: &str = "linkedEditingRange";
    pub const FIND_SOURCE_DEFINITION: &str = "findSourceDefinition";
}

/// Commands that must stay strictly ordered with respect to every other
/// command touching the same buffer.
pub const FENCE_COMMANDS: &[&str] = &[
    names::OPEN,
    names::CLOSE,
    names::CHANGE,
    names::UPDATE_OPEN,
    names::CONFIGURE,
];

/// Commands whose completion is signaled by a `requestCompleted` event
/// instead of a response.
pub const ASYNC_COMMANDS: &[&str] = &[names::GETERR, names::GETERR_FOR_PROJECT];

pub fn is_fence(command: &str) -> bool {
    FENCE_COMMANDS.contains(&command)
}

pub fn is_async(command: &str) -> bool {
    ASYNC_COMMANDS.contains(&command)
}

macro_rules! command_spec {
    ($(#[$meta:meta])* $marker:ident, $name:expr, $args:ty, $body:ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub enum $marker {}

        impl CommandSpec for $marker {
            const COMMAND: &'static str = $name;
            type Args = $args;
            type Body = $body;
        }
    };
}

command_spec!(Configure, names::CONFIGURE, ConfigureRequestArgs, serde_json::Value);
command_spec!(
    CompilerOptionsForInferredProjects,
    names::COMPILER_OPTIONS_FOR_INFERRED_PROJECTS,
    SetCompilerOptionsForInferredProjectsArgs,
    serde_json::Value
);
command_spec!(ProjectInfo, names::PROJECT_INFO, ProjectInfoRequestArgs, ProjectInfoBody);
command_spec!(Geterr, names::GETERR, GeterrRequestArgs, serde_json::Value);
command_spec!(
    GeterrForProject,
    names::GETERR_FOR_PROJECT,
    GeterrForProjectRequestArgs,
    serde_json::Value
);
command_spec!(Quickinfo, names::QUICKINFO, FileLocationRequestArgs, QuickInfoBody);
command_spec!(
    CompletionInfo,
    names::COMPLETION_INFO,
    CompletionInfoRequestArgs,
    CompletionInfoBody
);
command_spec!(
    CompletionEntryDetails,
    names::COMPLETION_ENTRY_DETAILS,
    CompletionDetailsRequestArgs,
    Vec<crate::types::CompletionEntryDetails>
);
command_spec!(Definition, names::DEFINITION, FileLocationRequestArgs, Vec<FileSpan>);
command_spec!(
    DefinitionAndBoundSpan,
    names::DEFINITION_AND_BOUND_SPAN,
    FileLocationRequestArgs,
    DefinitionInfoAndBoundSpanBody
);
command_spec!(TypeDefinition, names::TYPE_DEFINITION, FileLocationRequestArgs, Vec<FileSpan>);
command_spec!(Implementation, names::IMPLEMENTATION, FileLocationRequestArgs, Vec<FileSpan>);
command_spec!(References, names::REFERENCES, FileLocationRequestArgs, ReferencesBody);
command_spec!(Rename, names::RENAME, RenameRequestArgs, RenameBody);
command_spec!(NavTree, names::NAV_TREE, FileRequestArgs, NavigationTree);
command_spec!(Navto, names::NAVTO, NavtoRequestArgs, Vec<NavtoItem>);
command_spec!(
    DocumentHighlights,
    names::DOCUMENT_HIGHLIGHTS,
    DocumentHighlightsRequestArgs,
    Vec<DocumentHighlightsItem>
);
command_spec!(
    SignatureHelp,
    names::SIGNATURE_HELP,
    SignatureHelpRequestArgs,
    SignatureHelpItems
);
command_spec!(Format, names::FORMAT, FormatRequestArgs, Vec<CodeEdit>);
command_spec!(
    GetOutliningSpans,
    names::GET_OUTLINING_SPANS,
    FileRequestArgs,
    Vec<OutliningSpan>
);
command_spec!(
    SelectionRange,
    names::SELECTION_RANGE,
    SelectionRangeRequestArgs,
    Vec<SelectionRangeItem>
);
command_spec!(
    GetCodeFixes,
    names::GET_CODE_FIXES,
    GetCodeFixesRequestArgs,
    Vec<CodeFixAction>
);
command_spec!(
    GetCombinedCodeFix,
    names::GET_COMBINED_CODE_FIX,
    GetCombinedCodeFixRequestArgs,
    CombinedCodeFixBody
);
command_spec!(
    GetSupportedCodeFixes,
    names::GET_SUPPORTED_CODE_FIXES,
    (),
    Vec<String>
);
command_spec!(
    GetApplicableRefactors,
    names::GET_APPLICABLE_REFACTORS,
    FileRangeRequestArgs,
    Vec<ApplicableRefactorInfo>
);
command_spec!(
    GetEditsForRefactor,
    names::GET_EDITS_FOR_REFACTOR,
    GetEditsForRefactorRequestArgs,
    RefactorEditInfo
);
command_spec!(
    OrganizeImports,
    names::ORGANIZE_IMPORTS,
    OrganizeImportsRequestArgs,
    Vec<FileCodeEdits>
);
command_spec!(
    GetEditsForFileRename,
    names::GET_EDITS_FOR_FILE_RENAME,
    GetEditsForFileRenameRequestArgs,
    Vec<FileCodeEdits>
);
command_spec!(
    ProvideInlayHints,
    names::PROVIDE_INLAY_HINTS,
    InlayHintsRequestArgs,
    Vec<InlayHintItem>
);
command_spec!(
    PrepareCallHierarchy,
    names::PREPARE_CALL_HIERARCHY,
    FileLocationRequestArgs,
    CallHierarchyItemOrList
);
command_spec!(
    ProvideCallHierarchyIncomingCalls,
    names::PROVIDE_CALL_HIERARCHY_INCOMING_CALLS,
    FileLocationRequestArgs,
    Vec<CallHierarchyIncomingCall>
);
command_spec!(
    ProvideCallHierarchyOutgoingCalls,
    names::PROVIDE_CALL_HIERARCHY_OUTGOING_CALLS,
    FileLocationRequestArgs,
    Vec<CallHierarchyOutgoingCall>
);
command_spec!(
    EncodedSemanticClassificationsFull,
    names::ENCODED_SEMANTIC_CLASSIFICATIONS_FULL,
    EncodedSemanticClassificationsRequestArgs,
    EncodedSemanticClassificationsBody
);
command_spec!(JsxClosingTag, names::JSX_CLOSING_TAG, FileLocationRequestArgs, JsxClosingTagBody);
command_spec!(
    LinkedEditingRange,
    names::LINKED_EDITING_RANGE,
    FileLocationRequestArgs,
    LinkedEditingRangesBody
);
command_spec!(
    FindSourceDefinition,
    names::FIND_SOURCE_DEFINITION,
    FileLocationRequestArgs,
    Vec<FileSpan>
);
