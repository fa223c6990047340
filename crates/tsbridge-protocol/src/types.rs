//! Payload structures for the commands and events the engine drives
//!
//! Shapes follow the server's `protocol.d.ts` naming, spelled camelCase on
//! the wire. Fields the engine never reads are omitted; serde ignores the
//! extras. Where the server sends a union (documentation as a bare string
//! or as display parts), an untagged enum carries both arms.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A one-based line/offset pair, counted in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub offset: u32,
}

impl Location {
    pub fn new(line: u32, offset: u32) -> Self {
        Self { line, offset }
    }
}

/// A half-open span between two locations in one file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: Location,
    pub end: Location,
}

/// A span tied to the file it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpan {
    pub file: String,
    pub start: Location,
    pub end: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_start: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_end: Option<Location>,
}

// ---------------------------------------------------------------------------
// Requests: common argument shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequestArgs {
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLocationRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRangeRequestArgs {
    pub file: String,
    pub start_line: u32,
    pub start_offset: u32,
    pub end_line: u32,
    pub end_offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequestArgs {
    pub file: String,
    pub file_content: String,
    /// One of `TS`, `TSX`, `JS`, `JSX`.
    pub script_kind_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root_path: Option<String>,
}

/// Coordinates name the range *before* the edit is applied locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub end_line: u32,
    pub end_offset: u32,
    pub insert_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeterrRequestArgs {
    pub files: Vec<String>,
    pub delay: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeterrForProjectRequestArgs {
    pub file: String,
    pub delay: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequestArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_options: Option<FormatCodeSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<UserPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCompilerOptionsForInferredProjectsArgs {
    pub options: InferredProjectCompilerOptions,
}

/// Compiler options applied to files outside any `tsconfig.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredProjectCompilerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_js: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_non_ts_extensions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_synthetic_default_imports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_json_module: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_null_checks: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Formatting knobs pushed with `configure` and per-request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatCodeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_indent_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line_character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_tabs_to_spaces: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_comma_delimiter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_semicolon_in_for_statements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_before_and_after_binary_operators: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_keywords_in_control_flow_statements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_function_keyword_for_anonymous_functions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_opening_and_before_closing_nonempty_parenthesis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_opening_and_before_closing_nonempty_brackets: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_opening_and_before_closing_nonempty_braces: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_before_function_parenthesis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_open_brace_on_new_line_for_functions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_open_brace_on_new_line_for_control_blocks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semicolons: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The preferences half of `configure`. Open-ended upstream; the typed
/// fields are the ones the adapter sets itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_module_specifier_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_completions_for_module_exports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_completions_with_insert_text: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_completions_with_snippet_text: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_automatic_optional_chain_completions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_completions_with_class_member_snippets: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_attribute_completion_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provide_prefix_and_suffix_text_for_rename: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_rename_of_imports_and_exports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_package_json_auto_imports: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_import_file_exclude_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_parameter_name_hints: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_parameter_name_hints_when_argument_matches_name: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_function_parameter_type_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_variable_type_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_variable_type_hints_when_type_matches_name: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_property_declaration_type_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_function_like_return_type_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_inlay_enum_member_value_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_part_link_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_line_text_in_references: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// One diagnostic as pushed in `syntaxDiag`/`semanticDiag`/`suggestionDiag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsDiagnostic {
    pub start: Location,
    pub end: Location,
    pub text: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_unnecessary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_deprecated: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_information: Option<Vec<TsDiagnosticRelatedInformation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsDiagnosticRelatedInformation {
    pub message: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<FileSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEventBody {
    pub file: String,
    pub diagnostics: Vec<TsDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCompletedEventBody {
    pub request_seq: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLoadingEventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Display parts and documentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDisplayPart {
    pub text: String,
    pub kind: String,
    /// Present on `linkName` parts resolved by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<FileSpan>,
}

/// Documentation arrives as a plain string from older servers and as
/// display parts from newer ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrDisplayParts {
    Text(String),
    Parts(Vec<SymbolDisplayPart>),
}

impl TextOrDisplayParts {
    pub fn is_empty(&self) -> bool {
        match self {
            TextOrDisplayParts::Text(text) => text.is_empty(),
            TextOrDisplayParts::Parts(parts) => parts.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsDocTagInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOrDisplayParts>,
}

// ---------------------------------------------------------------------------
// Hover, navigation, references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickInfoBody {
    pub kind: String,
    pub kind_modifiers: String,
    pub start: Location,
    pub end: Location,
    pub display_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<TextOrDisplayParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<JsDocTagInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInfoAndBoundSpanBody {
    pub definitions: Vec<FileSpan>,
    pub text_span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesBody {
    pub refs: Vec<ReferenceEntry>,
    pub symbol_name: String,
    pub symbol_display_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_start_offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    #[serde(flatten)]
    pub span: FileSpan,
    pub is_write_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_definition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTree {
    pub text: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    pub spans: Vec<TextSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_span: Option<TextSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_items: Option<Vec<NavigationTree>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavtoItem {
    pub name: String,
    pub kind: String,
    pub file: String,
    pub start: Location,
    pub end: Location,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavtoRequestArgs {
    pub search_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_result_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHighlightsRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub files_to_search: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHighlightsItem {
    pub file: String,
    pub highlight_spans: Vec<HighlightSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSpan {
    pub start: Location,
    pub end: Location,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInfoRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_kind: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInfoBody {
    pub is_global_completion: bool,
    pub is_member_completion: bool,
    pub is_new_identifier_location: bool,
    pub entries: Vec<CompletionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_incomplete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional_replacement_span: Option<TextSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
    pub sort_text: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_snippet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_span: Option<TextSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_action: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_display: Option<Vec<SymbolDisplayPart>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_details: Option<CompletionEntryLabelDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_recommended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_import_statement_completion: Option<bool>,
    /// Opaque resolve payload, echoed back in `completionEntryDetails`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntryLabelDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetailsRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub entry_names: Vec<CompletionEntryIdentifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntryIdentifier {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntryDetails {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    pub display_parts: Vec<SymbolDisplayPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<TextOrDisplayParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<JsDocTagInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_actions: Option<Vec<CodeAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_display: Option<Vec<SymbolDisplayPart>>,
}

// ---------------------------------------------------------------------------
// Edits, code actions, refactors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdit {
    pub start: Location,
    pub end: Location,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCodeEdits {
    pub file_name: String,
    pub text_changes: Vec<CodeEdit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub description: String,
    pub changes: Vec<FileCodeEdits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFixAction {
    #[serde(flatten)]
    pub action: CodeAction,
    pub fix_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_all_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCodeFixesRequestArgs {
    #[serde(flatten)]
    pub range: FileRangeRequestArgs,
    pub error_codes: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCombinedCodeFixRequestArgs {
    pub scope: CombinedCodeFixScope,
    pub fix_id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedCodeFixScope {
    #[serde(rename = "type")]
    pub kind: String,
    pub args: FileRequestArgs,
}

impl CombinedCodeFixScope {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            kind: "file".into(),
            args: FileRequestArgs { file: file.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedCodeFixBody {
    pub changes: Vec<FileCodeEdits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicableRefactorInfo {
    pub name: String,
    pub description: String,
    pub actions: Vec<RefactorActionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inlineable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorActionInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_applicable_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_interactive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEditsForRefactorRequestArgs {
    #[serde(flatten)]
    pub range: FileRangeRequestArgs,
    pub refactor: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorEditInfo {
    pub edits: Vec<FileCodeEdits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_applicable_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeImportsRequestArgs {
    pub scope: CombinedCodeFixScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_destructive_code_actions: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEditsForFileRenameRequestArgs {
    pub old_file_path: String,
    pub new_file_path: String,
}

// ---------------------------------------------------------------------------
// Rename, signature help, formatting, structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find_in_comments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find_in_strings: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameBody {
    pub info: RenameInfo,
    pub locs: Vec<RenameSpanGroup>,
}

/// Success and failure arms share a struct; `can_rename` picks the arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameInfo {
    pub can_rename: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind_modifiers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_span: Option<TextSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localized_error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSpanGroup {
    pub file: String,
    pub locs: Vec<RenameTextSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameTextSpan {
    pub start: Location,
    pub end: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpRequestArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_reason: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItems {
    pub items: Vec<SignatureHelpItem>,
    pub applicable_span: TextSpan,
    pub selected_item_index: u32,
    pub argument_index: u32,
    pub argument_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItem {
    pub is_variadic: bool,
    pub prefix_display_parts: Vec<SymbolDisplayPart>,
    pub suffix_display_parts: Vec<SymbolDisplayPart>,
    pub separator_display_parts: Vec<SymbolDisplayPart>,
    pub parameters: Vec<SignatureHelpParameter>,
    #[serde(default)]
    pub documentation: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub tags: Vec<JsDocTagInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpParameter {
    pub name: String,
    pub display_parts: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub documentation: Vec<SymbolDisplayPart>,
    pub is_optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequestArgs {
    #[serde(flatten)]
    pub range: FileRangeRequestArgs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<FormatCodeSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutliningSpan {
    pub text_span: TextSpan,
    pub hint_span: TextSpan,
    pub banner_text: String,
    pub auto_collapse: bool,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRangeRequestArgs {
    pub file: String,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRangeItem {
    pub text_span: TextSpan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<SelectionRangeItem>>,
}

// ---------------------------------------------------------------------------
// Inlay hints, call hierarchy, semantic classification
// ---------------------------------------------------------------------------

/// `start`/`length` are flat file offsets, not line/offset pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlayHintsRequestArgs {
    pub file: String,
    pub start: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlayHintItem {
    pub text: String,
    pub position: Location,
    /// `Type`, `Parameter`, or `Enum`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitespace_before: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitespace_after: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_parts: Option<Vec<InlayHintDisplayPart>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlayHintDisplayPart {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<FileSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyItem {
    pub name: String,
    pub kind: String,
    pub file: String,
    pub span: TextSpan,
    pub selection_span: TextSpan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind_modifiers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyIncomingCall {
    pub from: CallHierarchyItem,
    pub from_spans: Vec<TextSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyOutgoingCall {
    pub to: CallHierarchyItem,
    pub from_spans: Vec<TextSpan>,
}

/// One of the arms of `prepareCallHierarchy`: a single item or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallHierarchyItemOrList {
    One(Box<CallHierarchyItem>),
    Many(Vec<CallHierarchyItem>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedSemanticClassificationsRequestArgs {
    pub file: String,
    pub start: u32,
    pub length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// `spans` is a flat `(offset, length, classification)` triple stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedSemanticClassificationsBody {
    pub spans: Vec<u32>,
    pub end_of_line_state: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsxClosingTagBody {
    pub new_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caret_offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEditingRangesBody {
    pub ranges: Vec<TextSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfoRequestArgs {
    pub file: String,
    pub need_file_name_list: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfoBody {
    pub config_file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_service_disabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diagnostic_event_body_parses() {
        let body: DiagnosticEventBody = serde_json::from_value(json!({
            "file": "/p/a.ts",
            "diagnostics": [{
                "start": {"line": 1, "offset": 7},
                "end": {"line": 1, "offset": 13},
                "text": "Type 'string' is not assignable to type 'number'.",
                "code": 2322,
                "category": "error",
            }],
        }))
        .unwrap();
        assert_eq!(body.diagnostics.len(), 1);
        assert_eq!(body.diagnostics[0].code, Some(2322));
        assert_eq!(body.diagnostics[0].start, Location::new(1, 7));
    }

    #[test]
    fn test_documentation_union_parses_both_arms() {
        let text: TextOrDisplayParts = serde_json::from_value(json!("plain")).unwrap();
        assert_eq!(text, TextOrDisplayParts::Text("plain".into()));

        let parts: TextOrDisplayParts =
            serde_json::from_value(json!([{"text": "x", "kind": "text"}])).unwrap();
        match parts {
            TextOrDisplayParts::Parts(parts) => assert_eq!(parts[0].text, "x"),
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn test_reference_entry_flattens_span() {
        let entry: ReferenceEntry = serde_json::from_value(json!({
            "file": "/p/a.ts",
            "start": {"line": 2, "offset": 1},
            "end": {"line": 2, "offset": 4},
            "isWriteAccess": true,
            "isDefinition": false,
        }))
        .unwrap();
        assert_eq!(entry.span.file, "/p/a.ts");
        assert!(entry.is_write_access);
    }

    #[test]
    fn test_code_fix_action_flattens_base() {
        let fix: CodeFixAction = serde_json::from_value(json!({
            "description": "Remove unused declaration",
            "changes": [{"fileName": "/p/a.ts", "textChanges": []}],
            "fixName": "unusedIdentifier",
            "fixId": {"x": 1},
        }))
        .unwrap();
        assert_eq!(fix.fix_name, "unusedIdentifier");
        assert_eq!(fix.action.changes[0].file_name, "/p/a.ts");
    }

    #[test]
    fn test_change_args_serialize_camel_case() {
        let args = ChangeRequestArgs {
            file: "/p/a.ts".into(),
            line: 1,
            offset: 7,
            end_line: 1,
            end_offset: 13,
            insert_string: "string".into(),
        };
        let wire = serde_json::to_value(&args).unwrap();
        assert_eq!(wire["endLine"], 1);
        assert_eq!(wire["insertString"], "string");
    }
}
