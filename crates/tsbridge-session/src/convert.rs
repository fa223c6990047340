//! Pure coordinate and kind translation
//!
//! LSP is zero-based, tsserver is one-based; both count UTF-16 code units,
//! so conversion is arithmetic. tsserver emits `(0, 0)` for buffers it has
//! not looked at yet, which clamps to LSP `(0, 0)` instead of underflowing.

use tower_lsp::lsp_types::{
    CompletionItemKind, DiagnosticSeverity, Position, Range, SymbolKind,
};
use tsbridge_protocol::types::{FileRangeRequestArgs, Location, TextSpan};

/// LSP position for a tsserver location.
pub fn position_from_ts(location: Location) -> Position {
    Position::new(
        location.line.saturating_sub(1),
        location.offset.saturating_sub(1),
    )
}

/// tsserver location for an LSP position.
pub fn position_to_ts(position: Position) -> Location {
    Location::new(position.line + 1, position.character + 1)
}

pub fn range_from_ts(span: TextSpan) -> Range {
    Range::new(position_from_ts(span.start), position_from_ts(span.end))
}

pub fn file_range_args(file: impl Into<String>, range: Range) -> FileRangeRequestArgs {
    let start = position_to_ts(range.start);
    let end = position_to_ts(range.end);
    FileRangeRequestArgs {
        file: file.into(),
        start_line: start.line,
        start_offset: start.offset,
        end_line: end.line,
        end_offset: end.offset,
    }
}

/// Intersection of two ranges; empty when one starts strictly after the
/// other ends.
pub fn range_intersection(a: Range, b: Range) -> Option<Range> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    if start > end {
        return None;
    }
    Some(Range::new(start, end))
}

/// Total map from tsserver `ScriptElementKind` strings to LSP symbol kinds.
/// Unknown kinds default to `Variable`.
pub fn symbol_kind_from_ts(kind: &str) -> SymbolKind {
    match kind {
        "module" | "external module name" => SymbolKind::MODULE,
        "class" | "local class" => SymbolKind::CLASS,
        "interface" => SymbolKind::INTERFACE,
        "type" => SymbolKind::CLASS,
        "enum" => SymbolKind::ENUM,
        "enum member" => SymbolKind::ENUM_MEMBER,
        "function" | "local function" => SymbolKind::FUNCTION,
        "method" => SymbolKind::METHOD,
        "getter" | "setter" => SymbolKind::PROPERTY,
        "property" | "JSX attribute" => SymbolKind::PROPERTY,
        "constructor" | "construct" => SymbolKind::CONSTRUCTOR,
        "parameter" => SymbolKind::VARIABLE,
        "type parameter" => SymbolKind::TYPE_PARAMETER,
        "string" => SymbolKind::STRING,
        "alias" => SymbolKind::VARIABLE,
        "const" | "let" | "var" | "local var" => SymbolKind::VARIABLE,
        "directory" => SymbolKind::FILE,
        _ => SymbolKind::VARIABLE,
    }
}

/// Completion item kinds follow the same table, shaped for the completion
/// list UI.
pub fn completion_kind_from_ts(kind: &str) -> CompletionItemKind {
    match kind {
        "primitive type" | "keyword" => CompletionItemKind::KEYWORD,
        "const" | "let" | "var" | "local var" | "alias" | "parameter" => {
            CompletionItemKind::VARIABLE
        }
        "property" | "getter" | "setter" => CompletionItemKind::FIELD,
        "function" | "local function" => CompletionItemKind::FUNCTION,
        "method" | "construct" | "call" | "index" => CompletionItemKind::METHOD,
        "enum" => CompletionItemKind::ENUM,
        "enum member" => CompletionItemKind::ENUM_MEMBER,
        "module" | "external module name" => CompletionItemKind::MODULE,
        "class" | "type" => CompletionItemKind::CLASS,
        "interface" => CompletionItemKind::INTERFACE,
        "warning" => CompletionItemKind::TEXT,
        "script" => CompletionItemKind::FILE,
        "directory" => CompletionItemKind::FOLDER,
        "string" => CompletionItemKind::CONSTANT,
        "snippet" => CompletionItemKind::SNIPPET,
        _ => CompletionItemKind::PROPERTY,
    }
}

/// tsserver diagnostic categories to LSP severities.
pub fn severity_from_category(category: &str) -> DiagnosticSeverity {
    match category {
        "error" => DiagnosticSeverity::ERROR,
        "warning" => DiagnosticSeverity::WARNING,
        "suggestion" => DiagnosticSeverity::HINT,
        _ => DiagnosticSeverity::INFORMATION,
    }
}

/// tsserver script kind names for the supported language ids; `None`
/// rejects the document.
pub fn script_kind_name(language_id: &str) -> Option<&'static str> {
    match language_id {
        "typescript" => Some("TS"),
        "typescriptreact" => Some("TSX"),
        "javascript" => Some("JS"),
        "javascriptreact" => Some("JSX"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_position_round_trip() {
        let position = Position::new(0, 6);
        assert_eq!(position_from_ts(position_to_ts(position)), position);
    }

    #[test]
    fn test_unsaved_buffer_location_clamps() {
        // tsserver answers (0, 0) for buffers it has not parsed yet.
        assert_eq!(position_from_ts(Location::new(0, 0)), Position::new(0, 0));
    }

    #[test]
    fn test_range_intersection_overlap() {
        let a = Range::new(Position::new(0, 0), Position::new(2, 0));
        let b = Range::new(Position::new(1, 3), Position::new(4, 0));
        assert_eq!(
            range_intersection(a, b),
            Some(Range::new(Position::new(1, 3), Position::new(2, 0)))
        );
    }

    #[test]
    fn test_range_intersection_disjoint() {
        let a = Range::new(Position::new(0, 0), Position::new(1, 0));
        let b = Range::new(Position::new(1, 1), Position::new(2, 0));
        assert_eq!(range_intersection(a, b), None);
    }

    #[test]
    fn test_touching_ranges_intersect_at_a_point() {
        let a = Range::new(Position::new(0, 0), Position::new(1, 0));
        let b = Range::new(Position::new(1, 0), Position::new(2, 0));
        assert_eq!(
            range_intersection(a, b),
            Some(Range::new(Position::new(1, 0), Position::new(1, 0)))
        );
    }

    #[test]
    fn test_unknown_symbol_kind_defaults_to_variable() {
        assert_eq!(symbol_kind_from_ts("some future kind"), SymbolKind::VARIABLE);
        assert_eq!(symbol_kind_from_ts("interface"), SymbolKind::INTERFACE);
    }

    #[test]
    fn test_script_kind_names() {
        assert_eq!(script_kind_name("typescript"), Some("TS"));
        assert_eq!(script_kind_name("typescriptreact"), Some("TSX"));
        assert_eq!(script_kind_name("javascript"), Some("JS"));
        assert_eq!(script_kind_name("javascriptreact"), Some("JSX"));
        assert_eq!(script_kind_name("rust"), None);
    }

    proptest! {
        // Round-trip for every valid LSP position.
        #[test]
        fn prop_position_round_trip(line in 0u32..100_000, character in 0u32..10_000) {
            let position = Position::new(line, character);
            prop_assert_eq!(position_from_ts(position_to_ts(position)), position);
        }

        // tsserver locations round-trip modulo the one-based clamp.
        #[test]
        fn prop_ts_location_round_trip(line in 1u32..100_000, offset in 1u32..10_000) {
            let location = Location::new(line, offset);
            prop_assert_eq!(position_to_ts(position_from_ts(location)), location);
        }
    }
}
