//! Merged user preferences and their delivery to tsserver
//!
//! Settings arrive from initialization options and every
//! `workspace/didChangeConfiguration`, deep-merged over defaults with
//! later writes winning per key. Two commands push them down: `configure`
//! (host info, format options, preferences) and
//! `compilerOptionsForInferredProjects` for files outside any tsconfig.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{json, Value};
use tracing::debug;
use tsbridge_protocol::command::{CompilerOptionsForInferredProjects, Configure};
use tsbridge_protocol::types::{
    ConfigureRequestArgs, FormatCodeSettings, InferredProjectCompilerOptions,
    SetCompilerOptionsForInferredProjectsArgs, UserPreferences,
};
use tsbridge_tsserver::{RequestOptions, TsClient};

const HOST_INFO: &str = "tsbridge";

struct State {
    merged: Value,
    /// Format options last pushed per file, so per-document `configure`
    /// only goes out when something changed.
    per_file_format: HashMap<String, FormatCodeSettings>,
}

/// Owns the merged settings object.
pub struct ConfigurationManager {
    workspace_root: Option<PathBuf>,
    state: Mutex<State>,
}

impl ConfigurationManager {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self {
            workspace_root,
            state: Mutex::new(State {
                merged: Self::defaults(),
                per_file_format: HashMap::new(),
            }),
        }
    }

    fn defaults() -> Value {
        json!({
            "diagnostics": { "ignoredCodes": [] },
            "format": {},
            "preferences": {},
            "implicitProjectConfiguration": {
                "module": "ESNext",
                "target": "ES2020",
                "jsx": "React",
                "moduleResolution": "Node",
            },
        })
    }

    /// Deep-merge `incoming` over the current settings.
    pub fn update(&self, incoming: &Value) {
        let mut state = self.state.lock().expect("configuration lock");
        deep_merge(&mut state.merged, incoming);
        // Cached per-file pushes are stale once globals move.
        state.per_file_format.clear();
        debug!("configuration updated");
    }

    pub fn ignored_codes(&self) -> HashSet<i32> {
        let state = self.state.lock().expect("configuration lock");
        state.merged["diagnostics"]["ignoredCodes"]
            .as_array()
            .map(|codes| codes.iter().filter_map(Value::as_i64).map(|c| c as i32).collect())
            .unwrap_or_default()
    }

    pub fn format_options(&self) -> FormatCodeSettings {
        let state = self.state.lock().expect("configuration lock");
        serde_json::from_value(state.merged["format"].clone()).unwrap_or_default()
    }

    pub fn user_preferences(&self) -> UserPreferences {
        let state = self.state.lock().expect("configuration lock");
        let mut preferences: UserPreferences =
            serde_json::from_value(state.merged["preferences"].clone()).unwrap_or_default();
        drop(state);
        if let Some(patterns) = preferences.auto_import_file_exclude_patterns.take() {
            preferences.auto_import_file_exclude_patterns = Some(normalize_exclude_patterns(
                &patterns,
                self.workspace_root.as_deref(),
            ));
        }
        if preferences.display_part_link_support.is_none() {
            preferences.display_part_link_support = Some(true);
        }
        preferences
    }

    pub fn inferred_project_options(&self) -> InferredProjectCompilerOptions {
        let state = self.state.lock().expect("configuration lock");
        let mut options: InferredProjectCompilerOptions =
            serde_json::from_value(state.merged["implicitProjectConfiguration"].clone())
                .unwrap_or_default();
        options.allow_js = Some(true);
        options.allow_non_ts_extensions = Some(true);
        options.allow_synthetic_default_imports = Some(true);
        options.resolve_json_module = Some(true);
        options
    }

    /// Send the full `configure` + inferred-project options. Called after
    /// the first successful start and after every configuration change.
    pub async fn push(&self, client: &TsClient) {
        let configure = ConfigureRequestArgs {
            host_info: Some(HOST_INFO.to_string()),
            file: None,
            format_options: Some(self.format_options()),
            preferences: Some(self.user_preferences()),
        };
        client
            .execute::<Configure>(configure, RequestOptions::default())
            .await;

        let options = SetCompilerOptionsForInferredProjectsArgs {
            options: self.inferred_project_options(),
        };
        client
            .execute::<CompilerOptionsForInferredProjects>(options, RequestOptions::default())
            .await;
    }

    /// Per-document format options, pushed lazily before format-sensitive
    /// requests. `tab_size`/`insert_spaces` from the LSP request win over
    /// the global settings.
    pub async fn ensure_configured_for_document(
        &self,
        client: &TsClient,
        path: &str,
        tab_size: Option<u32>,
        insert_spaces: Option<bool>,
    ) {
        let mut options = self.format_options();
        if let Some(tab_size) = tab_size {
            options.tab_size = Some(tab_size);
            options.indent_size = Some(tab_size);
        }
        if let Some(insert_spaces) = insert_spaces {
            options.convert_tabs_to_spaces = Some(insert_spaces);
        }

        {
            let mut state = self.state.lock().expect("configuration lock");
            if state.per_file_format.get(path) == Some(&options) {
                return;
            }
            state.per_file_format.insert(path.to_string(), options.clone());
        }

        let configure = ConfigureRequestArgs {
            host_info: None,
            file: Some(path.to_string()),
            format_options: Some(options),
            preferences: None,
        };
        client
            .execute::<Configure>(configure, RequestOptions::default())
            .await;
    }
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Published normalization rules: absolute paths pass through, `*`-prefixed
/// patterns are rooted, `./`-relative ones join the workspace root, and
/// everything else matches at any depth.
fn normalize_exclude_patterns(patterns: &[String], root: Option<&std::path::Path>) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| {
            if pattern.starts_with('/') {
                pattern.clone()
            } else if pattern.starts_with('*') {
                format!("/{pattern}")
            } else if let Some(relative) = pattern.strip_prefix("./") {
                match root {
                    Some(root) => root.join(relative).to_string_lossy().into_owned(),
                    None => format!("/{relative}"),
                }
            } else {
                format!("/**/{pattern}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_exclude_pattern_normalization() {
        let root = Path::new("/w");
        let input = vec![
            "./foo".to_string(),
            "*.test.ts".to_string(),
            "/abs".to_string(),
            "bar/baz".to_string(),
        ];
        assert_eq!(
            normalize_exclude_patterns(&input, Some(root)),
            vec!["/w/foo", "/*.test.ts", "/abs", "/**/bar/baz"]
        );
    }

    #[test]
    fn test_deep_merge_later_writes_win_per_key() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": true});
        deep_merge(&mut base, &json!({"a": {"y": 3, "z": 4}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": true}));
    }

    #[test]
    fn test_update_merges_over_defaults() {
        let config = ConfigurationManager::new(Some(PathBuf::from("/w")));
        config.update(&json!({
            "diagnostics": { "ignoredCodes": [6133, 2322] },
            "implicitProjectConfiguration": { "target": "ES2022" },
        }));

        let codes = config.ignored_codes();
        assert!(codes.contains(&6133) && codes.contains(&2322));

        let options = config.inferred_project_options();
        assert_eq!(options.target.as_deref(), Some("ES2022"));
        // Untouched defaults survive the merge.
        assert_eq!(options.module.as_deref(), Some("ESNext"));
        assert_eq!(options.jsx.as_deref(), Some("React"));
        assert_eq!(options.allow_js, Some(true));
        assert_eq!(options.resolve_json_module, Some(true));
    }

    #[test]
    fn test_preferences_pick_up_exclude_normalization() {
        let config = ConfigurationManager::new(Some(PathBuf::from("/w")));
        config.update(&json!({
            "preferences": { "autoImportFileExcludePatterns": ["./gen", "*.d.ts"] },
        }));
        let preferences = config.user_preferences();
        assert_eq!(
            preferences.auto_import_file_exclude_patterns.unwrap(),
            vec!["/w/gen", "/*.d.ts"]
        );
    }

    #[test]
    fn test_unknown_preference_keys_flow_through() {
        let config = ConfigurationManager::new(None);
        config.update(&json!({
            "preferences": { "organizeImportsIgnoreCase": true },
        }));
        let preferences = config.user_preferences();
        assert_eq!(
            preferences.extra.get("organizeImportsIgnoreCase"),
            Some(&json!(true))
        );
    }
}
