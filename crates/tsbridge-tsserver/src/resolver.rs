//! Locating tsserver and reading its version
//!
//! Resolution order: an explicit user-configured path wins; otherwise each
//! workspace folder is walked up to the filesystem root probing the known
//! `tsserver.js` locations; otherwise the bundled fallback. A candidate only
//! counts if its `package.json` version parses; a probe hit with an
//! unreadable version falls through with a user-visible warning.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use tsbridge_protocol::ApiVersion;

/// Directories probed under every ancestor of a workspace folder.
const PROBE_DIRS: &[&str] = &[
    "node_modules/typescript/lib",
    ".vscode/pnpify/typescript/lib",
    ".yarn/sdks/typescript/lib",
];

const TSSERVER_JS: &str = "tsserver.js";

/// Where the resolved server came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    UserSetting,
    Workspace,
    Bundled,
}

/// A usable tsserver: the script to hand to node, plus its version.
#[derive(Debug, Clone)]
pub struct TsServerResolution {
    pub tsserver_path: PathBuf,
    pub version: ApiVersion,
    pub source: ResolutionSource,
}

/// Resolves the tsserver executable per the configured search order.
pub struct VersionResolver {
    user_path: Option<PathBuf>,
    workspace_folders: Vec<PathBuf>,
    bundled_path: Option<PathBuf>,
}

impl VersionResolver {
    pub fn new(
        user_path: Option<PathBuf>,
        workspace_folders: Vec<PathBuf>,
        bundled_path: Option<PathBuf>,
    ) -> Self {
        Self {
            user_path,
            workspace_folders,
            bundled_path,
        }
    }

    /// Run the resolution. Returns the pick plus any user-visible warnings
    /// accumulated on the way (bad user path, unreadable versions).
    pub fn resolve(&self) -> (Option<TsServerResolution>, Vec<String>) {
        let mut warnings = Vec::new();

        if let Some(user_path) = &self.user_path {
            match self.resolve_candidate(user_path, ResolutionSource::UserSetting) {
                Some(resolution) => return (Some(resolution), warnings),
                None => warnings.push(format!(
                    "Configured tsserver path {} is not usable, falling back to workspace lookup",
                    user_path.display()
                )),
            }
        }

        for folder in &self.workspace_folders {
            if let Some(resolution) = self.probe_ancestors(folder) {
                return (Some(resolution), warnings);
            }
        }

        if let Some(bundled) = &self.bundled_path {
            match self.resolve_candidate(bundled, ResolutionSource::Bundled) {
                Some(resolution) => return (Some(resolution), warnings),
                None => warnings.push(format!(
                    "Bundled TypeScript at {} has no readable version",
                    bundled.display()
                )),
            }
        }

        warnings.push("No usable TypeScript installation found".to_string());
        (None, warnings)
    }

    fn probe_ancestors(&self, folder: &Path) -> Option<TsServerResolution> {
        let mut current = Some(folder);
        while let Some(dir) = current {
            for probe in PROBE_DIRS {
                let candidate = dir.join(probe).join(TSSERVER_JS);
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "workspace tsserver candidate");
                    if let Some(resolution) =
                        self.resolve_candidate(&candidate, ResolutionSource::Workspace)
                    {
                        return Some(resolution);
                    }
                }
            }
            current = dir.parent();
        }
        None
    }

    fn resolve_candidate(
        &self,
        path: &Path,
        source: ResolutionSource,
    ) -> Option<TsServerResolution> {
        let tsserver_path = if path.is_dir() {
            path.join(TSSERVER_JS)
        } else {
            path.to_path_buf()
        };
        if !tsserver_path.is_file() {
            return None;
        }
        let version = read_package_version(&tsserver_path)?;
        Some(TsServerResolution {
            tsserver_path,
            version,
            source,
        })
    }
}

#[derive(Deserialize)]
struct PackageJson {
    version: String,
}

/// Read the version from `package.json` two directories above the script
/// (`lib/tsserver.js` → `package.json`), or one for dev "built" layouts.
fn read_package_version(tsserver_js: &Path) -> Option<ApiVersion> {
    let lib_dir = tsserver_js.parent()?;
    let candidates = [
        lib_dir.parent().map(|dir| dir.join("package.json")),
        Some(lib_dir.join("package.json")),
    ];
    for manifest in candidates.into_iter().flatten() {
        let Ok(raw) = std::fs::read_to_string(&manifest) else {
            continue;
        };
        let Ok(package) = serde_json::from_str::<PackageJson>(&raw) else {
            warn!(path = %manifest.display(), "unparseable package.json");
            continue;
        };
        match package.version.parse::<ApiVersion>() {
            Ok(version) => return Some(version),
            Err(error) => {
                warn!(
                    path = %manifest.display(),
                    version = %package.version,
                    %error,
                    "package.json version does not parse"
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_install(root: &Path, version: &str) -> PathBuf {
        let lib = root.join("node_modules/typescript/lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join(TSSERVER_JS), "// tsserver").unwrap();
        fs::write(
            root.join("node_modules/typescript/package.json"),
            format!(r#"{{"name": "typescript", "version": "{version}"}}"#),
        )
        .unwrap();
        lib.join(TSSERVER_JS)
    }

    #[test]
    fn test_workspace_resolution() {
        let dir = tempfile::tempdir().unwrap();
        fake_install(dir.path(), "5.2.2");

        let resolver = VersionResolver::new(None, vec![dir.path().to_path_buf()], None);
        let (resolution, warnings) = resolver.resolve();
        let resolution = resolution.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Workspace);
        assert_eq!(resolution.version, "5.2.2".parse().unwrap());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_walks_up_to_parent_folders() {
        let dir = tempfile::tempdir().unwrap();
        fake_install(dir.path(), "4.9.5");
        let nested = dir.path().join("packages/app/src");
        fs::create_dir_all(&nested).unwrap();

        let resolver = VersionResolver::new(None, vec![nested], None);
        let (resolution, _) = resolver.resolve();
        assert_eq!(resolution.unwrap().version, "4.9.5".parse().unwrap());
    }

    #[test]
    fn test_user_path_wins_over_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        fake_install(workspace.path(), "5.0.0");
        let user = tempfile::tempdir().unwrap();
        let user_tsserver = fake_install(user.path(), "5.4.0");

        let resolver = VersionResolver::new(
            Some(user_tsserver),
            vec![workspace.path().to_path_buf()],
            None,
        );
        let (resolution, _) = resolver.resolve();
        let resolution = resolution.unwrap();
        assert_eq!(resolution.source, ResolutionSource::UserSetting);
        assert_eq!(resolution.version, "5.4.0".parse().unwrap());
    }

    #[test]
    fn test_unparseable_version_warns_and_falls_back() {
        let workspace = tempfile::tempdir().unwrap();
        let lib = workspace.path().join("node_modules/typescript/lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join(TSSERVER_JS), "// tsserver").unwrap();
        fs::write(
            workspace.path().join("node_modules/typescript/package.json"),
            r#"{"version": "not-a-version"}"#,
        )
        .unwrap();

        let bundled = tempfile::tempdir().unwrap();
        let bundled_tsserver = fake_install(bundled.path(), "5.1.6");

        let resolver = VersionResolver::new(
            None,
            vec![workspace.path().to_path_buf()],
            Some(bundled_tsserver),
        );
        let (resolution, _) = resolver.resolve();
        let resolution = resolution.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Bundled);
    }

    #[test]
    fn test_nothing_found_reports_warning() {
        let empty = tempfile::tempdir().unwrap();
        let resolver = VersionResolver::new(None, vec![empty.path().to_path_buf()], None);
        let (resolution, warnings) = resolver.resolve();
        assert!(resolution.is_none());
        assert!(!warnings.is_empty());
    }
}
