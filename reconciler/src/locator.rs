//! Where Cursor keeps its stores, and which workspace folder belongs to a
//! project directory.

use crate::collect::best_effort;
use crate::config::EfficiencyConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Per-workspace metadata file written by the editor.
pub const WORKSPACE_META_FILE: &str = "workspace.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseDir {
    Home,
    AppData,
}

struct PlatformRoot {
    os: &'static str,
    base: BaseDir,
    segments: &'static [&'static str],
}

const LINUX_ROOT: PlatformRoot = PlatformRoot {
    os: "linux",
    base: BaseDir::Home,
    segments: &[".config", "Cursor", "User"],
};

/// Cursor `User` directory per platform. Unknown platforms use the linux row.
const PLATFORM_ROOTS: &[PlatformRoot] = &[
    PlatformRoot {
        os: "macos",
        base: BaseDir::Home,
        segments: &["Library", "Application Support", "Cursor", "User"],
    },
    PlatformRoot {
        os: "windows",
        base: BaseDir::AppData,
        segments: &["Cursor", "User"],
    },
    LINUX_ROOT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    /// One sub-directory per workspace identity.
    pub workspace: PathBuf,
    /// Holds the global `state.vscdb`.
    pub global: PathBuf,
}

impl StorageRoots {
    /// Pure lookup: the same inputs always produce the same paths, whether or
    /// not anything exists there.
    pub fn resolve(os: &str, home: &Path, appdata: Option<&Path>) -> Self {
        let row = PLATFORM_ROOTS
            .iter()
            .find(|r| r.os == os)
            .unwrap_or(&LINUX_ROOT);

        let mut base = match row.base {
            BaseDir::Home => home.to_path_buf(),
            BaseDir::AppData => appdata.map(Path::to_path_buf).unwrap_or_default(),
        };
        for segment in row.segments {
            base.push(segment);
        }
        Self::from_user_dir(&base)
    }

    pub fn from_user_dir(user_dir: &Path) -> Self {
        Self {
            workspace: user_dir.join("workspaceStorage"),
            global: user_dir.join("globalStorage"),
        }
    }

    /// Roots for the machine we're running on.
    pub fn detect() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        let appdata = std::env::var_os("APPDATA").map(PathBuf::from);
        Self::resolve(std::env::consts::OS, &home, appdata.as_deref())
    }

    pub fn from_config(config: &EfficiencyConfig) -> Self {
        match &config.cursor_user_dir {
            Some(dir) => Self::from_user_dir(dir),
            None => Self::detect(),
        }
    }

    pub fn global_db(&self) -> PathBuf {
        self.global.join(crate::store::STATE_DB_FILE)
    }

    pub fn workspace_db(&self, identity: &str) -> PathBuf {
        self.workspace
            .join(identity)
            .join(crate::store::STATE_DB_FILE)
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceMeta {
    folder: Option<String>,
}

#[derive(Debug)]
struct WorkspaceEntry {
    identity: String,
    folder: Option<PathBuf>,
}

/// Find the storage identity whose `workspace.json` points at `workspace_dir`.
pub fn resolve_workspace_identity(workspace_root: &Path, workspace_dir: &Path) -> Result<String> {
    let target = normalize_path(workspace_dir);

    let entries = best_effort(WORKSPACE_META_FILE, scan_workspace_entries(workspace_root));
    let found = entries
        .into_items()
        .into_iter()
        .find(|entry| entry.folder.as_deref() == Some(target.as_path()));

    match found {
        Some(entry) => {
            debug!(identity = %entry.identity, dir = ?workspace_dir, "resolved workspace");
            Ok(entry.identity)
        }
        None => Err(Error::WorkspaceNotFound(workspace_dir.to_path_buf())),
    }
}

fn scan_workspace_entries(workspace_root: &Path) -> Vec<Result<WorkspaceEntry>> {
    let read_dir = match fs::read_dir(workspace_root) {
        Ok(rd) => rd,
        Err(e) => {
            warn!(path = ?workspace_root, err = %e, "cannot read workspace storage");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = read_dir
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    dirs.into_iter()
        .filter_map(|dir| {
            let meta_path = dir.join(WORKSPACE_META_FILE);
            if !meta_path.is_file() {
                return None;
            }
            let identity = dir.file_name()?.to_string_lossy().into_owned();
            Some(read_workspace_entry(identity, &meta_path))
        })
        .collect()
}

fn read_workspace_entry(identity: String, meta_path: &Path) -> Result<WorkspaceEntry> {
    let content = fs::read_to_string(meta_path)?;
    let meta: WorkspaceMeta = serde_json::from_str(&content)?;
    let folder = meta
        .folder
        .as_deref()
        .map(folder_uri_to_path)
        .map(|p| normalize_path(&p));
    Ok(WorkspaceEntry { identity, folder })
}

/// `file:///Users/me/my%20proj` -> `/Users/me/my proj`
fn folder_uri_to_path(uri: &str) -> PathBuf {
    let raw = uri.strip_prefix("file://").unwrap_or(uri);
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    PathBuf::from(decoded)
}

/// Lexical normalization: drops `.`, folds `..`, ignores trailing separators.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_meta(root: &Path, identity: &str, body: &str) {
        let dir = root.join(identity);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(WORKSPACE_META_FILE), body).unwrap();
    }

    #[test]
    fn platform_table_covers_known_hosts() {
        let home = Path::new("/home/dev");
        let linux = StorageRoots::resolve("linux", home, None);
        assert_eq!(
            linux.workspace,
            PathBuf::from("/home/dev/.config/Cursor/User/workspaceStorage")
        );
        assert_eq!(
            linux.global,
            PathBuf::from("/home/dev/.config/Cursor/User/globalStorage")
        );

        let mac = StorageRoots::resolve("macos", Path::new("/Users/dev"), None);
        assert_eq!(
            mac.workspace,
            PathBuf::from("/Users/dev/Library/Application Support/Cursor/User/workspaceStorage")
        );

        let win = StorageRoots::resolve("windows", home, Some(Path::new("/appdata")));
        assert_eq!(win.global, PathBuf::from("/appdata/Cursor/User/globalStorage"));
    }

    #[test]
    fn unknown_platform_falls_back_to_linux_layout() {
        let home = Path::new("/home/dev");
        assert_eq!(
            StorageRoots::resolve("freebsd", home, None),
            StorageRoots::resolve("linux", home, None)
        );
    }

    #[test]
    fn resolves_matching_workspace() {
        let root = TempDir::new().unwrap();
        write_meta(root.path(), "aaa", r#"{"folder": "file:///src/other"}"#);
        write_meta(root.path(), "bbb", r#"{"folder": "file:///src/project"}"#);

        let id = resolve_workspace_identity(root.path(), Path::new("/src/project")).unwrap();
        assert_eq!(id, "bbb");
    }

    #[test]
    fn normalizes_both_sides_before_comparing() {
        let root = TempDir::new().unwrap();
        write_meta(root.path(), "ccc", r#"{"folder": "file:///src/my%20project/"}"#);

        let id =
            resolve_workspace_identity(root.path(), Path::new("/src/./x/../my project")).unwrap();
        assert_eq!(id, "ccc");
    }

    #[test]
    fn malformed_metadata_is_skipped_not_fatal() {
        let root = TempDir::new().unwrap();
        write_meta(root.path(), "aaa", "{ not json");
        write_meta(root.path(), "bbb", r#"{"workspace": "file:///multi.code-workspace"}"#);
        write_meta(root.path(), "ccc", r#"{"folder": "file:///src/project"}"#);

        let id = resolve_workspace_identity(root.path(), Path::new("/src/project")).unwrap();
        assert_eq!(id, "ccc");
    }

    #[test]
    fn no_match_is_workspace_not_found() {
        let root = TempDir::new().unwrap();
        write_meta(root.path(), "aaa", r#"{"folder": "file:///src/other"}"#);

        let err = resolve_workspace_identity(root.path(), Path::new("/src/project")).unwrap_err();
        assert!(matches!(err, Error::WorkspaceNotFound(_)));
    }

    #[test]
    fn missing_root_is_workspace_not_found() {
        let root = TempDir::new().unwrap();
        let err = resolve_workspace_identity(&root.path().join("nope"), Path::new("/src/project"))
            .unwrap_err();
        assert!(matches!(err, Error::WorkspaceNotFound(_)));
    }
}
