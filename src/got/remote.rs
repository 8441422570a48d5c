//! Best-effort lookup of remote URLs.
//!
//! got keeps the path of the repository a work tree belongs to in
//! `.got/repository`. The repository itself is a Git-format repository whose
//! `config` file lists remotes as `[remote "name"]` sections.

use crate::got::executor::WORK_TREE_META_DIR;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the repository backing a work tree, if recorded
pub fn repository_path(work_tree_root: &Path) -> Option<PathBuf> {
    let recorded = fs::read_to_string(work_tree_root.join(WORK_TREE_META_DIR).join("repository")).ok()?;
    let recorded = recorded.trim();
    (!recorded.is_empty()).then(|| PathBuf::from(recorded))
}

/// Candidate config files for a bare or non-bare repository
fn config_candidates(repository: &Path) -> [PathBuf; 2] {
    [repository.join("config"), repository.join(".git").join("config")]
}

/// Find the URL of the named remote for a work tree
pub fn remote_url(work_tree_root: &Path, remote: &str) -> Option<String> {
    let repository = repository_path(work_tree_root)?;

    config_candidates(&repository).iter().find_map(|path| {
        let contents = fs::read_to_string(path).ok()?;
        debug!(config = %path.display(), remote, "scanning repository config");
        parse_remote_url(&contents, remote)
    })
}

/// Scan config text for `url` under `[remote "name"]`
pub fn parse_remote_url(contents: &str, remote: &str) -> Option<String> {
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(heading) = line.strip_prefix('[') {
            in_section = heading
                .strip_suffix(']')
                .and_then(|h| h.trim().strip_prefix("remote"))
                .map(|name| name.trim().trim_matches('"') == remote)
                .unwrap_or(false);
            continue;
        }

        if !in_section {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("url") {
                return Some(value.trim().to_string());
            }
        }
    }

    None
}
