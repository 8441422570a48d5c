use crate::error::{GotError, GotResult};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<status>.)(?P<stage>.) (?P<path>.+)$").unwrap());

static BRANCH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<marker>[*~ ]) ?(?P<name>[^\s:][^:]*): (?P<id>\S+)$").unwrap()
});

static REFERENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^refs/(?:heads|remotes|tags)/(?P<name>[^:]+):").unwrap());

static BLAME_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<line>\d+)\) (?P<rev>[0-9a-f]+) (?P<date>\d{4}-\d{2}-\d{2}) (?P<author>\S+)(?P<rest>.*)$",
    )
    .unwrap()
});

static CREATED_COMMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Created commit (?P<id>\S+)").unwrap());

/// got pads the blame author column to this width
const BLAME_AUTHOR_WIDTH: usize = 8;

/// Reference name that is always present in a reference table
pub const HEAD: &str = "HEAD";

/// Per-file state derived from a `got status` code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    UpToDate,
    Edited,
    Added,
    Removed,
    Conflict,
    Missing,
    Unregistered,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::UpToDate => "up-to-date",
            FileStatus::Edited => "edited",
            FileStatus::Added => "added",
            FileStatus::Removed => "removed",
            FileStatus::Conflict => "conflict",
            FileStatus::Missing => "missing",
            FileStatus::Unregistered => "unregistered",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staging-area marker from the second status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    StagedModified,
    StagedAdded,
    StagedRemoved,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::StagedModified => "staged-modified",
            StageStatus::StagedAdded => "staged-added",
            StageStatus::StagedRemoved => "staged-removed",
        }
    }

    /// Working-tree state implied by a staged change with no further edits
    pub fn implied_status(self) -> FileStatus {
        match self {
            StageStatus::StagedModified => FileStatus::Edited,
            StageStatus::StagedAdded => FileStatus::Added,
            StageStatus::StagedRemoved => FileStatus::Removed,
        }
    }
}

/// Represents a file status entry from got status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub path: PathBuf,
    pub status: FileStatus,
    pub stage: Option<StageStatus>,
}

/// Opaque revision identifier, usually a full or abbreviated hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `rev` names this commit, allowing abbreviated ids
    pub fn matches(&self, rev: &str) -> bool {
        !rev.is_empty() && self.0.starts_with(rev)
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(id: &str) -> Self {
        CommitId(id.to_string())
    }
}

/// Represents a branch from got branch -l
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchEntry {
    pub name: String,
    pub id: CommitId,
    pub is_current: bool,
    /// The work tree is on this branch but its base commit is behind the tip
    pub out_of_date: bool,
}

/// Reference names usable as revisions; `HEAD` always comes first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReferenceTable(Vec<String>);

impl ReferenceTable {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attribution of one source line, from got blame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationLine {
    pub line_number: usize,
    pub revision: CommitId,
    pub date: NaiveDate,
    pub author: String,
    pub text: String,
}

/// Work tree metadata reported by got info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkTreeInfo {
    pub root: Option<PathBuf>,
    pub repository: Option<PathBuf>,
    pub branch_reference: Option<String>,
    pub base_commit: Option<CommitId>,
    pub uuid: Option<String>,
}

impl WorkTreeInfo {
    /// Branch name without the `refs/heads/` prefix
    pub fn branch(&self) -> Option<&str> {
        self.branch_reference
            .as_deref()
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
    }
}

/// Map a status column character to a file state
///
/// Returns `None` for the ignored code and for anything unrecognized.
pub fn parse_status_char(c: char) -> Option<FileStatus> {
    match c {
        'M' | 'm' => Some(FileStatus::Edited),
        'A' => Some(FileStatus::Added),
        'D' => Some(FileStatus::Removed),
        'C' => Some(FileStatus::Conflict),
        '!' => Some(FileStatus::Missing),
        '?' => Some(FileStatus::Unregistered),
        _ => None,
    }
}

/// Map the staging column character to a stage marker
pub fn parse_stage_char(c: char) -> Option<StageStatus> {
    match c {
        'M' => Some(StageStatus::StagedModified),
        'A' => Some(StageStatus::StagedAdded),
        'D' => Some(StageStatus::StagedRemoved),
        _ => None,
    }
}

/// Parse a single got status line
///
/// Lines whose codes carry no status (ignored, obstructed, unknown) yield
/// `None`. A blank status column with a staged change takes its state from
/// the staged change.
pub fn parse_status_line(line: &str) -> Option<StatusEntry> {
    let caps = STATUS_LINE.captures(line)?;
    let status_char = caps["status"].chars().next()?;
    let stage = caps["stage"].chars().next().and_then(parse_stage_char);

    let status = parse_status_char(status_char).or_else(|| {
        if status_char == ' ' {
            stage.map(StageStatus::implied_status)
        } else {
            None
        }
    })?;

    Some(StatusEntry {
        path: PathBuf::from(&caps["path"]),
        status,
        stage,
    })
}

/// Lazily parse got status output, in tool order, one entry per path
pub fn status_entries(output: &str) -> impl Iterator<Item = StatusEntry> + '_ {
    let mut seen = HashSet::new();
    output
        .lines()
        .filter_map(parse_status_line)
        .filter(move |entry| seen.insert(entry.path.clone()))
}

/// Parse got status output
pub fn parse_status(output: &str) -> GotResult<Vec<StatusEntry>> {
    Ok(status_entries(output).collect())
}

/// Parse got branch -l output
pub fn parse_branch_list(output: &str) -> GotResult<Vec<BranchEntry>> {
    let mut branches = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let caps = BRANCH_LINE
            .captures(line)
            .ok_or_else(|| GotError::ParseError(format!("Unexpected branch line: {}", line)))?;
        let marker = &caps["marker"];

        branches.push(BranchEntry {
            name: caps["name"].to_string(),
            id: CommitId::from(&caps["id"]),
            is_current: marker == "*" || marker == "~",
            out_of_date: marker == "~",
        });
    }

    Ok(branches)
}

/// Parse got ref -l output into a reference table
pub fn parse_reference_list(output: &str) -> ReferenceTable {
    let mut names = vec![HEAD.to_string()];

    for caps in output.lines().filter_map(|l| REFERENCE_LINE.captures(l)) {
        let name = &caps["name"];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    ReferenceTable(names)
}

/// Extract revision, date and author from one got blame line
pub fn parse_annotation_line(line: &str) -> Option<AnnotationLine> {
    let caps = BLAME_LINE.captures(line)?;
    let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d").ok()?;
    let author = caps["author"].to_string();

    let padding = BLAME_AUTHOR_WIDTH.saturating_sub(author.chars().count()) + 1;
    let rest = &caps["rest"];
    let skip = rest
        .char_indices()
        .take(padding)
        .take_while(|(_, c)| *c == ' ')
        .count();

    Some(AnnotationLine {
        line_number: caps["line"].parse().ok()?,
        revision: CommitId::from(&caps["rev"]),
        date,
        author,
        text: rest[skip..].to_string(),
    })
}

/// Lazily parse got blame output, skipping malformed lines
pub fn annotation_lines(output: &str) -> impl Iterator<Item = AnnotationLine> + '_ {
    output.lines().filter_map(parse_annotation_line)
}

/// Parse got blame output
pub fn parse_blame(output: &str) -> Vec<AnnotationLine> {
    annotation_lines(output).collect()
}

/// Parse got info output
pub fn parse_info(output: &str) -> WorkTreeInfo {
    let mut info = WorkTreeInfo::default();

    for (key, value) in output.lines().filter_map(|l| l.split_once(": ")) {
        let value = value.trim();
        match key.trim() {
            "work tree" => info.root = Some(PathBuf::from(value)),
            "work tree base commit" => info.base_commit = Some(CommitId::from(value)),
            "work tree branch reference" => info.branch_reference = Some(value.to_string()),
            "work tree UUID" => info.uuid = Some(value.to_string()),
            "repository" => info.repository = Some(PathBuf::from(value)),
            _ => {}
        }
    }

    info
}

/// Pull the new commit id out of got commit output
pub fn parse_created_commit(output: &str) -> GotResult<CommitId> {
    CREATED_COMMIT
        .captures(output)
        .map(|caps| CommitId::from(&caps["id"]))
        .ok_or_else(|| {
            GotError::ParseError(format!("No commit id in commit output: {}", output.trim()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_char_table() {
        assert_eq!(parse_status_char('M'), Some(FileStatus::Edited));
        assert_eq!(parse_status_char('A'), Some(FileStatus::Added));
        assert_eq!(parse_status_char('D'), Some(FileStatus::Removed));
        assert_eq!(parse_status_char('C'), Some(FileStatus::Conflict));
        assert_eq!(parse_status_char('!'), Some(FileStatus::Missing));
        assert_eq!(parse_status_char('?'), Some(FileStatus::Unregistered));
        assert_eq!(parse_status_char('m'), Some(FileStatus::Edited));
        assert_eq!(parse_status_char('I'), None);
    }

    #[test]
    fn test_status_char_unrecognized() {
        for c in ['~', 'N', ' ', 'x', 'é', '\0'] {
            assert_eq!(parse_status_char(c), None, "char {:?}", c);
        }
    }

    #[test]
    fn test_parse_status_modified() {
        let entries = parse_status("M  foo.txt\n").unwrap();

        assert_eq!(
            entries,
            vec![StatusEntry {
                path: PathBuf::from("foo.txt"),
                status: FileStatus::Edited,
                stage: None,
            }]
        );
    }

    #[test]
    fn test_parse_status_staged() {
        let entries = parse_status("MM src/main.c\n A new.c\n").unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, FileStatus::Edited);
        assert_eq!(entries[0].stage, Some(StageStatus::StagedModified));
        assert_eq!(entries[1].path, PathBuf::from("new.c"));
        assert_eq!(entries[1].status, FileStatus::Added);
        assert_eq!(entries[1].stage, Some(StageStatus::StagedAdded));
    }

    #[test]
    fn test_parse_status_skips_unreported() {
        let output = "I  ignored.o\n~  obstructed\n?  new.txt\nN  nonexistent\n";
        let entries = parse_status(output).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, FileStatus::Unregistered);
    }

    #[test]
    fn test_parse_status_unknown_stage_char_ignored() {
        let entries = parse_status("Dx gone.txt\n").unwrap();
        assert_eq!(entries[0].status, FileStatus::Removed);
        assert_eq!(entries[0].stage, None);
    }

    #[test]
    fn test_parse_status_path_with_spaces() {
        let entries = parse_status("A  dir/my file.txt\n").unwrap();
        assert_eq!(entries[0].path, PathBuf::from("dir/my file.txt"));
    }

    #[test]
    fn test_parse_status_one_entry_per_path() {
        let entries = parse_status("M  a.c\nC  a.c\n").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, FileStatus::Edited);
    }

    #[test]
    fn test_parse_branch_list() {
        let output = "  feature: 0123abcd\n* main: deadbeef\n~ stale: 99aa\n";
        let branches = parse_branch_list(output).unwrap();

        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0].name, "feature");
        assert_eq!(branches[0].id.as_str(), "0123abcd");
        assert!(!branches[0].is_current);
        assert_eq!(branches[1].name, "main");
        assert!(branches[1].is_current);
        assert!(!branches[1].out_of_date);
        assert!(branches[2].is_current);
        assert!(branches[2].out_of_date);
    }

    #[test]
    fn test_parse_branch_list_rejects_garbage() {
        assert!(matches!(
            parse_branch_list("not a branch line"),
            Err(GotError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_reference_list() {
        let output = "HEAD: refs/heads/main\nrefs/heads/main: abcd1234\nrefs/tags/v1: ef567890\n";
        let refs = parse_reference_list(output);

        assert_eq!(refs.names(), &["HEAD", "main", "v1"]);
    }

    #[test]
    fn test_parse_reference_list_skips_internal_refs() {
        let output = "refs/got/worktree/base-1234: aaaa\n\
                      refs/remotes/origin/main: bbbb\n\
                      refs/heads/main: cccc\n\
                      refs/remotes/origin/main: bbbb\n";
        let refs = parse_reference_list(output);

        assert_eq!(refs.names(), &["HEAD", "origin/main", "main"]);
        assert!(parse_reference_list("").contains(HEAD));
    }

    #[test]
    fn test_parse_annotation_line() {
        let line = parse_annotation_line("12) a1b2c3d 2022-05-01 jane some code").unwrap();

        assert_eq!(line.line_number, 12);
        assert_eq!(line.revision.as_str(), "a1b2c3d");
        assert_eq!(line.date, NaiveDate::from_ymd_opt(2022, 5, 1).unwrap());
        assert_eq!(line.author, "jane");
        assert_eq!(line.text, "some code");
    }

    #[test]
    fn test_parse_annotation_line_padded() {
        let line =
            parse_annotation_line("  3) 0badf00d 2021-12-31 bob          indented();").unwrap();

        assert_eq!(line.line_number, 3);
        assert_eq!(line.author, "bob");
        assert_eq!(line.text, "    indented();");
    }

    #[test]
    fn test_parse_blame_skips_malformed() {
        let output = "1) aaaa111 2022-01-01 ann first\n\
                      garbage line\n\
                      3) bbbb222 2022-13-45 ann bad date\n\
                      4) cccc333 2022-02-02 ann fourth\n";
        let lines = parse_blame(output);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_number, 1);
        assert_eq!(lines[1].line_number, 4);
        assert_eq!(lines[1].revision.as_str(), "cccc333");
    }

    #[test]
    fn test_parse_info() {
        let output = "work tree: /home/me/src\n\
                      work tree base commit: 0123456789abcdef\n\
                      work tree path prefix: /\n\
                      work tree branch reference: refs/heads/main\n\
                      work tree UUID: 5b9f-11ee\n\
                      repository: /var/git/src.git\n";
        let info = parse_info(output);

        assert_eq!(info.root, Some(PathBuf::from("/home/me/src")));
        assert_eq!(info.base_commit, Some(CommitId::from("0123456789abcdef")));
        assert_eq!(info.branch(), Some("main"));
        assert_eq!(info.repository, Some(PathBuf::from("/var/git/src.git")));
        assert_eq!(info.uuid.as_deref(), Some("5b9f-11ee"));
    }

    #[test]
    fn test_parse_created_commit() {
        let output = "M  foo.c\nCreated commit 0123abcd4567\n";
        assert_eq!(
            parse_created_commit(output).unwrap(),
            CommitId::from("0123abcd4567")
        );
        assert!(parse_created_commit("nothing here").is_err());
    }

    #[test]
    fn test_commit_id_matches_prefix() {
        let id = CommitId::from("0123abcd");
        assert!(id.matches("0123"));
        assert!(id.matches("0123abcd"));
        assert!(!id.matches("abcd"));
        assert!(!id.matches(""));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_status("").unwrap().len(), 0);
        assert_eq!(parse_branch_list("").unwrap().len(), 0);
        assert_eq!(parse_reference_list("").len(), 1);
        assert!(parse_blame("").is_empty());
    }
}
