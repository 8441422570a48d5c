//! Grammar for `got log` output.
//!
//! got prints one block per commit, each introduced by a line of dashes:
//!
//! ```text
//! -----------------------------------------------
//! commit 0123abcd (main, origin/main)
//! from: Jane Doe <jane@example.org>
//! date: Sat Jan  1 12:00:00 2022 UTC
//!
//!  message body, indented one space
//!
//! ```
//!
//! With `-p`, the block continues with a `diff` section.

use crate::error::{GotError, GotResult};
use crate::got::executor::GotCommand;
use crate::got::parser::CommitId;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

/// Start of a commit block, with an optional alias list
pub const COMMIT_LINE_PATTERN: &str = r"^commit (?P<id>[0-9a-f]+)(?: \((?P<refs>[^)]*)\))?";
/// Author metadata line
pub const AUTHOR_LINE_PATTERN: &str = r"^from: (?P<author>.+)$";
/// Date metadata line
pub const DATE_LINE_PATTERN: &str = r"^date: (?P<date>.+)$";

const SEPARATOR_MIN_WIDTH: usize = 40;
const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y UTC";

static ANCHORS: Lazy<LogAnchors> = Lazy::new(|| LogAnchors {
    commit: Regex::new(COMMIT_LINE_PATTERN).unwrap(),
    author: Regex::new(AUTHOR_LINE_PATTERN).unwrap(),
    date: Regex::new(DATE_LINE_PATTERN).unwrap(),
});

/// Compiled line patterns a renderer can use to highlight log text
#[derive(Debug)]
pub struct LogAnchors {
    pub commit: Regex,
    pub author: Regex,
    pub date: Regex,
}

pub fn anchors() -> &'static LogAnchors {
    &ANCHORS
}

/// Represents a commit from got log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: CommitId,
    /// Branch and tag names shown next to the id
    pub refs: Vec<String>,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
    pub diff: Option<String>,
}

/// Parsed log: separator-free text plus the entries it contains
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogOutput {
    pub text: String,
    pub entries: Vec<LogEntry>,
}

/// Post-processing applied to parsed blocks
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub limit: Option<usize>,
    pub reverse: bool,
    pub search: Option<Regex>,
}

impl LogFilter {
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Build a filter from a message search pattern
    pub fn with_search(pattern: &str) -> GotResult<Self> {
        let search = Regex::new(pattern)
            .map_err(|e| GotError::InvalidArgument(format!("Bad search pattern: {}", e)))?;
        Ok(Self {
            search: Some(search),
            ..Self::default()
        })
    }
}

/// Parameters of a log query
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub path: Option<PathBuf>,
    pub start_commit: Option<String>,
    pub limit: Option<usize>,
    pub reverse: bool,
    pub search: Option<String>,
    pub include_diff: bool,
    pub first_parent: bool,
}

impl LogQuery {
    /// Build the got log invocation; `search_flag` depends on the tool version
    pub fn command(&self, search_flag: &str) -> GotCommand {
        let limit = self.limit.map(|n| n.to_string());

        GotCommand::new("log")
            .switch("-b", self.first_parent)
            .flag("-c", self.start_commit.as_deref())
            .flag("-l", limit.as_deref())
            .switch("-p", self.include_diff)
            .switch("-R", self.reverse)
            .flag(search_flag, self.search.as_deref())
            .paths(self.path.iter())
    }
}

fn is_separator(line: &str) -> bool {
    line.len() >= SEPARATOR_MIN_WIDTH && line.bytes().all(|b| b == b'-')
}

/// Split output into commit blocks, dropping separator lines
///
/// A dash line only counts as a separator when a commit header or the end
/// of output follows it, so dashed lines inside diffs stay put.
fn split_blocks(output: &str) -> Vec<Vec<&str>> {
    let lines: Vec<&str> = output.lines().collect();
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, &line) in lines.iter().enumerate() {
        let next = lines.get(i + 1);
        if is_separator(line) && next.is_none_or(|n| n.starts_with("commit ")) {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(line);
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
        .into_iter()
        .filter(|block| block.iter().any(|l| !l.trim().is_empty()))
        .collect()
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

fn parse_block(block: &[&str]) -> GotResult<LogEntry> {
    let mut lines = block.iter().skip_while(|l| l.trim().is_empty()).peekable();

    let header = lines.next().copied().unwrap_or_default();
    let caps = ANCHORS
        .commit
        .captures(header)
        .ok_or_else(|| GotError::ParseError(format!("Expected commit header, found: {}", header)))?;

    let id = CommitId::from(&caps["id"]);
    let refs = caps
        .name("refs")
        .map(|m| m.as_str().split(", ").map(str::to_string).collect())
        .unwrap_or_default();

    let mut author = None;
    let mut date = None;
    while let Some(line) = lines.peek() {
        if line.is_empty() || line.starts_with(' ') {
            break;
        }
        if let Some(caps) = ANCHORS.author.captures(line) {
            author = Some(caps["author"].to_string());
        } else if let Some(caps) = ANCHORS.date.captures(line) {
            date = parse_date(&caps["date"]);
        }
        lines.next();
    }

    let mut message = Vec::new();
    let mut diff = Vec::new();
    for &line in lines {
        if !diff.is_empty() || line.starts_with("diff ") {
            diff.push(line);
        } else {
            message.push(line.strip_prefix(' ').unwrap_or(line));
        }
    }

    let message = message
        .iter()
        .skip_while(|l| l.trim().is_empty())
        .copied()
        .collect::<Vec<_>>();
    let end = message
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(0, |i| i + 1);

    Ok(LogEntry {
        id,
        refs,
        author,
        date,
        message: message[..end].join("\n"),
        diff: (!diff.is_empty()).then(|| diff.join("\n") + "\n"),
    })
}

/// Parse got log output
///
/// The filter applies in order: search, then limit, then reverse.
pub fn parse_log(output: &str, filter: &LogFilter) -> GotResult<LogOutput> {
    let mut blocks = Vec::new();
    for block in split_blocks(output) {
        let entry = parse_block(&block)?;
        blocks.push((block, entry));
    }

    if let Some(search) = &filter.search {
        blocks.retain(|(_, entry)| search.is_match(&entry.message));
    }
    if let Some(limit) = filter.limit {
        blocks.truncate(limit);
    }
    if filter.reverse {
        blocks.reverse();
    }

    let mut text = String::new();
    let mut entries = Vec::with_capacity(blocks.len());
    for (block, entry) in blocks {
        for line in block {
            text.push_str(line);
            text.push('\n');
        }
        entries.push(entry);
    }

    Ok(LogOutput { text, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sep(width: usize) -> String {
        "-".repeat(width)
    }

    fn two_commits(width: usize) -> String {
        format!(
            "{sep}\n\
             commit 1111aaaa (main, origin/main)\n\
             from: Jane Doe <jane@example.org>\n\
             date: Sat Jan  1 12:00:00 2022 UTC\n\
             \n \
             second change\n\
             \n\
             {sep}\n\
             commit 2222bbbb\n\
             from: Bob <bob@example.org>\n\
             date: Fri Dec 31 09:30:15 2021 UTC\n\
             \n \
             first change\n \
             \n \
             with a body\n\
             \n",
            sep = sep(width)
        )
    }

    #[test]
    fn test_parse_two_blocks() {
        let log = parse_log(&two_commits(47), &LogFilter::default()).unwrap();

        assert_eq!(log.entries.len(), 2);
        let first = &log.entries[0];
        assert_eq!(first.id.as_str(), "1111aaaa");
        assert_eq!(first.refs, vec!["main".to_string(), "origin/main".to_string()]);
        assert_eq!(first.author.as_deref(), Some("Jane Doe <jane@example.org>"));
        assert_eq!(
            first.date,
            Some(Utc.with_ymd_and_hms(2022, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(first.message, "second change");
        assert_eq!(first.diff, None);

        let second = &log.entries[1];
        assert!(second.refs.is_empty());
        assert_eq!(second.message, "first change\n\nwith a body");
    }

    #[test]
    fn test_limit_drops_blocks_and_separators() {
        let log = parse_log(&two_commits(49), &LogFilter::with_limit(Some(1))).unwrap();

        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].id.as_str(), "1111aaaa");
        assert!(!log.text.contains(&sep(49)));
        assert!(log.text.starts_with("commit 1111aaaa"));
        assert!(!log.text.contains("2222bbbb"));
    }

    #[test]
    fn test_reverse() {
        let filter = LogFilter {
            reverse: true,
            ..LogFilter::default()
        };
        let log = parse_log(&two_commits(47), &filter).unwrap();

        assert_eq!(log.entries[0].id.as_str(), "2222bbbb");
        assert_eq!(log.entries[1].id.as_str(), "1111aaaa");
        assert!(log.text.starts_with("commit 2222bbbb"));
    }

    #[test]
    fn test_search_matches_message() {
        let filter = LogFilter::with_search("body$").unwrap();
        let log = parse_log(&two_commits(47), &filter).unwrap();

        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].id.as_str(), "2222bbbb");
    }

    #[test]
    fn test_invalid_search_pattern() {
        assert!(matches!(
            LogFilter::with_search("("),
            Err(GotError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_diff_section() {
        let output = format!(
            "{}\ncommit abcdef01\nfrom: a\ndate: Sat Jan  1 12:00:00 2022 UTC\n\n fix\n\n\
             diff 0000 abcdef01\n--- a/f\n+++ b/f\n{}\n+ kept\n",
            sep(47),
            sep(50)
        );
        let log = parse_log(&output, &LogFilter::default()).unwrap();

        assert_eq!(log.entries.len(), 1);
        let entry = &log.entries[0];
        assert_eq!(entry.message, "fix");
        let diff = entry.diff.as_deref().unwrap();
        assert!(diff.starts_with("diff 0000 abcdef01\n"));
        assert!(diff.contains(&sep(50)));
    }

    #[test]
    fn test_unparseable_date_is_none() {
        let output = format!("{}\ncommit abcd\ndate: yesterday\n\n msg\n", sep(47));
        let log = parse_log(&output, &LogFilter::default()).unwrap();
        assert_eq!(log.entries[0].date, None);
        assert_eq!(log.entries[0].author, None);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let result = parse_log("this is not a log\n", &LogFilter::default());
        assert!(matches!(result, Err(GotError::ParseError(_))));
    }

    #[test]
    fn test_empty_output() {
        let log = parse_log("", &LogFilter::default()).unwrap();
        assert!(log.entries.is_empty());
        assert!(log.text.is_empty());
    }

    #[test]
    fn test_query_command() {
        let query = LogQuery {
            limit: Some(5),
            search: Some("fix".to_string()),
            reverse: true,
            ..LogQuery::default()
        };

        let argv = query.command("-S").argv().unwrap();
        assert_eq!(argv, vec!["log", "-l", "5", "-R", "-S", "fix"]);

        let argv = LogQuery::default().command("-s").argv().unwrap();
        assert_eq!(argv, vec!["log"]);
    }

    #[test]
    fn test_anchors() {
        let a = anchors();
        assert!(a.commit.is_match("commit 0123abcd (main)"));
        assert!(a.author.is_match("from: Jane"));
        assert!(a.date.is_match("date: Sat Jan  1 12:00:00 2022 UTC"));
        assert!(!a.commit.is_match(" commit 0123"));
    }
}
