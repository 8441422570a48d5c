use crate::error::{GotError, GotResult};
use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<key>[A-Za-z][A-Za-z-]*): ?(?P<value>.*)$").unwrap());

/// Pseudo-headers a message editor may prepend, and which we consume
const KNOWN_HEADERS: &[&str] = &["Author"];

/// A commit or tag message split from its leading pseudo-headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub author: Option<String>,
    pub body: String,
}

impl CommitMessage {
    /// Strip leading `Author:` style headers from a finished message
    ///
    /// Header parsing stops at the first line that is not a known header.
    /// One blank line after the headers is dropped; the rest of the text is
    /// kept verbatim.
    pub fn parse(raw: &str) -> GotResult<Self> {
        let mut author = None;
        let mut rest = raw;

        loop {
            let (line, tail) = match rest.split_once('\n') {
                Some((line, tail)) => (line, tail),
                None => (rest, ""),
            };

            let Some(caps) = HEADER_LINE.captures(line) else {
                break;
            };
            if !KNOWN_HEADERS.contains(&&caps["key"]) {
                break;
            }

            let value = caps["value"].trim();
            if !value.is_empty() {
                author = Some(value.to_string());
            }
            rest = tail;
        }

        if rest.len() != raw.len() {
            rest = rest
                .strip_prefix("\r\n")
                .or_else(|| rest.strip_prefix('\n'))
                .unwrap_or(rest);
        }

        if rest.trim().is_empty() {
            return Err(GotError::InvalidArgument(
                "Commit message must not be empty".to_string(),
            ));
        }

        Ok(CommitMessage {
            author,
            body: rest.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_is_verbatim() {
        let msg = CommitMessage::parse("fix the frobnicator\n\nlonger text\n").unwrap();
        assert_eq!(msg.author, None);
        assert_eq!(msg.body, "fix the frobnicator\n\nlonger text\n");
    }

    #[test]
    fn test_author_header_is_stripped() {
        let msg = CommitMessage::parse("Author: Jane <jane@example.org>\n\nfix it\n").unwrap();
        assert_eq!(msg.author.as_deref(), Some("Jane <jane@example.org>"));
        assert_eq!(msg.body, "fix it\n");
    }

    #[test]
    fn test_unknown_header_stays_in_body() {
        let msg = CommitMessage::parse("Fix: broken build\n").unwrap();
        assert_eq!(msg.author, None);
        assert_eq!(msg.body, "Fix: broken build\n");
    }

    #[test]
    fn test_empty_author_header_is_dropped() {
        let msg = CommitMessage::parse("Author: \nsubject").unwrap();
        assert_eq!(msg.author, None);
        assert_eq!(msg.body, "subject");
    }

    #[test]
    fn test_empty_message_rejected() {
        assert!(CommitMessage::parse("").is_err());
        assert!(CommitMessage::parse("  \n").is_err());
        assert!(CommitMessage::parse("Author: someone\n\n").is_err());
    }
}
