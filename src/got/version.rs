use crate::error::{GotError, GotResult};
use crate::got::executor::{GotCommand, GotExecutor};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

/// First release where `got log` takes the search pattern as `-S`.
/// Earlier releases used `-s`, which now selects one-line summaries.
const UPPERCASE_SEARCH_FLAG_SINCE: GotVersion = GotVersion {
    major: 0,
    minor: 75,
    patch: 0,
    current: false,
};

const CURRENT_SUFFIX: &str = "-current";

/// Represents a got version
///
/// Field order matters: the derived ordering compares the numeric parts
/// first, so `0.56-current` sorts after `0.56` and before `0.57`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GotVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Built from a development snapshot (`-current` suffix)
    pub current: bool,
}

impl GotVersion {
    /// Ask the tool for its version with `got -V`
    pub fn detect(executor: &GotExecutor, cwd: &Path) -> GotResult<Self> {
        let output = executor
            .execute_in(cwd, &GotCommand::version())
            .map_err(|e| GotError::VersionDetectionFailed(e.to_string()))?;

        Self::parse(&output.stdout)
    }

    /// Parse version output such as "got 0.94" or "got 0.94-current"
    pub fn parse(version_str: &str) -> GotResult<Self> {
        let parts: Vec<&str> = version_str.split_whitespace().collect();

        if parts.len() < 2 || parts[0] != "got" {
            return Err(GotError::ParseError(format!(
                "Unexpected got version format: {}",
                version_str.trim()
            )));
        }

        parts[1].parse()
    }

    /// Letter of the `got log` option that takes a search pattern
    pub fn log_search_flag(&self) -> &'static str {
        search_flag(self)
    }
}

/// Select the `got log` search flag for a given tool version
pub fn search_flag(version: &GotVersion) -> &'static str {
    if *version >= UPPERCASE_SEARCH_FLAG_SINCE {
        "-S"
    } else {
        "-s"
    }
}

impl FromStr for GotVersion {
    type Err = GotError;

    /// Parse a bare version number like "0.94.1" or "0.94-current"
    fn from_str(s: &str) -> GotResult<Self> {
        let (number, current) = match s.strip_suffix(CURRENT_SUFFIX) {
            Some(number) => (number, true),
            None => (s, false),
        };

        let nums: Vec<&str> = number.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return Err(GotError::ParseError(format!(
                "Invalid version number format: {}",
                s
            )));
        }

        let component = |n: &str| {
            n.parse::<u32>()
                .map_err(|_| GotError::ParseError(format!("Invalid version component: {}", n)))
        };

        Ok(GotVersion {
            major: component(nums[0])?,
            minor: component(nums[1])?,
            patch: nums.get(2).map(|n| component(*n)).transpose()?.unwrap_or(0),
            current,
        })
    }
}

impl std::fmt::Display for GotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.patch != 0 {
            write!(f, ".{}", self.patch)?;
        }
        if self.current {
            f.write_str(CURRENT_SUFFIX)?;
        }
        Ok(())
    }
}
