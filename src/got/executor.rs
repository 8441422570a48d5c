use crate::config::GotConfig;
use crate::error::{Diagnostic, GotError, GotResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

/// Name of the per-work-tree metadata directory
pub const WORK_TREE_META_DIR: &str = ".got";

/// Result of executing a got command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// A single got invocation, built up from optional parts
///
/// Flags are only emitted when their value is present and non-empty.
/// Operands and paths always follow an explicit `--`.
#[derive(Debug, Clone)]
pub struct GotCommand {
    operation: String,
    flags: Vec<OsString>,
    operands: Vec<OsString>,
    paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
}

impl GotCommand {
    /// Start a command for the given subcommand, e.g. "status"
    pub fn new(subcommand: &str) -> Self {
        Self {
            operation: subcommand.to_string(),
            flags: vec![OsString::from(subcommand)],
            operands: Vec::new(),
            paths: Vec::new(),
            dir: None,
        }
    }

    /// `got -V`
    pub fn version() -> Self {
        Self {
            operation: "version".to_string(),
            flags: vec![OsString::from("-V")],
            operands: Vec::new(),
            paths: Vec::new(),
            dir: None,
        }
    }

    /// Add `flag value` when the value is present and non-empty
    pub fn flag(mut self, flag: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.flags.push(flag.into());
            self.flags.push(value.into());
        }
        self
    }

    /// Add a valueless flag when `on` is set
    pub fn switch(mut self, flag: &str, on: bool) -> Self {
        if on {
            self.flags.push(flag.into());
        }
        self
    }

    /// Add a flag unconditionally
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.flags.push(arg.into());
        self
    }

    /// Add a positional operand (branch name, remote name, ...)
    pub fn operand<S: Into<OsString>>(mut self, operand: S) -> Self {
        self.operands.push(operand.into());
        self
    }

    /// Add path arguments
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Directory used to locate the work tree when there are no paths
    pub fn in_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Logical operation name, used to prefix failures
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Final argument vector. Relative paths are made absolute against the
    /// process directory, since the command runs from the work-tree root.
    pub fn argv(&self) -> GotResult<Vec<OsString>> {
        let mut argv = self.flags.clone();

        if !self.operands.is_empty() || !self.paths.is_empty() {
            argv.push("--".into());
            argv.extend(self.operands.iter().cloned());
            for path in &self.paths {
                argv.push(absolute(path)?.into_os_string());
            }
        }

        Ok(argv)
    }

    /// Where to start looking for the work-tree root
    fn anchor(&self) -> GotResult<PathBuf> {
        match (self.paths.first(), &self.dir) {
            (Some(path), _) => absolute(path),
            (None, Some(dir)) => absolute(dir),
            (None, None) => Ok(std::env::current_dir()?),
        }
    }
}

/// Executes got commands
#[derive(Debug, Clone)]
pub struct GotExecutor {
    config: GotConfig,
}

impl GotExecutor {
    /// Create a new GotExecutor from the given configuration
    pub fn new(config: GotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GotConfig {
        &self.config
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Locate the work-tree root for a command without running it
    pub fn resolve_root(&self, command: &GotCommand) -> GotResult<PathBuf> {
        let anchor = command.anchor()?;
        find_work_tree_root(&anchor).ok_or(GotError::NotARepository(anchor))
    }

    /// Execute a command from the root of the work tree it targets
    ///
    /// Fails with `NotARepository` before spawning anything when the
    /// targeted path is not inside a work tree.
    pub fn execute(&self, command: &GotCommand) -> GotResult<CommandOutput> {
        let root = self.resolve_root(command)?;
        self.execute_in(&root, command)
    }

    /// Execute a command in an explicit directory
    pub fn execute_in(&self, cwd: &Path, command: &GotCommand) -> GotResult<CommandOutput> {
        let argv = command.argv()?;

        debug!(
            program = %self.config.program,
            args = ?argv,
            cwd = %cwd.display(),
            "running got"
        );

        let output = Command::new(&self.config.program)
            .args(&argv)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()?;

        self.process_output(output, command)
    }

    /// Process command output into CommandOutput struct
    fn process_output(&self, output: Output, command: &GotCommand) -> GotResult<CommandOutput> {
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        if !success {
            warn!(operation = command.operation(), exit_code, "got command failed");

            let diagnostic = if output.stderr.is_empty() { output.stdout } else { output.stderr };
            return Err(GotError::CommandFailed {
                operation: command.operation().to_string(),
                diagnostic: Diagnostic::from(diagnostic),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
            success,
        })
    }
}

impl Default for GotExecutor {
    fn default() -> Self {
        Self::new(GotConfig::default())
    }
}

/// Walk up from `start` to the nearest directory holding `.got`
pub fn find_work_tree_root(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent()?.to_path_buf()
    };

    loop {
        if current.join(WORK_TREE_META_DIR).is_dir() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

pub(crate) fn absolute(path: &Path) -> GotResult<PathBuf> {
    Ok(std::path::absolute(path)?)
}
