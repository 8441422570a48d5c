use crate::config::GotConfig;
use crate::error::{GotError, GotResult};
use crate::got::executor::{GotCommand, GotExecutor, absolute, find_work_tree_root};
use crate::got::log::{LogFilter, LogOutput, LogQuery, parse_log};
use crate::got::message::CommitMessage;
use crate::got::parser::{
    self, AnnotationLine, BranchEntry, CommitId, FileStatus, ReferenceTable, StatusEntry,
    WorkTreeInfo,
};
use crate::got::remote;
use crate::got::stream::{OutputSink, RemoteTask, spawn_remote};
use crate::got::version::GotVersion;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::env;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Outcome of looking for a file in an explicit status query
enum Lookup {
    Reported(StatusEntry),
    /// No line for the file: up to date or ignored
    Ambiguous,
}

/// Parameters of a diff query
#[derive(Debug, Clone, Default)]
pub struct DiffQuery {
    pub paths: Vec<PathBuf>,
    /// Show staged changes instead of work tree changes
    pub staged: bool,
    /// Zero, one or two commits to compare
    pub commits: Vec<String>,
}

/// A got work tree and the operations available on it
///
/// Holds no state about the work tree itself; every query goes to the tool.
/// The tool version is asked for once and then reused.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    executor: GotExecutor,
    version: OnceCell<GotVersion>,
}

impl Repository {
    /// Detect the work tree containing the current working directory
    pub fn discover(config: GotConfig) -> GotResult<Self> {
        let current_dir = env::current_dir()?;
        Self::discover_from(&current_dir, config)
    }

    /// Detect the work tree containing a specific file or directory
    pub fn discover_from<P: AsRef<Path>>(start_path: P, config: GotConfig) -> GotResult<Self> {
        let start = absolute(start_path.as_ref())?;
        let root = find_work_tree_root(&start).ok_or(GotError::NotARepository(start))?;

        Ok(Self::new(root, config))
    }

    /// Create a Repository for a known work-tree root
    pub fn new<P: AsRef<Path>>(root: P, config: GotConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            executor: GotExecutor::new(config),
            version: OnceCell::new(),
        }
    }

    /// Get the work-tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the got executor for this work tree
    pub fn executor(&self) -> &GotExecutor {
        &self.executor
    }

    fn run(&self, command: GotCommand) -> GotResult<String> {
        Ok(self.executor.execute(&command.in_dir(&self.root))?.stdout)
    }

    /// Tool version, queried on first use
    pub fn version(&self) -> GotResult<GotVersion> {
        self.version
            .get_or_try_init(|| {
                let version = GotVersion::detect(&self.executor, &self.root)?;
                debug!(%version, "detected got version");
                Ok::<_, GotError>(version)
            })
            .copied()
    }

    /// Status of `files` (or all of `dir` when `files` is empty)
    ///
    /// Paths in the result are relative to `dir`. `status_codes` limits the
    /// output to the given status characters.
    pub fn status<P: AsRef<Path>>(
        &self,
        dir: &Path,
        files: &[P],
        status_codes: Option<&str>,
    ) -> GotResult<Vec<StatusEntry>> {
        let dir = absolute(dir)?;
        let targets: Vec<PathBuf> = if files.is_empty() {
            vec![dir.clone()]
        } else {
            files.iter().map(|f| f.as_ref().to_path_buf()).collect()
        };

        let entries = self.query_status(&targets, status_codes)?;
        Ok(entries
            .into_iter()
            .map(|entry| self.relative_entry(entry, &dir))
            .collect())
    }

    /// Run got status and return entries with absolute paths
    fn query_status(
        &self,
        paths: &[PathBuf],
        status_codes: Option<&str>,
    ) -> GotResult<Vec<StatusEntry>> {
        let output = self.run(
            GotCommand::new("status")
                .flag("-s", status_codes)
                .paths(paths),
        )?;

        Ok(parser::status_entries(&output)
            .map(|mut entry| {
                entry.path = self.root.join(&entry.path);
                entry
            })
            .collect())
    }

    fn relative_entry(&self, mut entry: StatusEntry, dir: &Path) -> StatusEntry {
        entry.path = relative_path(&entry.path, dir);
        entry
    }

    /// State of every requested file, including files with nothing to report
    ///
    /// Files the explicit query stays silent about are looked up once more in
    /// a status of all of `dir`: they are unregistered if they show up there
    /// as such, up to date otherwise. A path given more than once is
    /// reported once, in the position of its first mention.
    pub fn dir_status<P: AsRef<Path>>(&self, dir: &Path, files: &[P]) -> GotResult<Vec<StatusEntry>> {
        if files.is_empty() {
            return self.status(dir, files, None);
        }

        let dir = absolute(dir)?;
        let mut seen = HashSet::new();
        let wanted: Vec<PathBuf> = files
            .iter()
            .map(|f| absolute(f.as_ref()))
            .collect::<GotResult<Vec<_>>>()?
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect();

        let reported = self.query_status(&wanted, None)?;
        let lookups: Vec<(PathBuf, Lookup)> = wanted
            .into_iter()
            .map(|path| {
                let lookup = match reported.iter().find(|e| e.path == path) {
                    Some(entry) => Lookup::Reported(entry.clone()),
                    None => Lookup::Ambiguous,
                };
                (path, lookup)
            })
            .collect();

        let broader = if lookups.iter().any(|(_, p)| matches!(p, Lookup::Ambiguous)) {
            debug!(dir = %dir.display(), "resolving silent files with a directory status");
            self.query_status(std::slice::from_ref(&dir), None)?
        } else {
            Vec::new()
        };

        Ok(lookups
            .into_iter()
            .map(|(path, lookup)| {
                let entry = match lookup {
                    Lookup::Reported(entry) => entry,
                    Lookup::Ambiguous => resolve_ambiguous(path, &broader),
                };
                self.relative_entry(entry, &dir)
            })
            .collect())
    }

    /// State of a single file
    pub fn state(&self, file: &Path) -> GotResult<FileStatus> {
        let file = absolute(file)?;
        let dir = file.parent().unwrap_or(self.root.as_path()).to_path_buf();
        let entries = self.dir_status(&dir, &[&file])?;

        entries
            .into_iter()
            .next()
            .map(|e| e.status)
            .ok_or_else(|| GotError::ParseError(format!("No state for {}", file.display())))
    }

    /// Whether got tracks the file
    pub fn is_registered(&self, file: &Path) -> GotResult<bool> {
        Ok(self.state(file)? != FileStatus::Unregistered)
    }

    /// Run a log query
    ///
    /// Limit, order and search are passed to the tool; the parser only
    /// re-applies the limit.
    pub fn log(&self, query: &LogQuery) -> GotResult<LogOutput> {
        let search_flag = match query.search.as_deref() {
            Some(s) if !s.is_empty() => self.version()?.log_search_flag(),
            _ => "-S",
        };

        let output = self.run(query.command(search_flag))?;
        parse_log(&output, &LogFilter::with_limit(query.limit))
    }

    /// The revision before `rev` that touched `file`
    pub fn previous_revision(&self, file: &Path, rev: &str) -> GotResult<Option<CommitId>> {
        let query = LogQuery {
            path: Some(file.to_path_buf()),
            start_commit: Some(rev.to_string()),
            limit: Some(2),
            ..LogQuery::default()
        };

        Ok(self.log(&query)?.entries.into_iter().nth(1).map(|e| e.id))
    }

    /// The revision after `rev` that touched `file`
    pub fn next_revision(&self, file: &Path, rev: &str) -> GotResult<Option<CommitId>> {
        let query = LogQuery {
            path: Some(file.to_path_buf()),
            ..LogQuery::default()
        };
        let entries = self.log(&query)?.entries;

        Ok(entries
            .iter()
            .position(|e| e.id.matches(rev))
            .and_then(|i| i.checked_sub(1))
            .map(|i| entries[i].id.clone()))
    }

    /// Show changes as a unified diff
    pub fn diff(&self, query: &DiffQuery) -> GotResult<String> {
        if query.commits.len() > 2 {
            return Err(GotError::InvalidArgument(
                "diff takes at most two commits".to_string(),
            ));
        }

        let mut command = GotCommand::new("diff");
        for switch in &self.executor.config().diff_switches {
            command = command.arg(switch);
        }
        command = command.switch("-s", query.staged);
        for commit in &query.commits {
            command = command.flag("-c", Some(commit.as_str()));
        }

        self.run(command.paths(&query.paths))
    }

    /// Per-line attribution of a file, optionally as of `rev`
    pub fn annotate(&self, file: &Path, rev: Option<&str>) -> GotResult<Vec<AnnotationLine>> {
        let output = self.run(GotCommand::new("blame").flag("-c", rev).paths([file]))?;
        Ok(parser::parse_blame(&output))
    }

    /// Contents of a file, optionally as of `rev`
    pub fn cat(&self, file: &Path, rev: Option<&str>) -> GotResult<String> {
        self.run(
            GotCommand::new("cat")
                .flag("-c", rev)
                .arg("-P")
                .paths([file]),
        )
    }

    /// List branches
    pub fn branches(&self) -> GotResult<Vec<BranchEntry>> {
        let output = self.run(GotCommand::new("branch").arg("-l"))?;
        parser::parse_branch_list(&output)
    }

    /// Work tree metadata
    pub fn info(&self) -> GotResult<WorkTreeInfo> {
        Ok(parser::parse_info(&self.run(GotCommand::new("info"))?))
    }

    /// Branch the work tree is on
    pub fn current_branch(&self) -> GotResult<Option<String>> {
        Ok(self.info()?.branch().map(str::to_string))
    }

    /// Base commit of the work tree
    pub fn working_revision(&self) -> GotResult<Option<CommitId>> {
        Ok(self.info()?.base_commit)
    }

    /// All branch, remote and tag names, `HEAD` first
    pub fn references(&self) -> GotResult<ReferenceTable> {
        let output = self.run(GotCommand::new("ref").arg("-l"))?;
        Ok(parser::parse_reference_list(&output))
    }

    /// Schedule files for addition
    pub fn add<P: AsRef<Path>>(&self, files: &[P]) -> GotResult<String> {
        require_paths("add", files)?;
        self.run(GotCommand::new("add").paths(files))
    }

    /// Schedule files for removal; `keep_local` leaves them on disk
    pub fn remove<P: AsRef<Path>>(&self, files: &[P], keep_local: bool) -> GotResult<String> {
        require_paths("remove", files)?;
        self.run(GotCommand::new("remove").switch("-k", keep_local).paths(files))
    }

    /// Discard local changes, descending into directories
    pub fn revert<P: AsRef<Path>>(&self, files: &[P]) -> GotResult<String> {
        require_paths("revert", files)?;
        let recursive = files.iter().any(|f| f.as_ref().is_dir());
        self.run(GotCommand::new("revert").switch("-R", recursive).paths(files))
    }

    /// Stage changes for the next commit
    pub fn stage<P: AsRef<Path>>(&self, files: &[P]) -> GotResult<String> {
        self.run(GotCommand::new("stage").paths(files))
    }

    /// Move staged changes back to the work tree
    pub fn unstage<P: AsRef<Path>>(&self, files: &[P]) -> GotResult<String> {
        self.run(GotCommand::new("unstage").paths(files))
    }

    /// Commit changes to `files` (all changes when empty)
    pub fn commit<P: AsRef<Path>>(&self, files: &[P], message: &str) -> GotResult<CommitId> {
        let message = CommitMessage::parse(message)?;
        let output = self.run(
            GotCommand::new("commit")
                .flag("-A", message.author.as_deref())
                .flag("-m", Some(message.body.as_str()))
                .paths(files),
        )?;

        parser::parse_created_commit(&output)
    }

    /// Create a branch at `start` (or the work tree base commit)
    ///
    /// Unless `switch_to` is set the work tree stays on its current branch.
    pub fn create_branch(&self, name: &str, start: Option<&str>, switch_to: bool) -> GotResult<String> {
        require_name("branch", name)?;
        self.run(
            GotCommand::new("branch")
                .flag("-c", start)
                .switch("-n", !switch_to)
                .operand(name),
        )
    }

    pub fn delete_branch(&self, name: &str) -> GotResult<String> {
        require_name("branch", name)?;
        self.run(GotCommand::new("branch").flag("-d", Some(name)))
    }

    /// Create an annotated tag
    pub fn create_tag(&self, name: &str, message: &str, commit: Option<&str>) -> GotResult<String> {
        require_name("tag", name)?;
        let message = CommitMessage::parse(message)?;
        self.run(
            GotCommand::new("tag")
                .flag("-c", commit)
                .flag("-m", Some(message.body.as_str()))
                .operand(name),
        )
    }

    /// Bring the work tree up to date, optionally switching branch or commit
    pub fn update<P: AsRef<Path>>(
        &self,
        branch: Option<&str>,
        commit: Option<&str>,
        paths: &[P],
    ) -> GotResult<String> {
        self.run(
            GotCommand::new("update")
                .flag("-b", branch)
                .flag("-c", commit)
                .paths(paths),
        )
    }

    /// Integrate `branch` into the work tree's branch
    pub fn integrate(&self, branch: &str) -> GotResult<String> {
        require_name("integrate", branch)?;
        self.run(GotCommand::new("integrate").operand(branch))
    }

    /// got has no rename command
    pub fn rename(&self, _from: &Path, _to: &Path) -> GotResult<()> {
        Err(GotError::UnsupportedOperation("rename"))
    }

    /// got has no command to edit ignore patterns
    pub fn ignore(&self, _path: &Path) -> GotResult<()> {
        Err(GotError::UnsupportedOperation("ignore"))
    }

    /// URL of a remote, read from the repository configuration
    pub fn remote_url(&self, name: &str) -> Option<String> {
        remote::remote_url(&self.root, name)
    }

    /// Start `got fetch` in the background
    pub fn fetch<S: OutputSink + 'static>(&self, remote: Option<&str>, sink: S) -> GotResult<RemoteTask> {
        let mut command = GotCommand::new("fetch").in_dir(&self.root);
        if let Some(remote) = remote.filter(|r| !r.is_empty()) {
            command = command.operand(remote);
        }
        spawn_remote(&self.executor, command, sink)
    }

    /// Start `got send` in the background
    pub fn send<S: OutputSink + 'static>(
        &self,
        remote: Option<&str>,
        branch: Option<&str>,
        sink: S,
    ) -> GotResult<RemoteTask> {
        let mut command = GotCommand::new("send").flag("-b", branch).in_dir(&self.root);
        if let Some(remote) = remote.filter(|r| !r.is_empty()) {
            command = command.operand(remote);
        }
        spawn_remote(&self.executor, command, sink)
    }
}

/// Apply the secondary-query policy to a file the explicit query skipped
fn resolve_ambiguous(path: PathBuf, broader: &[StatusEntry]) -> StatusEntry {
    let status = match broader.iter().find(|e| e.path == path) {
        Some(entry) if entry.status == FileStatus::Unregistered => FileStatus::Unregistered,
        _ => FileStatus::UpToDate,
    };

    StatusEntry {
        path,
        status,
        stage: None,
    }
}

fn require_paths<P: AsRef<Path>>(operation: &str, files: &[P]) -> GotResult<()> {
    if files.is_empty() {
        return Err(GotError::InvalidArgument(format!("{} needs at least one path", operation)));
    }
    Ok(())
}

fn require_name(operation: &str, name: &str) -> GotResult<()> {
    if name.trim().is_empty() {
        return Err(GotError::InvalidArgument(format!("{} needs a name", operation)));
    }
    Ok(())
}

/// Express `path` relative to `base`; both must be absolute
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        relative
    }
}
