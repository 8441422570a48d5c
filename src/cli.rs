//! Command-line front-end for the `gotvc` binary.

use crate::config::Config;
use crate::error::{AppResult, GotResult};
use crate::got::log;
use crate::got::{
    AnnotationLine, BranchEntry, DiffQuery, FileStatus, GotExecutor, GotVersion, LogQuery,
    OutputSink, RemoteTask, Repository, StageStatus, StatusEntry, StreamUpdate, WorkTreeInfo,
};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use crossterm::cursor::MoveToColumn;
use crossterm::style::{Print, StyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use serde::Serialize;
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Top-level CLI parser for `gotvc`
#[derive(Debug, Parser)]
#[command(name = "gotvc", version, about = "Run got commands and read their output")]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "directory", global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// got executable to run instead of the configured one
    #[arg(long, env = "GOTVC_PROGRAM", global = true)]
    pub program: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show changed files
    Status {
        /// Only report these status codes
        #[arg(short = 's', long)]
        codes: Option<String>,
        paths: Vec<PathBuf>,
    },
    /// Show the state of each file, including unchanged ones
    State {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show commit history
    Log {
        /// Start from this commit instead of the branch tip
        #[arg(short = 'c', long)]
        commit: Option<String>,
        #[arg(short = 'l', long)]
        limit: Option<usize>,
        /// Oldest commit first
        #[arg(short = 'R', long)]
        reverse: bool,
        /// Only commits matching this pattern
        #[arg(short = 'S', long)]
        search: Option<String>,
        /// Include the patch of each commit
        #[arg(short = 'p', long)]
        patch: bool,
        /// Follow only the first parent of merge commits
        #[arg(short = 'b', long)]
        first_parent: bool,
        path: Option<PathBuf>,
    },
    /// Show changes as a unified diff
    Diff {
        /// Show staged changes
        #[arg(short = 's', long)]
        staged: bool,
        /// Commit to compare; give twice for a range
        #[arg(short = 'c', long = "commit")]
        commits: Vec<String>,
        paths: Vec<PathBuf>,
    },
    /// Show who changed each line of a file
    Blame {
        #[arg(short = 'c', long)]
        commit: Option<String>,
        file: PathBuf,
    },
    /// Print a file as of a commit
    Cat {
        #[arg(short = 'c', long)]
        commit: Option<String>,
        file: PathBuf,
    },
    /// List branches
    Branches,
    /// List reference names usable as revisions
    Refs,
    /// Show work tree metadata
    Info,
    /// Show the got version
    Version,
    /// Schedule files for addition
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Schedule files for removal
    Remove {
        /// Keep the files on disk
        #[arg(short = 'k', long)]
        keep_local: bool,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Discard local changes
    Revert {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Stage changes for the next commit
    Stage { paths: Vec<PathBuf> },
    /// Move staged changes back to the work tree
    Unstage { paths: Vec<PathBuf> },
    /// Commit changes
    Commit {
        #[arg(short = 'm', long)]
        message: String,
        paths: Vec<PathBuf>,
    },
    /// Create or delete a branch
    Branch {
        /// Branch point, defaults to the work tree base commit
        #[arg(short = 'c', long, conflicts_with = "delete")]
        commit: Option<String>,
        #[arg(short = 'd', long)]
        delete: bool,
        /// Switch the work tree to the new branch
        #[arg(long, conflicts_with = "delete")]
        switch: bool,
        name: String,
    },
    /// Create a tag
    Tag {
        #[arg(short = 'm', long)]
        message: String,
        #[arg(short = 'c', long)]
        commit: Option<String>,
        name: String,
    },
    /// Bring the work tree up to date
    Update {
        #[arg(short = 'b', long)]
        branch: Option<String>,
        #[arg(short = 'c', long)]
        commit: Option<String>,
        paths: Vec<PathBuf>,
    },
    /// Integrate a branch into the current one
    Integrate { branch: String },
    /// Print the URL of a remote
    RemoteUrl {
        #[arg(default_value = "origin")]
        name: String,
    },
    /// Fetch changes from a remote
    Fetch { remote: Option<String> },
    /// Send changes to a remote
    Send {
        #[arg(short = 'b', long)]
        branch: Option<String>,
        remote: Option<String>,
    },
}

/// Run a parsed command line
pub fn run(cli: Cli, mut config: Config) -> AppResult<()> {
    if let Some(program) = cli.program {
        config.got.program = program;
    }
    let out = Output { json: cli.json };

    if let Command::Version = cli.command {
        let executor = GotExecutor::new(config.got);
        let version = GotVersion::detect(&executor, &env::current_dir()?)?;
        return out.version(&version);
    }

    let repo = Repository::discover(config.got.clone())?;

    match cli.command {
        Command::Status { codes, paths } => {
            let cwd = env::current_dir()?;
            let entries = repo.status(&cwd, &paths, codes.as_deref())?;
            out.status(&entries)
        }
        Command::State { paths } => {
            let cwd = env::current_dir()?;
            out.states(&repo.dir_status(&cwd, &paths)?)
        }
        Command::Log {
            commit,
            limit,
            reverse,
            search,
            patch,
            first_parent,
            path,
        } => {
            let query = LogQuery {
                path,
                start_commit: commit,
                limit: limit.or(config.log.limit),
                reverse,
                search,
                include_diff: patch,
                first_parent,
            };
            let log = repo.log(&query)?;
            if out.json {
                out.print_json(&log.entries)
            } else {
                print_log(&log.text);
                Ok(())
            }
        }
        Command::Diff {
            staged,
            commits,
            paths,
        } => out.text(&repo.diff(&DiffQuery {
            paths,
            staged,
            commits,
        })?),
        Command::Blame { commit, file } => out.annotations(&repo.annotate(&file, commit.as_deref())?),
        Command::Cat { commit, file } => out.text(&repo.cat(&file, commit.as_deref())?),
        Command::Branches => out.branches(&repo.branches()?),
        Command::Refs => {
            let refs = repo.references()?;
            if out.json {
                out.print_json(&refs)
            } else {
                refs.names().iter().for_each(|name| println!("{name}"));
                Ok(())
            }
        }
        Command::Info => out.info(&repo.info()?),
        Command::Add { paths } => out.text(&repo.add(&paths)?),
        Command::Remove { keep_local, paths } => out.text(&repo.remove(&paths, keep_local)?),
        Command::Revert { paths } => out.text(&repo.revert(&paths)?),
        Command::Stage { paths } => out.text(&repo.stage(&paths)?),
        Command::Unstage { paths } => out.text(&repo.unstage(&paths)?),
        Command::Commit { message, paths } => {
            let id = repo.commit(&paths, &message)?;
            if out.json {
                out.print_json(&id)
            } else {
                println!("Created commit {}", id.as_str().yellow());
                Ok(())
            }
        }
        Command::Branch {
            commit,
            delete,
            switch,
            name,
        } => {
            let output = if delete {
                repo.delete_branch(&name)?
            } else {
                repo.create_branch(&name, commit.as_deref(), switch)?
            };
            out.text(&output)
        }
        Command::Tag {
            message,
            commit,
            name,
        } => out.text(&repo.create_tag(&name, &message, commit.as_deref())?),
        Command::Update {
            branch,
            commit,
            paths,
        } => out.text(&repo.update(branch.as_deref(), commit.as_deref(), &paths)?),
        Command::Integrate { branch } => out.text(&repo.integrate(&branch)?),
        Command::RemoteUrl { name } => match repo.remote_url(&name) {
            Some(url) if out.json => out.print_json(&url),
            Some(url) => {
                println!("{url}");
                Ok(())
            }
            None => Err(crate::error::GotError::InvalidArgument(format!("no URL for remote {name}")).into()),
        },
        Command::Fetch { remote } => {
            run_remote(|sink| repo.fetch(remote.as_deref(), sink))?;
            Ok(())
        }
        Command::Send { branch, remote } => {
            run_remote(|sink| repo.send(remote.as_deref(), branch.as_deref(), sink))?;
            Ok(())
        }
        Command::Version => unreachable!("handled before discovering the work tree"),
    }
}

/// Drive a remote operation to completion; Ctrl-C kills the subprocess
fn run_remote<F>(start: F) -> AppResult<()>
where
    F: FnOnce(TerminalSink) -> GotResult<RemoteTask>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        let mut task = start(TerminalSink::default())?;
        tokio::select! {
            outcome = task.wait() => outcome,
            _ = tokio::signal::ctrl_c() => {
                task.cancel();
                task.wait().await
            }
        }
    });

    Ok(outcome?)
}

/// Shows streamed output, redrawing the progress line in place
#[derive(Debug, Default)]
struct TerminalSink {
    progress_shown: bool,
}

impl TerminalSink {
    fn draw(&mut self, update: &StreamUpdate) -> io::Result<()> {
        let mut stderr = io::stderr();
        if self.progress_shown {
            queue!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        }
        match update {
            StreamUpdate::Line(line) => {
                queue!(stderr, Print(line), Print("\n"))?;
                self.progress_shown = false;
            }
            StreamUpdate::Progress(line) => {
                queue!(stderr, Print(line))?;
                self.progress_shown = true;
            }
        }
        stderr.flush()
    }
}

#[async_trait]
impl OutputSink for TerminalSink {
    async fn on_update(&mut self, update: StreamUpdate) {
        let _ = self.draw(&update);
    }

    async fn on_complete(&mut self, _outcome: &GotResult<()>) {
        if self.progress_shown {
            let _ = execute!(io::stderr(), Print("\n"));
            self.progress_shown = false;
        }
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> AppResult<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Tool output passed through as-is
    fn text(&self, text: &str) -> AppResult<()> {
        if self.json {
            return self.print_json(text);
        }
        print!("{text}");
        io::stdout().flush()?;
        Ok(())
    }

    fn version(&self, version: &GotVersion) -> AppResult<()> {
        if self.json {
            return self.print_json(version);
        }
        println!("got {version}");
        Ok(())
    }

    fn status(&self, entries: &[StatusEntry]) -> AppResult<()> {
        if self.json {
            return self.print_json(entries);
        }
        for entry in entries {
            println!(
                "{}{} {}",
                status_code(entry.status),
                stage_code(entry.stage),
                entry.path.display()
            );
        }
        Ok(())
    }

    fn states(&self, entries: &[StatusEntry]) -> AppResult<()> {
        if self.json {
            return self.print_json(entries);
        }
        for entry in entries {
            match entry.stage {
                Some(stage) => println!("{}: {} ({})", entry.path.display(), entry.status, stage.as_str()),
                None => println!("{}: {}", entry.path.display(), entry.status),
            }
        }
        Ok(())
    }

    fn annotations(&self, lines: &[AnnotationLine]) -> AppResult<()> {
        if self.json {
            return self.print_json(lines);
        }
        let width = lines.last().map_or(1, |l| l.line_number.to_string().len());
        for line in lines {
            let revision: String = line.revision.as_str().chars().take(8).collect();
            println!(
                "{:>width$}) {} {} {:<8} {}",
                line.line_number,
                revision.yellow(),
                line.date,
                line.author,
                line.text,
            );
        }
        Ok(())
    }

    fn branches(&self, branches: &[BranchEntry]) -> AppResult<()> {
        if self.json {
            return self.print_json(branches);
        }
        for branch in branches {
            let marker = match (branch.is_current, branch.out_of_date) {
                (true, true) => "~",
                (true, false) => "*",
                _ => " ",
            };
            let name = if branch.is_current {
                branch.name.as_str().green().bold()
            } else {
                branch.name.as_str().stylize()
            };
            println!("{marker} {name}: {}", branch.id);
        }
        Ok(())
    }

    fn info(&self, info: &WorkTreeInfo) -> AppResult<()> {
        if self.json {
            return self.print_json(info);
        }
        print_field("work tree", info.root.as_deref().map(Path::display));
        print_field("repository", info.repository.as_deref().map(Path::display));
        print_field("branch", info.branch_reference.as_deref());
        print_field("base commit", info.base_commit.as_ref());
        print_field("uuid", info.uuid.as_deref());
        Ok(())
    }
}

fn print_field<T: std::fmt::Display>(label: &str, value: Option<T>) {
    if let Some(value) = value {
        println!("{} {}", format!("{label}:").bold(), value);
    }
}

fn print_log(text: &str) {
    let anchors = log::anchors();
    for line in text.lines() {
        if anchors.commit.is_match(line) {
            println!("{}", line.yellow());
        } else if anchors.author.is_match(line) || anchors.date.is_match(line) {
            println!("{}", line.dark_grey());
        } else {
            println!("{line}");
        }
    }
}

fn status_code(status: FileStatus) -> StyledContent<&'static str> {
    match status {
        FileStatus::UpToDate => " ".stylize(),
        FileStatus::Edited => "M".yellow(),
        FileStatus::Added => "A".green(),
        FileStatus::Removed => "D".red(),
        FileStatus::Conflict => "C".magenta().bold(),
        FileStatus::Missing => "!".red().bold(),
        FileStatus::Unregistered => "?".dark_grey(),
    }
}

fn stage_code(stage: Option<StageStatus>) -> StyledContent<&'static str> {
    match stage {
        None => " ".stylize(),
        Some(StageStatus::StagedModified) => "M".cyan(),
        Some(StageStatus::StagedAdded) => "A".cyan(),
        Some(StageStatus::StagedRemoved) => "D".cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["gotvc", "status", "--json", "-C", "/tmp/wt", "a.c"]);

        assert!(cli.json);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/wt")));
        match cli.command {
            Command::Status { codes, paths } => {
                assert_eq!(codes, None);
                assert_eq!(paths, vec![PathBuf::from("a.c")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_log_options() {
        let cli = Cli::parse_from(["gotvc", "log", "-l", "5", "-R", "-S", "fix", "src/main.c"]);

        match cli.command {
            Command::Log {
                limit,
                reverse,
                search,
                path,
                patch,
                ..
            } => {
                assert_eq!(limit, Some(5));
                assert!(reverse);
                assert!(!patch);
                assert_eq!(search.as_deref(), Some("fix"));
                assert_eq!(path, Some(PathBuf::from("src/main.c")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_diff_commit_range() {
        let cli = Cli::parse_from(["gotvc", "diff", "-c", "abc", "-c", "def"]);

        match cli.command {
            Command::Diff { commits, staged, .. } => {
                assert_eq!(commits, vec!["abc".to_string(), "def".to_string()]);
                assert!(!staged);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn remote_url_defaults_to_origin() {
        let cli = Cli::parse_from(["gotvc", "remote-url"]);
        assert!(matches!(cli.command, Command::RemoteUrl { name } if name == "origin"));
    }

    #[test]
    fn add_requires_paths() {
        assert!(Cli::try_parse_from(["gotvc", "add"]).is_err());
    }

    #[test]
    fn branch_delete_conflicts_with_switch() {
        assert!(Cli::try_parse_from(["gotvc", "branch", "-d", "--switch", "topic"]).is_err());
        assert!(Cli::try_parse_from(["gotvc", "branch", "-d", "topic"]).is_ok());
    }

    #[test]
    fn status_codes_match_got_letters() {
        assert_eq!(*status_code(FileStatus::Edited).content(), "M");
        assert_eq!(*status_code(FileStatus::Unregistered).content(), "?");
        assert_eq!(*stage_code(Some(StageStatus::StagedAdded)).content(), "A");
        assert_eq!(*stage_code(None).content(), " ");
    }
}
