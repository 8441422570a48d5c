#![allow(dead_code)]

use gotvc::config::GotConfig;
use gotvc::Repository;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Separator between arguments in the invocation log
const ARG_SEPARATOR: char = '\u{1f}';

/// Helper to create a directory that looks like a got work tree
pub fn create_work_tree() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("wt");
    fs::create_dir_all(root.join(".got")).expect("Failed to create .got");
    (temp_dir, root)
}

/// Helper to create a file inside a work tree
pub fn write_file(root: &Path, file: &str, content: &str) -> PathBuf {
    let path = root.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
    path
}

/// A stand-in `got` executable replaying canned responses
///
/// Each subcommand answers with the file `responses/<subcommand>`, or
/// `responses/<subcommand>.<n>` for its n-th call when present. A
/// `<name>.stderr` file goes to stderr and `<name>.exit` sets the exit code.
/// `<name>.sleep` delays the exit. `got -V` uses the name `version`.
/// Every invocation is logged.
pub struct FakeGot {
    _temp: TempDir,
    pub root: PathBuf,
    pub program: PathBuf,
    responses: PathBuf,
    log: PathBuf,
}

impl FakeGot {
    pub fn new() -> Self {
        let (temp, root) = create_work_tree();
        let responses = temp.path().join("responses");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&responses).unwrap();
        fs::create_dir_all(&bin).unwrap();

        let log = temp.path().join("invocations.log");
        let program = bin.join("got");
        let script = format!(
            r#"#!/bin/sh
d='{responses}'
for a in "$@"; do printf '%s\037' "$a" >> '{log}'; done
printf '\n' >> '{log}'
sub="$1"
[ "$sub" = "-V" ] && sub=version
n=$(cat "$d/.count.$sub" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$d/.count.$sub"
f="$d/$sub"
[ -e "$d/$sub.$n" ] && f="$d/$sub.$n"
[ -f "$f" ] && cat "$f"
[ -f "$f.stderr" ] && cat "$f.stderr" >&2
[ -f "$f.sleep" ] && sleep "$(cat "$f.sleep")"
[ -f "$f.exit" ] && exit "$(cat "$f.exit")"
exit 0
"#,
            responses = responses.display(),
            log = log.display(),
        );
        fs::write(&program, script).unwrap();
        make_executable(&program);

        Self {
            _temp: temp,
            root,
            program,
            responses,
            log,
        }
    }

    /// Answer every call of `subcommand` with `stdout`
    pub fn respond(&self, subcommand: &str, stdout: &str) -> &Self {
        fs::write(self.responses.join(subcommand), stdout).unwrap();
        self
    }

    /// Answer only the n-th call (1-based) of `subcommand` with `stdout`
    pub fn respond_nth(&self, subcommand: &str, n: usize, stdout: &str) -> &Self {
        fs::write(self.responses.join(format!("{}.{}", subcommand, n)), stdout).unwrap();
        self
    }

    /// Make every call of `subcommand` fail
    pub fn fail(&self, subcommand: &str, stderr: &str, code: i32) -> &Self {
        self.fail_bytes(subcommand, stderr.as_bytes(), code)
    }

    /// Make every call of `subcommand` fail with raw stderr bytes
    pub fn fail_bytes(&self, subcommand: &str, stderr: &[u8], code: i32) -> &Self {
        fs::write(self.responses.join(format!("{}.stderr", subcommand)), stderr).unwrap();
        fs::write(self.responses.join(format!("{}.exit", subcommand)), code.to_string()).unwrap();
        self
    }

    /// Keep every call of `subcommand` running for `seconds` after its output
    pub fn delay(&self, subcommand: &str, seconds: u32) -> &Self {
        fs::write(self.responses.join(format!("{}.sleep", subcommand)), seconds.to_string()).unwrap();
        self
    }

    pub fn config(&self) -> GotConfig {
        GotConfig {
            program: self.program.to_string_lossy().into_owned(),
            diff_switches: Vec::new(),
        }
    }

    pub fn repo(&self) -> Repository {
        Repository::new(&self.root, self.config())
    }

    /// Arguments of every call so far, oldest first
    pub fn invocations(&self) -> Vec<Vec<String>> {
        let log = fs::read_to_string(&self.log).unwrap_or_default();
        log.lines()
            .map(|line| {
                line.split(ARG_SEPARATOR)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Arguments of calls to one subcommand
    pub fn calls(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.invocations()
            .into_iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn path(&self, file: &str) -> String {
        self.root.join(file).to_string_lossy().into_owned()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
