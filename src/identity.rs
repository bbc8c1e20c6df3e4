//! Identity Resolver: pure, stateless lookups against `/proc`.
//!
//! Every lookup here is best-effort. A thread that exits between the
//! scheduler event and our `/proc` read is an expected race, not an
//! error; callers get `None` or a synthetic placeholder, never a
//! propagated failure.

use std::path::{Path, PathBuf};

use ctxtrace_common::Pid;

/// Resolves thread/process identity against a `/proc`-shaped tree. The
/// root is configurable so tests can point it at a fixture directory.
pub struct IdentityResolver {
    proc_root: PathBuf,
}

impl IdentityResolver {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Looks up the owning process (thread-group leader) of `tid` from
    /// the `Tgid:` field of `/proc/<tid>/status`. `None` if the thread
    /// has already exited or the field is missing/malformed.
    pub fn owning_process(&self, tid: i32) -> Option<Pid> {
        let path = self.proc_root.join(tid.to_string()).join("status");
        let content = std::fs::read_to_string(path).ok()?;
        content.lines().find_map(|line| {
            line.strip_prefix("Tgid:")
                .and_then(|rest| rest.trim().parse::<Pid>().ok())
        })
    }

    /// Looks up the process name of `pid` from the second
    /// whitespace-delimited token of `/proc/<pid>/stat`, with its
    /// surrounding parens stripped. Returns the name and whether the
    /// lookup succeeded; on failure the name is a synthetic
    /// `"process <pid> (died)"` placeholder.
    pub fn process_name(&self, pid: Pid) -> (String, bool) {
        let path = self.proc_root.join(pid.to_string()).join("stat");
        match std::fs::read_to_string(&path) {
            Ok(content) => match parse_comm_field(&content) {
                Some(name) => (name, true),
                None => (format!("process {pid} (died)"), false),
            },
            Err(_) => (format!("process {pid} (died)"), false),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

/// Takes the second whitespace-delimited token of a `/proc/<pid>/stat`
/// line and strips exactly its first and last character. Matches
/// `fscanf(fp, "%*d %255s", name)` followed by stripping the
/// surrounding parens: a single token, so a comm containing a space
/// (e.g. a prctl-renamed `"postgres: writer process"`) is truncated at
/// the first space, same as the original.
fn parse_comm_field(stat_line: &str) -> Option<String> {
    let token = stat_line.split_whitespace().nth(1)?;
    if token.len() < 2 {
        return None;
    }
    Some(token[1..token.len() - 1].to_string())
}
