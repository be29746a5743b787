//! Write-containment diffing over `git status --porcelain` output.
//!
//! An agent invoked for a phase may only change paths inside that phase's allow-list.
//! The check is a post-hoc diff of working-tree status against a baseline taken before
//! the agent ran; it does not prevent writes.

use std::fmt::Write as _;

use tracing::debug;

/// One working-tree status entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitFileChange {
    /// 1-2 character status code (`M`, `A`, `D`, `??`, `R`, `MM`, ...).
    pub code: String,
    /// Path relative to the repository root. Renames keep `old -> new`.
    pub path: String,
}

impl GitFileChange {
    pub fn kind(&self) -> ChangeKind {
        ChangeKind::from_code(&self.code)
    }

    /// Every path this change touches (both sides of a rename).
    pub fn touched_paths(&self) -> Vec<&str> {
        match self.path.split_once(" -> ") {
            Some((old, new)) => vec![old.trim(), new.trim()],
            None => vec![self.path.as_str()],
        }
    }
}

/// Human-facing grouping of status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Untracked,
    Renamed,
}

impl ChangeKind {
    const ORDER: [ChangeKind; 5] = [
        ChangeKind::Modified,
        ChangeKind::Added,
        ChangeKind::Deleted,
        ChangeKind::Untracked,
        ChangeKind::Renamed,
    ];

    pub fn from_code(code: &str) -> Self {
        if code == "??" {
            ChangeKind::Untracked
        } else if code.contains('R') {
            ChangeKind::Renamed
        } else if code.contains('D') {
            ChangeKind::Deleted
        } else if code.contains('A') {
            ChangeKind::Added
        } else {
            ChangeKind::Modified
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Modified => "Modified",
            ChangeKind::Added => "Added",
            ChangeKind::Deleted => "Deleted",
            ChangeKind::Untracked => "Untracked",
            ChangeKind::Renamed => "Renamed",
        }
    }
}

/// Outcome of comparing the working tree against a baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainmentResult {
    pub valid: bool,
    pub violations: Vec<GitFileChange>,
    /// Changes introduced since the baseline, allowed or not.
    pub all_changes: Vec<GitFileChange>,
    pub allowed_paths: Vec<String>,
}

impl ContainmentResult {
    pub fn violation_paths(&self) -> Vec<&str> {
        self.violations.iter().map(|c| c.path.as_str()).collect()
    }
}

/// Parse short-status output into changes. Blank and malformed lines are skipped.
pub fn parse_status_lines(output: &str) -> Vec<GitFileChange> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_status_line(line);
            if parsed.is_none() {
                debug!(line, "skipping unparseable status line");
            }
            parsed
        })
        .collect()
}

fn parse_status_line(line: &str) -> Option<GitFileChange> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Some(GitFileChange {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    let (code, path) = match (line.get(..2), line.get(2..3), line.get(3..)) {
        (Some(code), Some(" "), Some(path)) => (code.trim(), path),
        // Output whose leading space was trimmed away, e.g. "M src/lib.rs".
        _ => line.trim_start().split_once(char::is_whitespace)?,
    };
    let path = path.trim();
    if code.is_empty() || path.is_empty() {
        return None;
    }
    Some(GitFileChange {
        code: code.to_string(),
        path: unquote(path),
    })
}

fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

/// True when `path` equals `allowed` or is nested under it as a directory.
pub fn is_within(path: &str, allowed: &str) -> bool {
    let path = normalize(path);
    let allowed = normalize(allowed);
    if allowed.is_empty() {
        return false;
    }
    path == allowed
        || path
            .strip_prefix(allowed)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn normalize(path: &str) -> &str {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_end_matches('/')
}

/// Diff `after` against the `before` baseline and the allow-list.
///
/// Entries whose path already appeared in `before` are pre-existing and ignored. A
/// rename is allowed only when both of its sides are inside the allow-list.
pub fn evaluate_containment(
    before: &[GitFileChange],
    after: &[GitFileChange],
    allowed_paths: &[String],
) -> ContainmentResult {
    let all_changes: Vec<GitFileChange> = after
        .iter()
        .filter(|change| !before.iter().any(|prev| prev.path == change.path))
        .cloned()
        .collect();

    let violations: Vec<GitFileChange> = all_changes
        .iter()
        .filter(|change| {
            !change
                .touched_paths()
                .iter()
                .all(|path| allowed_paths.iter().any(|allowed| is_within(path, allowed)))
        })
        .cloned()
        .collect();

    ContainmentResult {
        valid: violations.is_empty(),
        violations,
        all_changes,
        allowed_paths: allowed_paths.to_vec(),
    }
}

/// Render violations grouped by change kind. Empty when there are none.
pub fn format_violations(result: &ContainmentResult) -> String {
    if result.violations.is_empty() {
        return String::new();
    }

    let mut out = format!(
        "Unauthorized file changes detected ({}):\n",
        result.violations.len()
    );
    for kind in ChangeKind::ORDER {
        let paths: Vec<&str> = result
            .violations
            .iter()
            .filter(|change| change.kind() == kind)
            .map(|change| change.path.as_str())
            .collect();
        if paths.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}:", kind.label());
        for path in paths {
            let _ = writeln!(out, "  - {path}");
        }
    }

    out.push_str("\nThis phase may only change these paths:\n");
    if result.allowed_paths.is_empty() {
        out.push_str("  (none)\n");
    }
    for allowed in &result.allowed_paths {
        let _ = writeln!(out, "  - {allowed}");
    }
    out.trim_end().to_string()
}
