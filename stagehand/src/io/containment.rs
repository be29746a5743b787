//! Working-tree snapshots for write containment.

use tracing::{debug, warn};

use super::git::Vcs;
use crate::core::containment::{
    ContainmentResult, GitFileChange, evaluate_containment, parse_status_lines,
};
use crate::error::GitError;

/// Snapshots `git status` before an agent runs and diffs it afterwards.
pub struct ContainmentChecker<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> ContainmentChecker<'a> {
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    pub fn snapshot(&self) -> Result<Vec<GitFileChange>, GitError> {
        let changes = parse_status_lines(&self.vcs.status_short()?);
        debug!(changes = changes.len(), "containment snapshot");
        Ok(changes)
    }

    /// Re-snapshot and check every new change against `allowed_paths`.
    pub fn compare(
        &self,
        before: &[GitFileChange],
        allowed_paths: &[String],
    ) -> Result<ContainmentResult, GitError> {
        let after = self.snapshot()?;
        let result = evaluate_containment(before, &after, allowed_paths);
        if !result.valid {
            warn!(
                violations = result.violations.len(),
                "containment violation"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::git::Git;
    use crate::test_support::TestRepo;

    #[test]
    fn ignores_preexisting_and_allowed_changes() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let checker = ContainmentChecker::new(&git);
        repo.write("scratch.txt", "unrelated\n").expect("write");
        let before = checker.snapshot().expect("snapshot");

        repo.write(".stagehand/items/001/plan.md", "# plan\n")
            .expect("write");
        let allowed = vec![".stagehand/items/001/plan.md".to_string()];
        let result = checker.compare(&before, &allowed).expect("compare");
        assert!(result.valid, "{:?}", result.violations);

        repo.write("src/evil.rs", "//\n").expect("write");
        let result = checker.compare(&before, &allowed).expect("compare");
        assert!(!result.valid);
        assert_eq!(result.violation_paths(), vec!["src/evil.rs"]);
    }
}
