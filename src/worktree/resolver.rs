//! Branch to working-directory lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ConvoyError, Result};

/// Resolve the working directory checked out on a branch
pub trait WorkingDirectoryResolver: Send + Sync {
    fn resolve_working_directory(&self, branch: &str) -> Result<PathBuf>;
}

/// Resolver backed by `git worktree list` in a repository
#[derive(Debug)]
pub struct GitWorktreeResolver {
    repo_root: PathBuf,
}

impl GitWorktreeResolver {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}

impl WorkingDirectoryResolver for GitWorktreeResolver {
    fn resolve_working_directory(&self, branch: &str) -> Result<PathBuf> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| ConvoyError::Worktree(format!("Failed to execute git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvoyError::Worktree(format!("Failed to list worktrees: {}", stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_worktree_list(&stdout)
            .remove(branch)
            .ok_or_else(|| ConvoyError::Worktree(format!("No worktree for branch {}", branch)))
    }
}

/// Map branch name to worktree path from `git worktree list --porcelain` output
///
/// Detached and bare worktrees have no branch and are skipped.
pub fn parse_worktree_list(porcelain: &str) -> HashMap<String, PathBuf> {
    let mut branches = HashMap::new();
    let mut current: Option<PathBuf> = None;

    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current = Some(PathBuf::from(path));
        } else if let Some(reference) = line.strip_prefix("branch ")
            && let Some(path) = &current
        {
            let name = reference.strip_prefix("refs/heads/").unwrap_or(reference);
            branches.insert(name.to_string(), path.clone());
        } else if line.is_empty() {
            current = None;
        }
    }

    branches
}

/// Fixed branch table, for hosts without git and for tests
#[derive(Debug, Default)]
pub struct StaticResolver {
    directories: HashMap<String, PathBuf>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, branch: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.directories.insert(branch.into(), path.into());
        self
    }
}

impl WorkingDirectoryResolver for StaticResolver {
    fn resolve_working_directory(&self, branch: &str) -> Result<PathBuf> {
        self.directories
            .get(branch)
            .cloned()
            .ok_or_else(|| ConvoyError::Worktree(format!("No worktree for branch {}", branch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORCELAIN: &str = "worktree /repo\n\
HEAD 1111111111111111111111111111111111111111\n\
branch refs/heads/main\n\
\n\
worktree /repo/.worktrees/review\n\
HEAD 2222222222222222222222222222222222222222\n\
branch refs/heads/feature/review\n\
\n\
worktree /repo/.worktrees/scratch\n\
HEAD 3333333333333333333333333333333333333333\n\
detached\n";

    #[test]
    fn test_parse_worktree_list() {
        let branches = parse_worktree_list(PORCELAIN);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches["main"], PathBuf::from("/repo"));
        assert_eq!(branches["feature/review"], PathBuf::from("/repo/.worktrees/review"));
    }

    #[test]
    fn test_parse_worktree_list_empty() {
        assert!(parse_worktree_list("").is_empty());
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new().with_branch("main", "/work/main");
        assert_eq!(
            resolver.resolve_working_directory("main").unwrap(),
            PathBuf::from("/work/main")
        );
        assert!(matches!(
            resolver.resolve_working_directory("other"),
            Err(ConvoyError::Worktree(_))
        ));
    }

    #[test]
    fn test_git_resolver_outside_repo_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let resolver = GitWorktreeResolver::new(temp.path());
        assert_eq!(resolver.repo_root(), temp.path());
        assert!(resolver.resolve_working_directory("main").is_err());
    }
}
