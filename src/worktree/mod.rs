//! Working-directory resolution for delegated work.
//!
//! A delegation may name a branch; the recipient's working directory is the
//! git worktree checked out on that branch.

mod resolver;

pub use resolver::{GitWorktreeResolver, StaticResolver, WorkingDirectoryResolver, parse_worktree_list};
