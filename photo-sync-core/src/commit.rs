//! # commit: atomic multi-file publish over git data primitives
//!
//! A [`CommitPlan`] is applied with the six-step protocol:
//!
//! 1. read the branch head commit,
//! 2. read its root tree (the base tree),
//! 3. create one blob per file from its base64 payload,
//! 4. create a tree over the base tree with only the new paths,
//! 5. create a commit whose parent is the head from step 1,
//! 6. move the branch to that commit without forcing.
//!
//! The branch is written exactly once, in step 6, after every object exists.
//! A failure anywhere before that leaves the branch where it was; unreferenced
//! blobs/trees/commits are invisible and collected by the platform.
//!
//! If the head moved since step 1 the attempt fails with
//! [`SyncError::ConcurrentModification`] and [`publish`] redrives the whole
//! protocol from step 1, never a partial step.

use tracing::{debug, error, info, warn};

use crate::contract::{GitData, TreeEntry};
use crate::error::{destination_err, ApiError, SyncError};

/// Regular, non-executable file.
pub const FILE_MODE: &str = "100644";

/// One file to add or replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content_base64: String,
    pub mode: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content_base64: impl Into<String>) -> Self {
        FileEntry {
            path: path.into(),
            content_base64: content_base64.into(),
            mode: FILE_MODE.to_string(),
        }
    }
}

/// Everything needed for one publish. Built fresh per item.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub repo: String,
    pub branch: String,
    pub message: String,
    pub files: Vec<FileEntry>,
    /// When set, the attempt aborts without creating objects if this path
    /// already exists at the base commit.
    pub guard_path: Option<String>,
}

impl CommitPlan {
    fn validate(&self) -> Result<(), SyncError> {
        if self.files.is_empty() {
            return Err(SyncError::Invariant(format!(
                "commit plan for {} has no files",
                self.repo
            )));
        }
        for (i, file) in self.files.iter().enumerate() {
            if file.path.is_empty() || file.path.starts_with('/') {
                return Err(SyncError::Invariant(format!("invalid path {:?}", file.path)));
            }
            if self.files[..i].iter().any(|f| f.path == file.path) {
                return Err(SyncError::Invariant(format!("duplicate path {}", file.path)));
            }
        }
        Ok(())
    }
}

/// Outcome of a successful protocol run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// The branch now points at `commit_sha`, whose parent is `parent_sha`.
    Committed {
        commit_sha: String,
        parent_sha: String,
        attempts: u32,
    },
    /// The guard path already existed at the base commit; nothing was created.
    AlreadyPresent { path: String },
}

/// Apply `plan`, redriving from step 1 on concurrent modification, at most
/// `max_attempts` times in total.
pub async fn publish<G>(git: &G, plan: &CommitPlan, max_attempts: u32) -> Result<PublishResult, SyncError>
where
    G: GitData + ?Sized,
{
    plan.validate()?;
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match publish_once(git, plan).await {
            Ok(PublishResult::Committed {
                commit_sha,
                parent_sha,
                ..
            }) => {
                return Ok(PublishResult::Committed {
                    commit_sha,
                    parent_sha,
                    attempts: attempt,
                })
            }
            Ok(other) => return Ok(other),
            Err(SyncError::ConcurrentModification { repo, branch }) if attempt < max_attempts => {
                warn!(
                    repo = %repo,
                    branch = %branch,
                    attempt,
                    "[COMMIT] Branch moved during publish, retrying from a fresh base"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// One run of the six-step protocol. No retries.
pub async fn publish_once<G>(git: &G, plan: &CommitPlan) -> Result<PublishResult, SyncError>
where
    G: GitData + ?Sized,
{
    let repo = plan.repo.as_str();
    let branch = plan.branch.as_str();
    let dest = |e: ApiError| destination_err(repo, e);

    // 1-2: base
    let head = git.get_branch_head(repo, branch).await.map_err(dest)?;
    let base_tree = git.get_commit_tree(repo, &head).await.map_err(dest)?;
    debug!(repo = %repo, head = %head, base_tree = %base_tree, "[COMMIT] Read base");

    if let Some(path) = &plan.guard_path {
        if git.path_exists(repo, &head, path).await.map_err(dest)? {
            info!(repo = %repo, path = %path, head = %head, "[COMMIT] Path already present at base commit");
            return Ok(PublishResult::AlreadyPresent { path: path.clone() });
        }
    }

    // 3: blobs
    let mut entries = Vec::with_capacity(plan.files.len());
    for file in &plan.files {
        let sha = git
            .create_blob(repo, &file.content_base64)
            .await
            .map_err(|e| {
                error!(repo = %repo, path = %file.path, error = ?e, "[COMMIT][ERROR] create_blob failed");
                dest(e)
            })?;
        debug!(path = %file.path, sha = %sha, "[COMMIT] Created blob");
        entries.push(TreeEntry {
            path: file.path.clone(),
            mode: file.mode.clone(),
            sha,
        });
    }

    // 4-5: tree and commit
    let tree = git
        .create_tree(repo, &base_tree, &entries)
        .await
        .map_err(|e| {
            error!(repo = %repo, error = ?e, "[COMMIT][ERROR] create_tree failed");
            dest(e)
        })?;
    let commit = git
        .create_commit(repo, &plan.message, &tree, &head)
        .await
        .map_err(|e| {
            error!(repo = %repo, error = ?e, "[COMMIT][ERROR] create_commit failed");
            dest(e)
        })?;
    debug!(tree = %tree, commit = %commit, "[COMMIT] Created tree and commit");

    let concurrent = || SyncError::ConcurrentModification {
        repo: repo.to_string(),
        branch: branch.to_string(),
    };

    // The platform rejects non fast-forward updates; checking first avoids the
    // write when we already know it will be refused.
    let current = git.get_branch_head(repo, branch).await.map_err(dest)?;
    if current != head {
        warn!(repo = %repo, expected = %head, found = %current, "[COMMIT] Branch head moved before update");
        return Err(concurrent());
    }

    // 6: the only write to the branch
    match git.update_branch(repo, branch, &commit).await {
        Ok(()) => {
            info!(repo = %repo, branch = %branch, commit = %commit, files = entries.len(), "[COMMIT] Branch advanced");
            Ok(PublishResult::Committed {
                commit_sha: commit,
                parent_sha: head,
                attempts: 1,
            })
        }
        Err(ApiError::Conflict(message)) => {
            warn!(repo = %repo, message = %message, "[COMMIT] Ref update rejected as non fast-forward");
            Err(concurrent())
        }
        Err(e) => {
            error!(repo = %repo, error = ?e, "[COMMIT][ERROR] update_branch failed");
            Err(dest(e))
        }
    }
}
