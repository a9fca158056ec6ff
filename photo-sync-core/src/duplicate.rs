//! Best-effort duplicate check against the destination's code search.

use tracing::{debug, info};

use crate::contract::CodeSearch;
use crate::error::{destination_err, SyncError};

/// Search query for a post named after `short_code` under `posts_dir` of `repo`.
pub fn search_query(repo: &str, posts_dir: &str, short_code: &str) -> String {
    format!(
        "filename:{} repo:{} path:{}",
        short_code,
        repo,
        posts_dir.trim_end_matches('/')
    )
}

/// Whether `repo` already has a post for `short_code`.
///
/// Any non-zero result count counts as published. This is not a lock: two
/// overlapping runs can both see zero.
pub async fn repo_has_post<C>(
    search: &C,
    repo: &str,
    posts_dir: &str,
    short_code: &str,
) -> Result<bool, SyncError>
where
    C: CodeSearch + ?Sized,
{
    let query = search_query(repo, posts_dir, short_code);
    debug!(query = %query, "[SYNC] Searching destination for existing post");
    let count = search
        .search_code_count(&query)
        .await
        .map_err(|e| destination_err(repo, e))?;
    info!(repo = %repo, short_code = %short_code, count, "[SYNC] Duplicate check");
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockCodeSearch;
    use crate::error::ApiError;

    #[test]
    fn builds_scoped_query() {
        assert_eq!(
            search_query("lildude/lildude.github.io", "_posts/", "FOOOBAAR"),
            "filename:FOOOBAAR repo:lildude/lildude.github.io path:_posts"
        );
    }

    #[tokio::test]
    async fn nonzero_count_means_published() {
        let mut search = MockCodeSearch::new();
        search
            .expect_search_code_count()
            .withf(|q| q.contains("filename:BAARFOOO"))
            .returning(|_| Ok(1));
        search
            .expect_search_code_count()
            .withf(|q| q.contains("filename:FOOOBAAR"))
            .returning(|_| Ok(0));

        assert!(repo_has_post(&search, "lildude/lildude.github.io", "_posts", "BAARFOOO")
            .await
            .unwrap());
        assert!(!repo_has_post(&search, "lildude/lildude.github.io", "_posts", "FOOOBAAR")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn search_failure_is_a_destination_error() {
        let mut search = MockCodeSearch::new();
        search.expect_search_code_count().returning(|_| {
            Err(ApiError::Status {
                status: 403,
                message: "rate limited".into(),
            })
        });
        let err = repo_has_post(&search, "o/r", "_posts", "X").await.unwrap_err();
        assert!(matches!(err, SyncError::Destination { repo, .. } if repo == "o/r"));
    }
}
