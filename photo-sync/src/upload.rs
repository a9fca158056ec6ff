//! # Destination platform client (GitHub REST)
//!
//! [`GitHubClient`] implements the three destination seams of
//! `photo-sync-core`: [`CodeSearch`], [`GitData`] and [`SecretStore`]. One
//! client is built per run from the destination token and passed down
//! explicitly.
//!
//! Status mapping:
//! - transport failures => [`ApiError::Unreachable`]
//! - a rejected (non fast-forward) ref update => [`ApiError::Conflict`]
//! - any other non-2xx => [`ApiError::Status`], with the platform's `message`
//!   when the body carries one

use async_trait::async_trait;
use photo_sync_core::contract::{CodeSearch, DestinationKey, GitData, SecretStore, TreeEntry};
use photo_sync_core::secret::{EncryptedSecret, Secret};
use photo_sync_core::{ApiError, SyncError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefBody {
    object: Sha,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    tree: Sha,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct PublicKeyBody {
    key_id: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct NewBlob<'a> {
    content: &'a str,
    encoding: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
struct NewTreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct NewTree<'a> {
    base_tree: &'a str,
    tree: Vec<NewTreeEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct NewCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct RefUpdate<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct SecretBody<'a> {
    encrypted_value: &'a str,
    key_id: &'a str,
}

/// Non-2xx response => [`ApiError::Status`], preferring the platform's message.
pub fn status_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<MessageBody>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.trim().to_string());
    ApiError::Status { status, message }
}

/// Decode a JSON body after checking the status.
pub fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    if !(200..300).contains(&status) {
        return Err(status_error(status, body));
    }
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Outcome of the non-forced ref update. A 409, or a 422 refusing a non fast
/// forward, means the branch moved. Other 422s ("Reference does not exist",
/// "Object does not exist") are plain failures.
pub fn ref_update_result(status: u16, body: &str) -> Result<(), ApiError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    match status_error(status, body) {
        ApiError::Status { status: 409, message } => Err(ApiError::Conflict(message)),
        ApiError::Status { status: 422, message }
            if message.to_ascii_lowercase().contains("fast forward") =>
        {
            Err(ApiError::Conflict(message))
        }
        other => Err(other),
    }
}

/// Secret writes answer 201 (created) or 204 (updated); anything else failed.
pub fn secret_write_result(status: u16, body: &str) -> Result<(), ApiError> {
    match status {
        201 | 204 => Ok(()),
        _ => Err(status_error(status, body)),
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Unreachable(e.without_url().to_string())
}

pub struct GitHubClient {
    http: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: &Secret) -> Result<Self, SyncError> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: &Secret, base_url: impl Into<String>) -> Result<Self, SyncError> {
        let mut auth = HeaderValue::from_str(&format!("token {}", token.expose()))
            .map_err(|_| SyncError::Config("GITHUB_TOKEN is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("photo-sync/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::Config(format!("could not build HTTP client: {e}")))?;
        tracing::info!("Initialized GitHubClient");
        Ok(GitHubClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, repo: &str, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, repo, tail)
    }

    async fn send(&self, req: RequestBuilder) -> Result<(u16, String), ApiError> {
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport)?;
        Ok((status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let (status, body) = self.send(req).await?;
        decode(status, &body)
    }
}

#[async_trait]
impl CodeSearch for GitHubClient {
    async fn search_code_count(&self, query: &str) -> Result<u64, ApiError> {
        tracing::debug!(query, "Searching code");
        let url = format!("{}/search/code", self.base_url);
        let body: SearchBody = self
            .send_json(self.http.get(url).query(&[("q", query)]))
            .await?;
        Ok(body.total_count)
    }
}

#[async_trait]
impl GitData for GitHubClient {
    async fn get_branch_head(&self, repo: &str, branch: &str) -> Result<String, ApiError> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{branch}"));
        let body: RefBody = self.send_json(self.http.get(url)).await?;
        Ok(body.object.sha)
    }

    async fn get_commit_tree(&self, repo: &str, commit_sha: &str) -> Result<String, ApiError> {
        let url = self.repo_url(repo, &format!("git/commits/{commit_sha}"));
        let body: CommitBody = self.send_json(self.http.get(url)).await?;
        Ok(body.tree.sha)
    }

    async fn path_exists(&self, repo: &str, commit_sha: &str, path: &str) -> Result<bool, ApiError> {
        let url = self.repo_url(repo, &format!("contents/{path}"));
        let (status, body) = self
            .send(self.http.get(url).query(&[("ref", commit_sha)]))
            .await?;
        match StatusCode::from_u16(status) {
            Ok(s) if s.is_success() => Ok(true),
            Ok(StatusCode::NOT_FOUND) => Ok(false),
            _ => Err(status_error(status, &body)),
        }
    }

    async fn create_blob(&self, repo: &str, content_base64: &str) -> Result<String, ApiError> {
        let url = self.repo_url(repo, "git/blobs");
        let body: Sha = self
            .send_json(self.http.post(url).json(&NewBlob {
                content: content_base64,
                encoding: "base64",
            }))
            .await?;
        tracing::debug!(repo, sha = %body.sha, "Created blob");
        Ok(body.sha)
    }

    async fn create_tree(&self, repo: &str, base_tree: &str, entries: &[TreeEntry]) -> Result<String, ApiError> {
        let url = self.repo_url(repo, "git/trees");
        let body: Sha = self
            .send_json(self.http.post(url).json(&NewTree {
                base_tree,
                tree: tree_entries(entries),
            }))
            .await?;
        Ok(body.sha)
    }

    async fn create_commit(
        &self,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, ApiError> {
        let url = self.repo_url(repo, "git/commits");
        let body: Sha = self
            .send_json(self.http.post(url).json(&NewCommit {
                message,
                tree: tree_sha,
                parents: [parent_sha],
            }))
            .await?;
        Ok(body.sha)
    }

    async fn update_branch(&self, repo: &str, branch: &str, commit_sha: &str) -> Result<(), ApiError> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{branch}"));
        let (status, body) = self
            .send(self.http.patch(url).json(&RefUpdate {
                sha: commit_sha,
                force: false,
            }))
            .await?;
        ref_update_result(status, &body)
    }
}

fn tree_entries(entries: &[TreeEntry]) -> Vec<NewTreeEntry<'_>> {
    entries
        .iter()
        .map(|e| NewTreeEntry {
            path: &e.path,
            mode: &e.mode,
            kind: "blob",
            sha: &e.sha,
        })
        .collect()
}

#[async_trait]
impl SecretStore for GitHubClient {
    async fn public_key(&self, repo: &str) -> Result<DestinationKey, ApiError> {
        let url = self.repo_url(repo, "actions/secrets/public-key");
        let body: PublicKeyBody = self.send_json(self.http.get(url)).await?;
        tracing::info!(repo, key_id = %body.key_id, "Fetched secrets public key");
        Ok(DestinationKey {
            key: body.key,
            key_id: body.key_id,
        })
    }

    async fn put_secret(&self, repo: &str, secret: &EncryptedSecret) -> Result<(), ApiError> {
        let url = self.repo_url(repo, &format!("actions/secrets/{}", secret.name));
        let (status, body) = self
            .send(self.http.put(url).json(&SecretBody {
                encrypted_value: &secret.encrypted_value,
                key_id: &secret.key_id,
            }))
            .await?;
        secret_write_result(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_platform_message() {
        let body = r#"{"message":"Bad credentials","documentation_url":"https://docs.github.com/rest"}"#;
        assert_eq!(
            status_error(401, body),
            ApiError::Status {
                status: 401,
                message: "Bad credentials".into()
            }
        );
        assert_eq!(
            status_error(502, "upstream down\n"),
            ApiError::Status {
                status: 502,
                message: "upstream down".into()
            }
        );
    }

    #[test]
    fn decodes_ref_and_search_bodies() {
        let head: RefBody = decode(
            200,
            r#"{"ref":"refs/heads/master","object":{"sha":"abc123","type":"commit"}}"#,
        )
        .unwrap();
        assert_eq!(head.object.sha, "abc123");

        let search: SearchBody = decode(200, r#"{"total_count":2,"items":[]}"#).unwrap();
        assert_eq!(search.total_count, 2);

        assert!(matches!(
            decode::<SearchBody>(200, "not json"),
            Err(ApiError::Decode(_))
        ));
        assert!(matches!(
            decode::<SearchBody>(403, r#"{"message":"rate limited"}"#),
            Err(ApiError::Status { status: 403, .. })
        ));
    }

    #[test]
    fn rejected_fast_forward_is_a_conflict() {
        assert_eq!(ref_update_result(200, "{}"), Ok(()));
        assert_eq!(
            ref_update_result(422, r#"{"message":"Update is not a fast forward"}"#),
            Err(ApiError::Conflict("Update is not a fast forward".into()))
        );
        assert!(matches!(
            ref_update_result(409, r#"{"message":"Git Repository is empty."}"#),
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            ref_update_result(500, ""),
            Err(ApiError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn missing_ref_or_object_is_not_a_conflict() {
        for message in ["Reference does not exist", "Object does not exist"] {
            let body = format!(r#"{{"message":"{message}"}}"#);
            assert_eq!(
                ref_update_result(422, &body),
                Err(ApiError::Status {
                    status: 422,
                    message: message.into()
                })
            );
        }
    }

    #[test]
    fn secret_writes_accept_only_created_or_updated() {
        assert!(secret_write_result(201, "").is_ok());
        assert!(secret_write_result(204, "").is_ok());
        assert!(secret_write_result(200, "").is_err());
        assert!(matches!(
            secret_write_result(422, r#"{"message":"Bad key_id"}"#),
            Err(ApiError::Status { status: 422, .. })
        ));
    }

    #[test]
    fn request_bodies_match_the_api() {
        let entries = vec![TreeEntry {
            path: "img/X.jpg".into(),
            mode: "100644".into(),
            sha: "b1".into(),
        }];
        let tree = serde_json::to_value(NewTree {
            base_tree: "t0",
            tree: tree_entries(&entries),
        })
        .unwrap();
        assert_eq!(
            tree,
            serde_json::json!({
                "base_tree": "t0",
                "tree": [{"path": "img/X.jpg", "mode": "100644", "type": "blob", "sha": "b1"}]
            })
        );

        let update = serde_json::to_value(RefUpdate { sha: "c1", force: false }).unwrap();
        assert_eq!(update, serde_json::json!({"sha": "c1", "force": false}));

        let commit = serde_json::to_value(NewCommit {
            message: "m",
            tree: "t1",
            parents: ["p"],
        })
        .unwrap();
        assert_eq!(commit["parents"], serde_json::json!(["p"]));
    }

    #[test]
    fn client_rejects_unprintable_token() {
        assert!(matches!(
            GitHubClient::new(&Secret::new("bad\ntoken")),
            Err(SyncError::Config(_))
        ));
        assert!(GitHubClient::with_base_url(&Secret::new("ghp_x"), "http://localhost:1/").is_ok());
    }
}
