//! GitHub API interaction module
//!
//! Fetches release metadata for a repository. Every failure mode the batch
//! driver needs to tell apart has its own [`GitHubError`] variant.

use crate::types::GitHubRelease;
use chrono::{TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("gh-updater/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("repository {repo} not found or has no published release")]
    RepoNotFound { repo: String },

    #[error("no releases found for {repo}")]
    NoReleases { repo: String },

    #[error("GitHub API rate limit exceeded for {repo}{}", reset_hint(.reset_at))]
    RateLimited { repo: String, reset_at: Option<i64> },

    #[error("GitHub rejected the credentials for {repo} ({status}); check your token")]
    AuthRejected { repo: String, status: StatusCode },

    #[error("failed to get release info for {repo}: {status}")]
    RequestFailed { repo: String, status: StatusCode },

    #[error("unexpected response from GitHub for {repo}: {reason}")]
    InvalidResponse { repo: String, reason: String },

    #[error("network error while querying {repo}: {source}")]
    Network {
        repo: String,
        #[source]
        source: reqwest::Error,
    },
}

fn reset_hint(reset_at: &Option<i64>) -> String {
    match reset_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
        Some(when) => format!(" (resets at {})", when.to_rfc3339()),
        None => String::new(),
    }
}

/// Build the API URL for a repository's releases.
///
/// `include_prerelease` selects the release list (newest first, including
/// pre-releases) instead of the "latest stable" endpoint.
pub fn build_gh_release_url(api_base: &str, repo: &str, include_prerelease: bool) -> String {
    if include_prerelease {
        format!("{}/repos/{}/releases", api_base, repo)
    } else {
        format!("{}/repos/{}/releases/latest", api_base, repo)
    }
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_base: Option<&str>, token: Option<String>) -> Self {
        let api_base = api_base
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            client: reqwest::Client::new(),
            api_base,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The underlying HTTP client, shared with asset downloads.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch the newest release of `repo`.
    ///
    /// With `include_prerelease` the newest non-draft release of any kind is
    /// returned, otherwise GitHub's latest stable release.
    pub async fn get_latest_release(
        &self,
        repo: &str,
        include_prerelease: bool,
    ) -> Result<GitHubRelease, GitHubError> {
        let url = build_gh_release_url(&self.api_base, repo, include_prerelease);
        tracing::debug!("Fetching GitHub release info from: {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let network = |source| GitHubError::Network {
            repo: repo.to_string(),
            source,
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(repo, status, response.headers()));
        }

        let body = response.text().await.map_err(network)?;
        let invalid = |e: serde_json::Error| GitHubError::InvalidResponse {
            repo: repo.to_string(),
            reason: e.to_string(),
        };

        if include_prerelease {
            let releases: Vec<GitHubRelease> = serde_json::from_str(&body).map_err(invalid)?;
            releases
                .into_iter()
                .find(|r| !r.draft)
                .ok_or_else(|| GitHubError::NoReleases {
                    repo: repo.to_string(),
                })
        } else {
            serde_json::from_str(&body).map_err(invalid)
        }
    }
}

fn classify_failure(repo: &str, status: StatusCode, headers: &HeaderMap) -> GitHubError {
    let repo = repo.to_string();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let quota_exhausted = header("x-ratelimit-remaining") == Some("0");

    match status {
        StatusCode::NOT_FOUND => GitHubError::RepoNotFound { repo },
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited {
            repo,
            reset_at: header("x-ratelimit-reset").and_then(|v| v.parse().ok()),
        },
        StatusCode::FORBIDDEN if quota_exhausted => GitHubError::RateLimited {
            repo,
            reset_at: header("x-ratelimit-reset").and_then(|v| v.parse().ok()),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GitHubError::AuthRejected { repo, status }
        }
        _ => GitHubError::RequestFailed { repo, status },
    }
}
