use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::core::github::{CommitSource, CommitSummary, GithubError};

/// Minimal GitHub REST API client. It only exposes the call the update commands need.
pub struct GithubApiClient {
    client: Client,
    base_url: String,
}

impl GithubApiClient {
    pub fn new(token: Option<String>) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("User-Agent", HeaderValue::from_static("GearshiftGuard/1.0"));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| GithubError::Api(e.to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GithubError::Api(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.github.com".to_string(),
        })
    }

    fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn map_status(status: StatusCode, target: &str) -> Result<(), GithubError> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(GithubError::NotFound(target.to_string())),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Err(GithubError::RateLimited),
            s => Err(GithubError::Api(format!("GitHub returned {} for {}", s, target))),
        }
    }

    fn map_commit(api: ApiCommit) -> Result<CommitSummary, GithubError> {
        let sha = api
            .sha
            .ok_or_else(|| GithubError::Api("commit without sha".to_string()))?;
        let info = api.commit;
        Ok(CommitSummary {
            message: info
                .as_ref()
                .and_then(|c| c.message.clone())
                .unwrap_or_else(|| "No commit message".to_string()),
            author: info
                .as_ref()
                .and_then(|c| c.author.as_ref())
                .and_then(|a| a.name.clone())
                .or_else(|| api.author.and_then(|a| a.login))
                .unwrap_or_else(|| "Unknown author".to_string()),
            url: api
                .html_url
                .unwrap_or_else(|| "https://github.com".to_string()),
            date: info.and_then(|c| Self::parse_datetime(c.author.and_then(|a| a.date))),
            sha,
        })
    }
}

#[async_trait]
impl CommitSource for GithubApiClient {
    async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<CommitSummary, GithubError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.base_url, owner, repo, branch
        );
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                GithubError::Timeout
            } else {
                GithubError::Api(e.to_string())
            }
        })?;

        Self::map_status(resp.status(), &format!("{}/{}@{}", owner, repo, branch))?;

        let commit: ApiCommit = resp
            .json()
            .await
            .map_err(|e| GithubError::Api(e.to_string()))?;
        Self::map_commit(commit)
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: Option<String>,
    html_url: Option<String>,
    commit: Option<ApiCommitInfo>,
    author: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitInfo {
    message: Option<String>,
    author: Option<ApiCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: Option<String>,
}
