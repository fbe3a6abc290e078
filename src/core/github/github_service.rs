// Staff update logs - posts about website and app changes, optionally taken
// from the latest commit on a GitHub branch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Longest commit body shown in an update post.
const MAX_BODY_CHARS: usize = 1000;

/// Errors that can be raised while fetching commit data.
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("Repository or branch not found: {0}")]
    NotFound(String),
    #[error("GitHub API rate limit exceeded. Try again later or set GITHUB_TOKEN.")]
    RateLimited,
    #[error("GitHub did not respond in time")]
    Timeout,
    #[error("GitHub API error: {0}")]
    Api(String),
}

/// Light-weight commit representation that is independent of any HTTP or Discord types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub url: String,
    pub date: Option<DateTime<Utc>>,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

/// Read-only source of commit data.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<CommitSummary, GithubError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Web,
    App,
}

impl UpdateKind {
    pub fn label(self) -> &'static str {
        match self {
            UpdateKind::Web => "Website Update",
            UpdateKind::App => "App Update",
        }
    }
}

/// A finished update post. The Discord layer renders it as an embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNote {
    pub kind: UpdateKind,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub fields: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

/// Update typed by a staff member.
pub fn manual_update_note(kind: UpdateKind, message: &str, posted_by: &str) -> UpdateNote {
    UpdateNote {
        kind,
        title: kind.label().to_string(),
        description: message.trim().to_string(),
        url: None,
        fields: vec![("Posted by".to_string(), posted_by.to_string())],
        timestamp: Utc::now(),
    }
}

/// Update built from a commit: the first line becomes the title, the rest the body.
pub fn commit_update_note(
    kind: UpdateKind,
    owner: &str,
    repo: &str,
    branch: &str,
    commit: &CommitSummary,
) -> UpdateNote {
    let mut lines = commit.message.lines();
    let headline = lines.next().unwrap_or("").trim();
    let body: String = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    let mut description = if body.is_empty() {
        headline.to_string()
    } else {
        format!("**{}**\n\n{}", headline, body)
    };
    if description.chars().count() > MAX_BODY_CHARS {
        description = description.chars().take(MAX_BODY_CHARS).collect::<String>() + "…";
    }

    UpdateNote {
        kind,
        title: format!("{}: {}/{}", kind.label(), owner, repo),
        description,
        url: Some(commit.url.clone()),
        fields: vec![
            ("Branch".to_string(), branch.to_string()),
            ("Commit".to_string(), format!("`{}`", commit.short_sha())),
            ("Author".to_string(), commit.author.clone()),
        ],
        timestamp: commit.date.unwrap_or_else(Utc::now),
    }
}

/// Fetches the latest commit and turns it into an update note.
pub struct GithubService<C: CommitSource> {
    source: C,
}

impl<C: CommitSource> GithubService<C> {
    pub fn new(source: C) -> Self {
        Self { source }
    }

    pub async fn latest_update(
        &self,
        kind: UpdateKind,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<UpdateNote, GithubError> {
        let commit = self.source.latest_commit(owner, repo, branch).await?;
        tracing::info!(owner, repo, branch, sha = %commit.short_sha(), "Fetched latest commit");
        Ok(commit_update_note(kind, owner, repo, branch, &commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Option<CommitSummary>);

    #[async_trait]
    impl CommitSource for FixedSource {
        async fn latest_commit(
            &self,
            owner: &str,
            repo: &str,
            branch: &str,
        ) -> Result<CommitSummary, GithubError> {
            self.0
                .clone()
                .ok_or_else(|| GithubError::NotFound(format!("{}/{}@{}", owner, repo, branch)))
        }
    }

    fn commit(message: &str) -> CommitSummary {
        CommitSummary {
            sha: "0123456789abcdef".into(),
            message: message.into(),
            author: "octocat".into(),
            url: "https://github.com/o/r/commit/0123456".into(),
            date: None,
        }
    }

    #[test]
    fn test_commit_note_splits_headline() {
        let note = commit_update_note(
            UpdateKind::App,
            "o",
            "r",
            "main",
            &commit("Fix login\n\nToken refresh no longer loops."),
        );
        assert_eq!(note.title, "App Update: o/r");
        assert!(note.description.starts_with("**Fix login**"));
        assert!(note.description.ends_with("loops."));
        assert!(note.fields.contains(&("Commit".to_string(), "`0123456`".to_string())));
    }

    #[test]
    fn test_long_commit_body_is_truncated() {
        let note = commit_update_note(UpdateKind::Web, "o", "r", "main", &commit(&"x".repeat(5000)));
        assert_eq!(note.description.chars().count(), MAX_BODY_CHARS + 1);
    }

    #[test]
    fn test_short_sha_handles_short_input() {
        let mut c = commit("m");
        c.sha = "abc".into();
        assert_eq!(c.short_sha(), "abc");
    }

    #[tokio::test]
    async fn test_latest_update_propagates_not_found() {
        let service = GithubService::new(FixedSource(None));
        let err = service
            .latest_update(UpdateKind::App, "o", "missing", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, GithubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_update_builds_note() {
        let service = GithubService::new(FixedSource(Some(commit("Ship it"))));
        let note = service
            .latest_update(UpdateKind::App, "o", "r", "main")
            .await
            .unwrap();
        assert_eq!(note.description, "Ship it");
        assert_eq!(note.url.as_deref(), Some("https://github.com/o/r/commit/0123456"));
    }
}
