//! Issue tracker abstraction and the GitHub REST client.
//!
//! The GitHub token is read from `GITHUB_TOKEN` and only ever passed to
//! `bearer_auth()`. It is never logged or included in error messages.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use report_tracker_core::IssueRef;

use crate::config::GitHubConfig;

/// Operations the tracker needs from the external issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef>;

    async fn comment(&self, issue: &IssueRef, body: &str) -> Result<()>;

    async fn close(&self, issue: &IssueRef, comment: Option<&str>) -> Result<()>;

    async fn reopen(&self, issue: &IssueRef, comment: Option<&str>) -> Result<()>;

    /// Replace the issue's label set.
    async fn relabel(&self, issue: &IssueRef, labels: &[String]) -> Result<()>;

    async fn rename(&self, issue: &IssueRef, title: &str) -> Result<()>;

    async fn edit_body(&self, issue: &IssueRef, body: &str) -> Result<()>;
}

/// GitHub REST v3 client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct CreateIssue<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Deserialize)]
struct CreatedIssue {
    number: u64,
}

#[derive(Serialize)]
struct IssuePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Self {
        Self::with_token(config, std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn with_token(config: &GitHubConfig, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn issue_url(&self, issue: &IssueRef) -> String {
        format!("{}/repos/{}/issues/{}", self.base_url, issue.repo, issue.number)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        };
        request
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "report-tracker")
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            bail!("GitHub {} failed: {}", what, response.status());
        }
        Ok(response)
    }

    async fn patch(&self, issue: &IssueRef, patch: &IssuePatch<'_>, what: &str) -> Result<()> {
        self.send(self.client.patch(self.issue_url(issue)).json(patch), what)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef> {
        let url = format!("{}/repos/{}/issues", self.base_url, repo);
        let payload = CreateIssue { title, body, labels };
        let response = self
            .send(self.client.post(&url).json(&payload), "create issue")
            .await?;
        let created: CreatedIssue = response.json().await?;
        Ok(IssueRef::new(repo, created.number))
    }

    async fn comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        let url = format!("{}/comments", self.issue_url(issue));
        self.send(
            self.client
                .post(&url)
                .json(&serde_json::json!({ "body": body })),
            "comment",
        )
        .await?;
        Ok(())
    }

    async fn close(&self, issue: &IssueRef, comment: Option<&str>) -> Result<()> {
        if let Some(comment) = comment {
            self.comment(issue, comment).await?;
        }
        let patch = IssuePatch {
            title: None,
            body: None,
            state: Some("closed"),
        };
        self.patch(issue, &patch, "close").await
    }

    async fn reopen(&self, issue: &IssueRef, comment: Option<&str>) -> Result<()> {
        if let Some(comment) = comment {
            self.comment(issue, comment).await?;
        }
        let patch = IssuePatch {
            title: None,
            body: None,
            state: Some("open"),
        };
        self.patch(issue, &patch, "reopen").await
    }

    async fn relabel(&self, issue: &IssueRef, labels: &[String]) -> Result<()> {
        let url = format!("{}/labels", self.issue_url(issue));
        self.send(
            self.client
                .put(&url)
                .json(&serde_json::json!({ "labels": labels })),
            "relabel",
        )
        .await?;
        Ok(())
    }

    async fn rename(&self, issue: &IssueRef, title: &str) -> Result<()> {
        let patch = IssuePatch {
            title: Some(title),
            body: None,
            state: None,
        };
        self.patch(issue, &patch, "rename").await
    }

    async fn edit_body(&self, issue: &IssueRef, body: &str) -> Result<()> {
        let patch = IssuePatch {
            title: None,
            body: Some(body),
            state: None,
        };
        self.patch(issue, &patch, "edit body").await
    }
}
