/// Hosting platform repository enumeration
///
/// Two providers with different pagination mechanics (GitHub follows the
/// `Link` header, GitLab walks `page`/`per_page` query parameters) behind
/// one output contract: a flat list of `RepoRef`s.
mod github;
mod gitlab;

pub use github::GitHubEnumerator;
pub use gitlab::GitLabEnumerator;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use std::fmt;
use std::time::Duration;

use crate::cfg::Config;
use crate::creds::Credential;
use crate::errors::SyncError;

/// Fixed page size for listing endpoints
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    GitHub,
    GitLab,
}

impl Platform {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "github" | "gh" => Ok(Platform::GitHub),
            "gitlab" | "gl" => Ok(Platform::GitLab),
            _ => bail!("Unknown platform: {}", s),
        }
    }

    /// Token environment variables in precedence order: primary name first,
    /// legacy alias second.
    pub fn token_env_vars(&self) -> [&'static str; 2] {
        match self {
            Platform::GitHub => ["GITHUB_TOKEN", "GH_TOKEN"],
            Platform::GitLab => ["GITLAB_TOKEN", "GL_TOKEN"],
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Platform::GitHub => "https://api.github.com",
            Platform::GitLab => "https://gitlab.com/api/v4",
        }
    }

    pub fn host(&self) -> &'static str {
        match self {
            Platform::GitHub => "github.com",
            Platform::GitLab => "gitlab.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::GitHub => write!(f, "github"),
            Platform::GitLab => write!(f, "gitlab"),
        }
    }
}

/// One repository as reported by a platform listing endpoint. The clone URL
/// never embeds a credential; injection happens at the point of use only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub full_name: String,
    pub clone_url: String,
    pub platform: Platform,
}

pub trait Enumerator {
    fn platform(&self) -> Platform;

    /// List a user's repositories. Finite, re-queried from the first page on
    /// every call.
    fn list_user_repos(&self, owner: &str) -> Result<Vec<RepoRef>>;
}

pub fn enumerator_for(
    platform: Platform,
    config: &Config,
    token: Option<&Credential>,
) -> Result<Box<dyn Enumerator>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.general.timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    let token = token.map(|c| c.expose().to_string());

    Ok(match platform {
        Platform::GitHub => {
            let base = config
                .github
                .api_base
                .clone()
                .unwrap_or_else(|| platform.default_api_base().to_string());
            Box::new(GitHubEnumerator::new(client, base, token))
        }
        Platform::GitLab => {
            let base = config
                .gitlab
                .api_base
                .clone()
                .unwrap_or_else(|| platform.default_api_base().to_string());
            Box::new(GitLabEnumerator::new(client, base, token))
        }
    })
}

/// Page-number pagination: fetch pages starting at 1 until a page comes back
/// with fewer items than `per_page`.
pub(crate) fn collect_paged<F>(per_page: usize, mut fetch: F) -> Result<Vec<RepoRef>>
where
    F: FnMut(usize) -> Result<Vec<RepoRef>>,
{
    let mut repos = Vec::new();
    let mut page = 1;

    loop {
        let batch = fetch(page)?;
        let len = batch.len();
        repos.extend(batch);

        if len < per_page {
            break;
        }
        page += 1;
    }

    Ok(repos)
}

/// Link-header pagination: follow `rel="next"` URLs until a page has none.
pub(crate) fn collect_linked<F>(first_url: String, mut fetch: F) -> Result<Vec<RepoRef>>
where
    F: FnMut(&str) -> Result<(Vec<RepoRef>, Option<String>)>,
{
    let mut repos = Vec::new();
    let mut next = Some(first_url);

    while let Some(url) = next {
        let (batch, link_next) = fetch(&url)?;
        repos.extend(batch);
        next = link_next;
    }

    Ok(repos)
}

/// Map a transport-level reqwest failure onto the taxonomy; timeouts and
/// connection errors are indistinguishable from an unreachable upstream.
pub(crate) fn transport_error(platform: Platform, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() || err.is_connect() {
        SyncError::UpstreamUnavailable(format!("{} API unreachable: {}", platform, err)).into()
    } else {
        anyhow::Error::new(err)
    }
}

/// Map a non-success HTTP status onto the taxonomy.
pub(crate) fn status_error(
    platform: Platform,
    owner: &str,
    status: reqwest::StatusCode,
) -> anyhow::Error {
    match status.as_u16() {
        401 | 403 => {
            SyncError::NotAuthenticated(format!("{} API rejected the request: {}", platform, status))
                .into()
        }
        404 => SyncError::NotFound(format!("{} user '{}'", platform, owner)).into(),
        _ => SyncError::UpstreamUnavailable(format!("{} API returned {}", platform, status)).into(),
    }
}
