use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{LINK, USER_AGENT};
use serde::Deserialize;

use super::{collect_linked, status_error, transport_error, Enumerator, Platform, RepoRef, PAGE_SIZE};

pub struct GitHubEnumerator {
    client: Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
}

impl GitHubEnumerator {
    pub fn new(client: Client, api_base: String, token: Option<String>) -> Self {
        GitHubEnumerator {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn fetch_page(&self, owner: &str, url: &str) -> Result<(Vec<RepoRef>, Option<String>)> {
        let mut request = self.client.get(url).header(USER_AGENT, "vaultsync");

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| transport_error(Platform::GitHub, e))?;

        if !response.status().is_success() {
            return Err(status_error(Platform::GitHub, owner, response.status()));
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);

        let page: Vec<GitHubRepo> = response
            .json()
            .context("Failed to parse GitHub repository listing")?;

        let refs = page
            .into_iter()
            .map(|r| RepoRef {
                full_name: r.full_name,
                clone_url: r.clone_url,
                platform: Platform::GitHub,
            })
            .collect();

        Ok((refs, next))
    }
}

impl Enumerator for GitHubEnumerator {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    /// Follows the `Link: rel="next"` header until the last page. Without a
    /// token the endpoint degrades to public repositories and tighter rate
    /// limits.
    fn list_user_repos(&self, owner: &str) -> Result<Vec<RepoRef>> {
        let first = format!(
            "{}/users/{}/repos?per_page={}",
            self.api_base, owner, PAGE_SIZE
        );

        collect_linked(first, |url| self.fetch_page(owner, url))
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut sections = part.split(';');
        let url = sections.next()?.trim();
        let is_next = sections.any(|s| s.trim() == "rel=\"next\"");

        if is_next {
            return Some(url.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }
    None
}
