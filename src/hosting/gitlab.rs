use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{collect_paged, status_error, transport_error, Enumerator, Platform, RepoRef, PAGE_SIZE};

pub struct GitLabEnumerator {
    client: Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path_with_namespace: String,
    http_url_to_repo: String,
}

impl GitLabEnumerator {
    pub fn new(client: Client, api_base: String, token: Option<String>) -> Self {
        GitLabEnumerator {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn fetch_page(&self, owner: &str, page: usize) -> Result<Vec<RepoRef>> {
        let url = format!(
            "{}/users/{}/projects?per_page={}&page={}",
            self.api_base, owner, PAGE_SIZE, page
        );

        let mut request = self.client.get(&url);

        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request
            .send()
            .map_err(|e| transport_error(Platform::GitLab, e))?;

        if !response.status().is_success() {
            return Err(status_error(Platform::GitLab, owner, response.status()));
        }

        let projects: Vec<GitLabProject> = response
            .json()
            .context("Failed to parse GitLab project listing")?;

        Ok(projects
            .into_iter()
            .map(|p| RepoRef {
                full_name: p.path_with_namespace,
                clone_url: p.http_url_to_repo,
                platform: Platform::GitLab,
            })
            .collect())
    }
}

impl Enumerator for GitLabEnumerator {
    fn platform(&self) -> Platform {
        Platform::GitLab
    }

    /// Walks `page`/`per_page` query parameters until a short page. Without
    /// a token the endpoint degrades to public projects only.
    fn list_user_repos(&self, owner: &str) -> Result<Vec<RepoRef>> {
        collect_paged(PAGE_SIZE, |page| self.fetch_page(owner, page))
    }
}
