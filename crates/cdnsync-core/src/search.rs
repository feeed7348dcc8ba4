use std::sync::Arc;

use cdnsync_dl::http_client::SHARED_AGENT;
use cdnsync_package::Package;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ureq::Agent;

use crate::error::{CoreError, CoreResult};

const GITHUB_API: &str = "https://api.github.com";

/// Upstream repository popularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    #[serde(rename = "stargazers_count")]
    pub stars: u64,
    #[serde(rename = "forks_count", alias = "forks")]
    pub forks: u64,
    #[serde(rename = "subscribers_count", default)]
    pub subscribers: u64,
}

/// Denormalized search document for one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchEntry {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<RepositoryStats>,
}

impl SearchEntry {
    pub fn build(package: &Package, sri: Option<String>, github: Option<RepositoryStats>) -> Self {
        Self {
            object_id: package.name.clone(),
            name: package.name.clone(),
            description: package.description.clone(),
            keywords: package.keywords.clone(),
            filename: package.filename.clone(),
            version: package.version.clone(),
            license: package.license.clone(),
            homepage: package.homepage.clone(),
            sri,
            github,
        }
    }
}

pub trait SearchIndex: Send + Sync {
    /// Creates or replaces the entry keyed by its object id.
    fn upsert(&self, entry: &SearchEntry) -> CoreResult<()>;
}

/// Used when search sync is not configured.
pub struct NullIndex;

impl SearchIndex for NullIndex {
    fn upsert(&self, entry: &SearchEntry) -> CoreResult<()> {
        debug!("search sync disabled, not indexing {}", entry.name);
        Ok(())
    }
}

pub struct AlgoliaIndex {
    agent: Agent,
    app_id: String,
    api_key: String,
    index: String,
}

impl AlgoliaIndex {
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            agent: SHARED_AGENT.clone(),
            app_id: app_id.into(),
            api_key: api_key.into(),
            index: index.into(),
        }
    }

    pub fn object_url(&self, object_id: &str) -> String {
        format!(
            "https://{}.algolia.net/1/indexes/{}/{}",
            self.app_id, self.index, object_id
        )
    }
}

impl SearchIndex for AlgoliaIndex {
    fn upsert(&self, entry: &SearchEntry) -> CoreResult<()> {
        let url = self.object_url(&entry.object_id);
        let resp = self
            .agent
            .put(&url)
            .header("X-Algolia-Application-Id", &self.app_id)
            .header("X-Algolia-API-Key", &self.api_key)
            .send_json(entry)
            .map_err(|err| CoreError::Search(err.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(CoreError::Search(format!("HTTP {status} from {url}")));
        }
        Ok(())
    }
}

pub struct GithubClient {
    agent: Agent,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            agent: SHARED_AGENT.clone(),
            api_url: GITHUB_API.to_string(),
            token,
        }
    }

    pub fn repository_stats(&self, owner: &str, repo: &str) -> CoreResult<RepositoryStats> {
        let url = format!("{}/repos/{owner}/{repo}", self.api_url);
        let mut req = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let mut resp = req
            .call()
            .map_err(|err| CoreError::Search(err.to_string()))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(CoreError::Search(format!("HTTP {status} from {url}")));
        }
        resp.body_mut()
            .read_json()
            .map_err(|err| CoreError::Search(format!("{url}: {err}")))
    }
}

/// Keeps the search index in step with package record changes.
///
/// Failures are logged and never propagated; the next successful package
/// update rewrites the entry.
pub struct SearchSync {
    index: Arc<dyn SearchIndex>,
    github: Option<GithubClient>,
}

impl SearchSync {
    pub fn new(index: Arc<dyn SearchIndex>, github: Option<GithubClient>) -> Self {
        Self { index, github }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NullIndex), None)
    }

    fn stats(&self, package: &Package) -> Option<RepositoryStats> {
        let github = self.github.as_ref()?;
        let (owner, repo) = package.repository.as_ref()?.github_slug()?;
        match github.repository_stats(&owner, &repo) {
            Ok(stats) => Some(stats),
            Err(err) => {
                warn!("{}: could not fetch repository stats: {err}", package.name);
                None
            }
        }
    }

    pub fn sync(&self, package: &Package, sri: Option<String>) {
        let entry = SearchEntry::build(package, sri, self.stats(package));
        match self.index.upsert(&entry) {
            Ok(()) => debug!("indexed {}", package.name),
            Err(err) => warn!("{}: search index update failed: {err}", package.name),
        }
    }
}
