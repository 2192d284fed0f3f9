use crate::error::{PodupError, Result};
use crate::index::cdn::{MAX_BODY_BYTES, read_capped};
use crate::index::podspec::{parse_podspec, shard_path};
use crate::index::{IndexUpdate, SpecsTransport};
use crate::model::DeclaredConstraint;
use crate::specs::Version;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH};
use serde::Deserialize;
use url::Url;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const DEFAULT_BRANCH: &str = "master";

/// Client for a spec repository hosted on GitHub, e.g.
/// `https://github.com/dependabot/Specs.git`.
///
/// Both the sharded `Specs/a/b/c/Name` layout and the flat `Name` layout
/// used by most private spec repos are understood.
pub struct GitHubSpecsTransport {
    client: Client,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    registry: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl GitHubSpecsTransport {
    pub fn new(client: Client, url: &Url, token: Option<String>) -> Result<Self> {
        let (owner, repo) = parse_repository(url).ok_or_else(|| {
            PodupError::Config(format!("Not a GitHub repository URL: {url}"))
        })?;

        Ok(Self {
            client,
            registry: format!("https://github.com/{owner}/{repo}"),
            owner,
            repo,
            branch: DEFAULT_BRANCH.to_string(),
            token,
        })
    }

    fn pod_paths(pod: &str) -> [String; 2] {
        [format!("Specs/{}/{}", shard_path(pod), pod), pod.to_string()]
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            API_BASE, self.owner, self.repo, path, self.branch
        )
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE, self.owner, self.repo, self.branch, path
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl SpecsTransport for GitHubSpecsTransport {
    fn registry(&self) -> &str {
        &self.registry
    }

    fn check_for_update(&self, pod: &str, token: Option<&str>) -> Result<IndexUpdate> {
        for path in Self::pod_paths(pod) {
            let url = self.contents_url(&path);
            tracing::debug!("Fetching: {}", url);

            let mut request = self
                .authorize(self.client.get(&url))
                .header(ACCEPT, "application/vnd.github+json");
            if let Some(token) = token {
                request = request.header(IF_NONE_MATCH, token);
            }

            let response = request
                .send()
                .map_err(|e| PodupError::unreachable(&self.registry, e))?;

            match response.status() {
                StatusCode::NOT_MODIFIED => return Ok(IndexUpdate::Unchanged),
                StatusCode::NOT_FOUND => continue,
                status if !status.is_success() => {
                    return Err(PodupError::unreachable(
                        &self.registry,
                        format!("HTTP {status} for {url}"),
                    ));
                }
                _ => {}
            }

            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let items: Vec<ContentItem> = response
                .json()
                .map_err(|e| PodupError::unreachable(&self.registry, e))?;

            return Ok(IndexUpdate::Changed {
                versions: version_directories(items),
                token: etag,
            });
        }

        Ok(IndexUpdate::Unknown)
    }

    fn declared_constraints(
        &self,
        pod: &str,
        version: &Version,
    ) -> Result<Vec<DeclaredConstraint>> {
        for path in Self::pod_paths(pod) {
            let url = self.raw_url(&format!("{path}/{version}/{pod}.podspec.json"));
            tracing::debug!("Fetching: {}", url);

            let response = self
                .authorize(self.client.get(&url))
                .send()
                .map_err(|e| PodupError::unreachable(&self.registry, e))?;

            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            if !response.status().is_success() {
                return Err(PodupError::unreachable(
                    &self.registry,
                    format!("HTTP {} for {}", response.status(), url),
                ));
            }

            let length = response.content_length();
            let text = read_capped(response, length, MAX_BODY_BYTES, &self.registry)?;
            return parse_podspec(&text);
        }

        tracing::warn!("No podspec published for {} {} in {}", pod, version, self.registry);
        Ok(Vec::new())
    }
}

fn version_directories(items: Vec<ContentItem>) -> Vec<String> {
    items
        .into_iter()
        .filter(|item| item.kind == "dir")
        .map(|item| item.name)
        .collect()
}

/// `(owner, repo)` from `https://github.com/owner/repo(.git)`
fn parse_repository(url: &Url) -> Option<(String, String)> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo).to_string();
    Some((owner, repo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(url: &str) -> GitHubSpecsTransport {
        GitHubSpecsTransport::new(Client::new(), &Url::parse(url).unwrap(), None).unwrap()
    }

    #[test]
    fn parses_owner_and_repo() {
        let github = transport("https://github.com/dependabot/Specs.git");
        assert_eq!(github.registry(), "https://github.com/dependabot/Specs");
        assert_eq!(
            github.contents_url("Alamofire"),
            "https://api.github.com/repos/dependabot/Specs/contents/Alamofire?ref=master"
        );
        assert_eq!(
            github.raw_url("Alamofire/4.3.0/Alamofire.podspec.json"),
            "https://raw.githubusercontent.com/dependabot/Specs/master/Alamofire/4.3.0/Alamofire.podspec.json"
        );
    }

    #[test]
    fn rejects_url_without_repository() {
        let url = Url::parse("https://github.com/dependabot").unwrap();
        assert!(GitHubSpecsTransport::new(Client::new(), &url, None).is_err());
    }

    #[test]
    fn tries_sharded_layout_first() {
        let paths = GitHubSpecsTransport::pod_paths("Alamofire");
        assert_eq!(paths[0], "Specs/d/a/2/Alamofire");
        assert_eq!(paths[1], "Alamofire");
    }

    #[test]
    fn keeps_only_directories() {
        let items: Vec<ContentItem> = serde_json::from_str(
            r#"[
                {"name": "3.0.0", "type": "dir"},
                {"name": "4.3.0", "type": "dir"},
                {"name": "README.md", "type": "file"}
            ]"#,
        )
        .unwrap();
        assert_eq!(version_directories(items), vec!["3.0.0", "4.3.0"]);
    }
}
