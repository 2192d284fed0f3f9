use crate::error::{PodupError, Result};
use crate::index::podspec::{parse_podspec, parse_shard_listing, shard_listing_name, shard_path};
use crate::index::{IndexUpdate, SpecsTransport};
use crate::model::DeclaredConstraint;
use crate::specs::Version;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::io::Read;

pub(crate) const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Client for a CDN-hosted spec registry (the default public registry and
/// mirrors using the same layout).
pub struct CdnTransport {
    client: Client,
    base_url: String,
}

impl CdnTransport {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn listing_url(&self, pod: &str) -> String {
        format!("{}/{}", self.base_url, shard_listing_name(pod))
    }

    fn podspec_url(&self, pod: &str, version: &Version) -> String {
        format!(
            "{}/Specs/{}/{}/{}/{}.podspec.json",
            self.base_url,
            shard_path(pod),
            pod,
            version,
            pod
        )
    }
}

impl SpecsTransport for CdnTransport {
    fn registry(&self) -> &str {
        &self.base_url
    }

    fn check_for_update(&self, pod: &str, token: Option<&str>) -> Result<IndexUpdate> {
        let url = self.listing_url(pod);
        tracing::debug!("Fetching: {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(IF_NONE_MATCH, token);
        }

        let response = request
            .send()
            .map_err(|e| PodupError::unreachable(&self.base_url, e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(IndexUpdate::Unchanged),
            StatusCode::NOT_FOUND => return Ok(IndexUpdate::Unknown),
            status if !status.is_success() => {
                return Err(PodupError::unreachable(
                    &self.base_url,
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

        let length = response.content_length();
        let text = read_capped(response, length, MAX_BODY_BYTES, &self.base_url)?;

        Ok(match parse_shard_listing(&text, pod) {
            Some(versions) => IndexUpdate::Changed {
                versions,
                token: etag,
            },
            None => IndexUpdate::Unknown,
        })
    }

    fn declared_constraints(
        &self,
        pod: &str,
        version: &Version,
    ) -> Result<Vec<DeclaredConstraint>> {
        let url = self.podspec_url(pod, version);
        tracing::debug!("Fetching: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PodupError::unreachable(&self.base_url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!("No podspec published for {} {}", pod, version);
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(PodupError::unreachable(
                &self.base_url,
                format!("HTTP {} for {}", response.status(), url),
            ));
        }

        let length = response.content_length();
        let text = read_capped(response, length, MAX_BODY_BYTES, &self.base_url)?;
        parse_podspec(&text)
    }
}

/// Reads a response body of at most `limit` bytes. Oversized bodies are
/// refused before anything is read when the length is announced, and as soon
/// as the limit is crossed otherwise.
pub(crate) fn read_capped(
    body: impl Read,
    announced: Option<u64>,
    limit: usize,
    registry: &str,
) -> Result<String> {
    let too_large =
        || PodupError::unreachable(registry, format!("response exceeded {limit} bytes"));
    if announced.is_some_and(|len| len > limit as u64) {
        return Err(too_large());
    }

    let mut buffer = Vec::new();
    body.take(limit as u64 + 1)
        .read_to_end(&mut buffer)
        .map_err(|e| PodupError::unreachable(registry, e))?;
    if buffer.len() > limit {
        return Err(too_large());
    }

    String::from_utf8(buffer).map_err(|e| PodupError::unreachable(registry, e))
}
