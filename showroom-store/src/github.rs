//! Content store backed by the GitHub contents API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/repos/{owner}/{repo}/contents/{path}?ref={branch}` | Fetch blob + `sha` |
//! | PUT    | `/repos/{owner}/{repo}/contents/{path}` | Write blob (`sha` required when replacing) |
//! | GET    | `/repos/{owner}/{repo}/commits?since=…&per_page=…` | Recent history |
//!
//! File content travels base64-encoded in both directions. GitHub answers a
//! stale `sha` with 409 (or 422 "sha wasn't supplied" when it was omitted);
//! both map to [`StoreError::Conflict`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, StatusCode, Url};
use serde::{Deserialize, Serialize};

use showroom_core::{CommitRecord, ContentPath, Credentials, VersionToken};

use crate::error::{transport, StoreError};
use crate::{ContentStore, PutRequest, StoredFile};

/// Media type that makes the contents endpoint answer with the file itself.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

// -- Wire types ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

// -- Client -------------------------------------------------------------------

/// Client for one repository branch.
#[derive(Debug, Clone)]
pub struct GitHubStore {
    http: reqwest::Client,
    base: Url,
    owner: String,
    repo: String,
    branch: String,
}

impl GitHubStore {
    /// Build a client. Fails without a network call if any field is blank.
    pub fn new(
        api_url: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<Self, StoreError> {
        for (field, value) in [("owner", owner), ("repo", repo), ("branch", branch)] {
            if value.trim().is_empty() {
                return Err(StoreError::Validation(format!("store {field} is empty")));
            }
        }
        if credentials.token().trim().is_empty() {
            return Err(StoreError::Validation("store token is empty".to_string()));
        }
        let base = Url::parse(api_url)
            .map_err(|e| StoreError::Validation(format!("invalid api url '{api_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Validation(format!(
                "invalid api url '{api_url}'"
            )));
        }

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", credentials.token()))
            .map_err(|_| StoreError::Validation("store token is not a valid header".into()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("showroom/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(transport("client_init"))?;

        Ok(Self {
            http,
            base,
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            branch: branch.to_owned(),
        })
    }

    fn repo_url<'s>(&self, tail: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str()])
                .extend(tail);
        }
        url
    }

    fn contents_url(&self, path: &ContentPath) -> Url {
        let segments = path.as_str().split('/').filter(|s| !s.is_empty());
        self.repo_url(std::iter::once("contents").chain(segments))
    }

    fn branch_contents_url(&self, path: &ContentPath) -> Url {
        let mut url = self.contents_url(path);
        url.query_pairs_mut().append_pair("ref", &self.branch);
        url
    }

    /// Contents metadata of `path`; `None` on 404.
    async fn get_contents(
        &self,
        path: &ContentPath,
        endpoint: &str,
    ) -> Result<Option<ContentsResponse>, StoreError> {
        tracing::debug!(path = %path, "fetching content");
        let resp = self
            .http
            .get(self.branch_contents_url(path))
            .send()
            .await
            .map_err(transport(endpoint))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(endpoint.to_string(), None, resp).await);
        }
        let body = resp.json().await.map_err(|e| StoreError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(body))
    }

    /// Raw bytes of `path` through the raw media type (up to 100 MB).
    async fn get_raw(&self, path: &ContentPath, endpoint: &str) -> Result<Vec<u8>, StoreError> {
        tracing::debug!(path = %path, "fetching raw content");
        let resp = self
            .http
            .get(self.branch_contents_url(path))
            .header(header::ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(transport(endpoint))?;
        if !resp.status().is_success() {
            return Err(error_from_response(endpoint.to_string(), None, resp).await);
        }
        let bytes = resp.bytes().await.map_err(transport(endpoint))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ContentStore for GitHubStore {
    async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
        let endpoint = format!("GET contents/{path}");
        let Some(body) = self.get_contents(path, &endpoint).await? else {
            return Ok(None);
        };

        let bytes = match body.encoding.as_deref() {
            None | Some("base64") => {
                let compact: String =
                    body.content.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD.decode(compact).map_err(|e| StoreError::Decode {
                    endpoint,
                    reason: format!("invalid base64 content: {e}"),
                })?
            }
            // Files over 1 MB come back without inline content.
            Some("none") => self.get_raw(path, &endpoint).await?,
            Some(other) => {
                return Err(StoreError::Decode {
                    endpoint,
                    reason: format!("unsupported content encoding '{other}'"),
                })
            }
        };

        Ok(Some(StoredFile {
            version: VersionToken::from(body.sha),
            bytes,
        }))
    }

    async fn version(&self, path: &ContentPath) -> Result<Option<VersionToken>, StoreError> {
        let endpoint = format!("GET contents/{path}");
        let body = self.get_contents(path, &endpoint).await?;
        Ok(body.map(|body| VersionToken::from(body.sha)))
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
        let endpoint = format!("PUT contents/{}", request.path);
        let body = PutContentsBody {
            message: request.message,
            content: STANDARD.encode(request.bytes),
            sha: request.version.map(|v| v.0.as_str()),
            branch: &self.branch,
        };

        tracing::debug!(
            path = %request.path,
            bytes = request.bytes.len(),
            replacing = request.version.is_some(),
            "writing content",
        );
        let resp = self
            .http
            .put(self.contents_url(request.path))
            .json(&body)
            .send()
            .await
            .map_err(transport(endpoint.clone()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(endpoint, Some(request.path), resp).await);
        }

        let written: PutContentsResponse = resp.json().await.map_err(|e| StoreError::Decode {
            endpoint,
            reason: e.to_string(),
        })?;
        Ok(VersionToken::from(written.content.sha))
    }

    async fn recent_commits(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        let endpoint = "GET commits".to_string();
        let mut url = self.repo_url(["commits"]);
        url.query_pairs_mut()
            .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("per_page", &limit.to_string())
            .append_pair("sha", &self.branch);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(transport(endpoint.clone()))?;
        if !resp.status().is_success() {
            return Err(error_from_response(endpoint, None, resp).await);
        }

        let entries: Vec<CommitEntry> = resp.json().await.map_err(|e| StoreError::Decode {
            endpoint,
            reason: e.to_string(),
        })?;
        let mut records: Vec<CommitRecord> = entries
            .into_iter()
            .filter_map(|entry| {
                let author = entry.commit.author?;
                Some(CommitRecord {
                    author_timestamp: author.date,
                    message: entry.commit.message,
                })
            })
            .collect();
        records.sort_by(|a, b| b.author_timestamp.cmp(&a.author_timestamp));
        records.truncate(limit);
        Ok(records)
    }
}

/// Turn a non-2xx response into a [`StoreError`], keeping GitHub's `message`.
async fn error_from_response(
    endpoint: String,
    path: Option<&ContentPath>,
    resp: reqwest::Response,
) -> StoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiMessage>(&body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    let stale_sha = status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("sha"));
    match path {
        Some(path) if stale_sha => StoreError::Conflict {
            path: path.to_string(),
            message,
        },
        _ => StoreError::Api {
            endpoint,
            status: status.as_u16(),
            message,
        },
    }
}
