//! Authenticated HTTP client for the manual content API.
//!
//! The API is a pair of JSON GET endpoints (topic tree, per-topic content)
//! plus plain binary GETs for images. Authentication is a pre-captured
//! cookie string loaded from a local file; the session cannot be established
//! programmatically, so a missing cookies file is a fatal setup error.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

/// Browser-like User-Agent; the API refuses default library agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the manual API, split so callers can tell a dead session
/// from a transient per-topic failure.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The session cookie was rejected; every later request fails the same
    /// way, so the run should stop rather than continue.
    #[error("session rejected ({0}); capture a fresh cookie")]
    Auth(StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected topic response shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Topic tree response: a forest of nested nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicTree {
    #[serde(default)]
    pub trees: Vec<TopicNode>,
}

/// One node in the topic tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicNode {
    #[serde(default)]
    pub label: String,
    /// Content key for the topic endpoint. Absent on category headers.
    #[serde(default)]
    pub link_target: Option<String>,
    #[serde(default)]
    pub children: Vec<TopicNode>,
}

/// Typed view of a topic content response. The full JSON body is kept
/// separately for the on-disk `raw.json` mirror.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_html: String,
}

/// Load the cookie string from a file captured out of a browser session.
pub fn load_cookies(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cookies file not found: {}", path.display()))?;
    let cookie = raw.trim().to_string();
    if cookie.is_empty() {
        anyhow::bail!("Cookies file is empty: {}", path.display());
    }
    Ok(cookie)
}

/// Blocking client for the manual API. Sequential by design: one request at
/// a time, with politeness sleeps handled by the caller.
pub struct ManualClient {
    http: reqwest::blocking::Client,
    base_url: String,
    language: String,
    cookie: String,
}

impl ManualClient {
    pub fn new(base_url: &str, language: &str, cookie: String) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
            cookie,
        })
    }

    /// Fetch the topic tree rooted at `root_id`.
    pub fn fetch_topic_tree(&self, root_id: &str) -> Result<TopicTree, ClientError> {
        let _span = tracing::info_span!("fetch_topic_tree", root = root_id).entered();
        let url = format!("{}/api/vw-topic/V1/topic", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("key", root_id),
                ("displaytype", "desktop"),
                ("language", &self.language),
            ])
            .header("Accept", "application/json")
            .header("Cookie", &self.cookie)
            .send()?;
        let resp = Self::check_session(resp)?;
        let tree: TopicTree = resp.json()?;
        tracing::info!(roots = tree.trees.len(), "Fetched topic tree");
        Ok(tree)
    }

    /// Fetch one topic's content. Returns the typed view plus the raw JSON
    /// body for mirroring to disk.
    pub fn fetch_topic_content(
        &self,
        topic_id: &str,
    ) -> Result<(TopicContent, serde_json::Value), ClientError> {
        let _span = tracing::debug_span!("fetch_topic_content", topic = topic_id).entered();
        let url = format!("{}/api/web/V6/topic", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("key", topic_id),
                ("displaytype", "topic"),
                ("language", &self.language),
                ("query", "undefined"),
            ])
            .header("Accept", "application/json")
            .header("Cookie", &self.cookie)
            .send()?;
        let resp = Self::check_session(resp)?;
        let raw: serde_json::Value = resp.json()?;
        let content: TopicContent = serde_json::from_value(raw.clone())?;
        Ok((content, raw))
    }

    /// Fetch raw bytes from an absolute URL (images), with the same cookie
    /// session as the JSON endpoints.
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let resp = self.http.get(url).header("Cookie", &self.cookie).send()?;
        let resp = Self::check_session(resp)?;
        let bytes = resp.bytes()?;
        Ok(bytes.to_vec())
    }

    fn check_session(
        resp: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ClientError::Auth(resp.status()))
            }
            _ => Ok(resp.error_for_status()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_cookies_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cookies(&dir.path().join("cookies.txt")).unwrap_err();
        assert!(err.to_string().contains("Cookies file not found"));
    }

    #[test]
    fn test_load_cookies_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "SESSION=abc123\n").unwrap();
        assert_eq!(load_cookies(&path).unwrap(), "SESSION=abc123");
    }

    #[test]
    fn test_load_cookies_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "  \n").unwrap();
        assert!(load_cookies(&path).is_err());
    }

    #[test]
    fn test_auth_error_points_at_the_cookie() {
        let err = ClientError::Auth(StatusCode::UNAUTHORIZED);
        assert!(err.to_string().contains("capture a fresh cookie"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_topic_node_deserializes_camel_case() {
        let node: TopicNode = serde_json::from_str(
            r#"{"label": "Brakes", "linkTarget": "abc", "children": []}"#,
        )
        .unwrap();
        assert_eq!(node.label, "Brakes");
        assert_eq!(node.link_target.as_deref(), Some("abc"));
    }

    #[test]
    fn test_topic_content_tolerates_extra_fields() {
        let content: TopicContent = serde_json::from_str(
            r#"{"title": "T", "bodyHtml": "<p>x</p>", "breadcrumbs": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(content.title, "T");
        assert_eq!(content.body_html, "<p>x</p>");
    }
}
