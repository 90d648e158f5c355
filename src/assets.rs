//! Image asset resolution, caching, and embedding.
//!
//! Every image URL referenced by a topic resolves to either a file in the
//! shared `images/` directory or, when the fetch fails, the original remote
//! URL. The outcome is a tagged [`Resolution`] so callers (and tests) can
//! tell which path was taken. The cache guarantees at most one network fetch
//! per distinct URL per process, and an on-disk existence check makes the
//! fetch idempotent across runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use base64::Engine as _;
use regex::Regex;

use crate::client::ManualClient;

/// Extracts the `key` query parameter from an asset URL. Anchored on the
/// parameter delimiter so e.g. `donkey=` does not match.
static KEY_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]key=([^&]+)").expect("hardcoded key regex"));

/// Characters not allowed in a local image filename.
static UNSAFE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w.-]").expect("hardcoded filename regex"));

/// Strips a run of `../` segments from the front of a relative path.
static PARENT_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\.\./)+").expect("hardcoded parent prefix regex"));

/// How an image URL was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Path relative to the output directory, e.g. `images/icon_abc.svg`.
    Local(String),
    /// Fetch failed; the original remote URL is used as-is.
    Remote(String),
}

/// Derive a deterministic, filesystem-safe filename for an asset URL.
///
/// Uses the `key` query parameter when present, otherwise a blake3 hash of
/// the URL. The extension is inferred from URL substrings in priority order
/// svg > png > jpg/jpeg > gif, defaulting to png.
pub fn url_to_filename(url: &str) -> String {
    let mut filename = match KEY_PARAM_RE.captures(url) {
        Some(caps) => UNSAFE_FILENAME_RE.replace_all(&caps[1], "_").to_string(),
        None => blake3::hash(url.as_bytes()).to_hex().to_string(),
    };

    let lower = url.to_lowercase();
    let ext = if lower.contains(".svg") {
        ".svg"
    } else if lower.contains(".png") {
        ".png"
    } else if lower.contains(".jpg") || lower.contains(".jpeg") {
        ".jpg"
    } else if lower.contains(".gif") {
        ".gif"
    } else {
        ".png"
    };

    if !filename.ends_with(ext) {
        filename.push_str(ext);
    }
    filename
}

/// Map a remote asset URL back to its expected local path, for the HTML
/// assembly stage. Returns `None` when the URL carries no `key` parameter.
pub fn url_to_local_key(url: &str) -> Option<String> {
    let url = url.replace("&amp;", "&");
    let caps = KEY_PARAM_RE.captures(&url)?;
    let key = &caps[1];
    let mut filename = UNSAFE_FILENAME_RE.replace_all(key, "_").to_string();

    if key.to_lowercase().contains(".svg") || url.to_lowercase().contains(".svg") {
        if !filename.ends_with(".svg") {
            filename.push_str(".svg");
        }
    } else if ![".png", ".jpg", ".gif", ".svg"]
        .iter()
        .any(|ext| filename.ends_with(ext))
    {
        filename.push_str(".png");
    }
    Some(format!("images/{}", filename))
}

/// Read a local image and encode it as a base64 data URI.
///
/// `img_path` is relative to `output_dir` and may carry `../` prefixes from
/// per-topic Markdown. Returns `None` when the file does not exist, so the
/// caller can fall back to the remote URL.
pub fn embed_data_uri(output_dir: &Path, img_path: &str) -> Option<String> {
    let rel = PARENT_PREFIX_RE.replace(img_path, "");
    let full = output_dir.join(rel.as_ref());
    let bytes = std::fs::read(&full).ok()?;

    let ext = full
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "image/png",
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Some(format!("data:{};base64,{}", mime, encoded))
}

/// Process-wide image resolution cache.
pub struct ImageCache {
    entries: HashMap<String, Resolution>,
    images_dir: PathBuf,
    image_delay: Duration,
    fetched: usize,
}

impl ImageCache {
    pub fn new(images_dir: PathBuf, image_delay: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            images_dir,
            image_delay,
            fetched: 0,
        }
    }

    /// Number of actual network downloads performed.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Number of distinct URLs resolved (local or fallback).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an image URL to a local path or remote fallback.
    ///
    /// At most one fetch per URL per process; a file already on disk is
    /// reused without touching the network.
    pub fn resolve(&mut self, url: &str, client: &ManualClient) -> Resolution {
        if let Some(hit) = self.entries.get(url) {
            return hit.clone();
        }

        let filename = url_to_filename(url);
        let local_path = self.images_dir.join(&filename);
        let rel = format!("images/{}", filename);

        if local_path.exists() {
            let resolution = Resolution::Local(rel);
            self.entries.insert(url.to_string(), resolution.clone());
            return resolution;
        }

        let resolution = match client.fetch_bytes(url) {
            Ok(bytes) => match self.store(&local_path, &bytes) {
                Ok(()) => {
                    self.fetched += 1;
                    tracing::debug!(url, file = %local_path.display(), "Image downloaded");
                    if !self.image_delay.is_zero() {
                        std::thread::sleep(self.image_delay);
                    }
                    Resolution::Local(rel)
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, "Failed to write image, keeping remote URL");
                    Resolution::Remote(url.to_string())
                }
            },
            Err(e) => {
                tracing::warn!(url, error = %e, "Image fetch failed, keeping remote URL");
                Resolution::Remote(url.to_string())
            }
        };

        self.entries.insert(url.to_string(), resolution.clone());
        resolution
    }

    fn store(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.images_dir)?;
        std::fs::write(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> ManualClient {
        // Points nowhere; any fetch attempt errors immediately.
        ManualClient::new("http://127.0.0.1:1", "nl_NL", "SESSION=x".to_string()).unwrap()
    }

    #[test]
    fn test_filename_from_key_param() {
        let url = "https://cdn.example/api/image?key=ABC.svg&size=large";
        assert_eq!(url_to_filename(url), "ABC.svg");
    }

    #[test]
    fn test_filename_sanitizes_key() {
        let url = "https://cdn.example/image?key=a/b c.png";
        assert_eq!(url_to_filename(url), "a_b_c.png");
    }

    #[test]
    fn test_key_must_be_a_whole_parameter_name() {
        // `donkey=5` is not a `key=` parameter; both derivations agree.
        let url = "https://cdn.example/image?donkey=5";
        assert_ne!(url_to_filename(url), "5.png");
        assert_eq!(url_to_local_key(url), None);

        // A real `key=` still matches after `&`.
        let url = "https://cdn.example/image?size=2&key=pic.png";
        assert_eq!(url_to_filename(url), "pic.png");
    }

    #[test]
    fn test_filename_hash_fallback_is_deterministic() {
        let url = "https://cdn.example/image/123.jpg";
        let a = url_to_filename(url);
        let b = url_to_filename(url);
        assert_eq!(a, b);
        assert!(a.ends_with(".jpg"));
        // No key param: the stem is a hash, not taken from the URL path.
        assert!(!a.contains("123"));
    }

    #[test]
    fn test_extension_priority_svg_over_png() {
        let url = "https://cdn.example/icon.svg?fallback=.png";
        assert!(url_to_filename(url).ends_with(".svg"));
    }

    #[test]
    fn test_default_extension_png() {
        let url = "https://cdn.example/image?key=noext";
        assert_eq!(url_to_filename(url), "noext.png");
    }

    #[test]
    fn test_local_key_unescapes_entities() {
        let url = "https://cdn.example/image?size=2&amp;key=pic.png";
        assert_eq!(url_to_local_key(url).as_deref(), Some("images/pic.png"));
    }

    #[test]
    fn test_local_key_svg_inference_from_url() {
        let url = "https://cdn.example/render.svg?key=icon_a";
        assert_eq!(url_to_local_key(url).as_deref(), Some("images/icon_a.svg"));
    }

    #[test]
    fn test_local_key_none_without_key_param() {
        assert_eq!(url_to_local_key("https://cdn.example/raw.png"), None);
    }

    #[test]
    fn test_resolve_existing_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.png"), b"png").unwrap();

        let mut cache = ImageCache::new(images, Duration::ZERO);
        // The offline client would error if any fetch were attempted.
        let got = cache.resolve("https://x.invalid/img?key=a.png", &offline_client());
        assert_eq!(got, Resolution::Local("images/a.png".to_string()));
        assert_eq!(cache.fetched(), 0);
    }

    #[test]
    fn test_resolve_failure_caches_remote_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path().join("images"), Duration::ZERO);
        let client = offline_client();

        let url = "http://127.0.0.1:1/img?key=b.png";
        let first = cache.resolve(url, &client);
        assert_eq!(first, Resolution::Remote(url.to_string()));
        // Second call is a cache hit, same answer.
        let second = cache.resolve(url, &client);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.fetched(), 0);
    }

    #[test]
    fn test_embed_data_uri_mime_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("i.svg"), b"<svg/>").unwrap();

        let uri = embed_data_uri(dir.path(), "images/i.svg").unwrap();
        assert!(uri.starts_with("data:image/svg+xml;base64,"));

        // ../ prefixes from per-topic Markdown are stripped.
        let uri2 = embed_data_uri(dir.path(), "../../images/i.svg").unwrap();
        assert_eq!(uri, uri2);

        assert!(embed_data_uri(dir.path(), "images/missing.png").is_none());
    }
}
