//! Mirror orchestration: download-all, combine, and HTML assembly flows.
//!
//! Everything here is sequential and synchronous. Per-topic failures are
//! counted and logged but never stop the run; the `--resume N` offset is the
//! recovery path, re-running the identical deterministic extraction and
//! skipping already-visited indices. Politeness throttling is a fixed sleep
//! between network calls.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use colored::Colorize;
use regex::Regex;

use crate::assemble;
use crate::assets::{ImageCache, Resolution};
use crate::client::{load_cookies, ClientError, ManualClient};
use crate::config::Config;
use crate::markdown;
use crate::tree::{self, TopicRecord};

/// Rewrites per-topic relative image paths to be root-relative for the
/// combined Markdown file.
static REL_IMAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.\./)+images/").expect("hardcoded rel-images regex"));

/// Markdown anchors use underscores for spaces and drop punctuation.
static MD_ANCHOR_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("hardcoded anchor regex"));
static MD_ANCHOR_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("hardcoded anchor ws regex"));

/// Outcome counters for a download run.
#[derive(Debug, Default)]
pub struct MirrorSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub categories: usize,
    pub images_fetched: usize,
}

/// Download the whole manual: topic tree, per-topic Markdown + raw JSON,
/// and every referenced image.
pub fn download(cfg: &Config, resume_from: usize) -> Result<MirrorSummary> {
    let _span = tracing::info_span!("download", resume_from).entered();

    let output_dir = cfg.output_dir();
    let images_dir = cfg.images_dir();
    std::fs::create_dir_all(&images_dir)
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;

    // Missing credentials abort before any work.
    let cookie = load_cookies(&cfg.cookies_file())?;
    let client = ManualClient::new(cfg.base_url(), cfg.language(), cookie)?;

    let root = cfg.root_topic.as_deref().context(
        "root_topic is not set (add it to .manual-mirror.toml or pass --root)",
    )?;
    let tree_data = client.fetch_topic_tree(root)?;
    let records = tree::extract_topics(&tree_data);

    let index_path = output_dir.join("index.json");
    std::fs::write(
        &index_path,
        serde_json::to_string_pretty(&records).context("Failed to serialize topic index")?,
    )
    .with_context(|| format!("Failed to write {}", index_path.display()))?;

    if !cfg.quiet() {
        println!("Found {} topics", records.len());
        println!("Saved topic index to {}", index_path.display());
        if resume_from > 0 {
            println!("Resuming from topic {}", resume_from);
        }
    }

    let mut cache = ImageCache::new(images_dir, cfg.image_delay());
    let mut summary = MirrorSummary {
        total: records.len(),
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        if i < resume_from {
            continue;
        }

        if !cfg.quiet() {
            let label: String = record.label.chars().take(40).collect();
            print!("[{}/{}] {} ", i + 1, records.len(), label);
            let _ = std::io::stdout().flush();
        }

        if record.is_category {
            summary.categories += 1;
            if !cfg.quiet() {
                println!("{}", "(category)".dimmed());
            }
            continue;
        }

        match mirror_topic(record, &client, &mut cache, &output_dir, cfg.verbose()) {
            Ok(new_images) => {
                summary.succeeded += 1;
                if !cfg.quiet() {
                    if new_images > 0 {
                        println!("{} (+{} imgs)", "ok".green(), new_images);
                    } else {
                        println!("{}", "ok".green());
                    }
                }
            }
            Err(e) => {
                if !cfg.quiet() {
                    println!("{}: {:#}", "error".red(), e);
                }
                // A rejected session fails every remaining topic identically.
                if matches!(e.downcast_ref::<ClientError>(), Some(ClientError::Auth(_))) {
                    return Err(e);
                }
                summary.failed += 1;
                tracing::warn!(index = i, label = %record.label, error = %e, "Topic failed");
            }
        }

        std::thread::sleep(cfg.topic_delay());
    }

    summary.images_fetched = cache.fetched();
    if !cfg.quiet() {
        println!();
        println!(
            "Topics: {} ok, {} errors, {} categories",
            summary.succeeded.to_string().green(),
            summary.failed.to_string().red(),
            summary.categories
        );
        println!("Images downloaded: {}", summary.images_fetched);
        println!("Output: {}", output_dir.display());
    }
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        images = summary.images_fetched,
        "Download complete"
    );
    Ok(summary)
}

/// Fetch, render, and persist one content topic. Returns the number of
/// images newly downloaded for it.
fn mirror_topic(
    record: &TopicRecord,
    client: &ManualClient,
    cache: &mut ImageCache,
    output_dir: &Path,
    verbose: bool,
) -> Result<usize> {
    let id = record
        .id
        .as_deref()
        .context("content topic without a content key")?;
    let (content, raw) = client.fetch_topic_content(id)?;

    let linearized = markdown::linearize(&content.body_html);
    let fetched_before = cache.fetched();

    let resolutions: Vec<(String, Resolution)> = linearized
        .images
        .iter()
        .map(|url| (url.clone(), cache.resolve(url, client)))
        .collect();
    if verbose {
        for (url, resolution) in &resolutions {
            match resolution {
                Resolution::Local(rel) => println!("\n  {} -> {}", url, rel),
                Resolution::Remote(_) => println!("\n  {} {}", url, "(remote fallback)".yellow()),
            }
        }
    }

    let body = markdown::substitute_images(&linearized.markdown, record.depth(), &resolutions);
    let title = if content.title.is_empty() {
        record.label.as_str()
    } else {
        content.title.as_str()
    };

    let topic_dir = output_dir.join(&record.path);
    std::fs::create_dir_all(&topic_dir)
        .with_context(|| format!("Failed to create {}", topic_dir.display()))?;
    std::fs::write(
        topic_dir.join("content.md"),
        format!("# {}\n\n{}", title, body),
    )
    .context("Failed to write content.md")?;
    std::fs::write(
        topic_dir.join("raw.json"),
        serde_json::to_string_pretty(&raw).context("Failed to serialize raw topic JSON")?,
    )
    .context("Failed to write raw.json")?;

    Ok(cache.fetched() - fetched_before)
}

/// Regenerate the combined Markdown file from already-downloaded topics.
pub fn combine(cfg: &Config) -> Result<PathBuf> {
    let _span = tracing::info_span!("combine").entered();

    let output_dir = cfg.output_dir();
    let records = load_index(&output_dir)?;

    let mut out = format!("# {}\n\n## {}\n\n", cfg.title(), cfg.toc_title());
    for record in &records {
        let indent = "  ".repeat(record.depth());
        out.push_str(&format!(
            "{}- [{}](#{})\n",
            indent,
            record.label,
            md_anchor(&record.label)
        ));
    }
    out.push_str("\n---\n\n");

    let mut included = 0usize;
    for record in &records {
        let md_path = output_dir.join(&record.path).join("content.md");
        let content = match std::fs::read_to_string(&md_path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        // Image paths become root-relative in the combined file.
        let content = REL_IMAGES_RE.replace_all(&content, "images/");
        out.push_str(&format!("<a name=\"{}\"></a>\n\n", md_anchor(&record.label)));
        out.push_str(&content);
        out.push_str("\n\n---\n\n");
        included += 1;
    }

    let combined_path = output_dir.join("combined_manual.md");
    std::fs::write(&combined_path, out)
        .with_context(|| format!("Failed to write {}", combined_path.display()))?;
    tracing::info!(topics = included, path = %combined_path.display(), "Combined Markdown written");
    if !cfg.quiet() {
        println!("Saved combined manual to {}", combined_path.display());
    }
    Ok(combined_path)
}

/// Assemble the single-file HTML document from already-downloaded topics.
pub fn assemble_html(cfg: &Config) -> Result<PathBuf> {
    let _span = tracing::info_span!("assemble_html").entered();

    let output_dir = cfg.output_dir();
    let records = load_index(&output_dir)?;

    let html = assemble::build_html(
        &records,
        &output_dir,
        cfg.title(),
        cfg.toc_title(),
        cfg.html_lang(),
        Some(cfg.index_topic()),
    )?;

    let html_path = output_dir.join("manual.html");
    std::fs::write(&html_path, &html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    if !cfg.quiet() {
        let size_mb = html.len() as f64 / (1024.0 * 1024.0);
        println!("Created {} ({:.1} MB)", html_path.display(), size_mb);
    }
    Ok(html_path)
}

/// Read the topic index written by a previous download run.
fn load_index(output_dir: &Path) -> Result<Vec<TopicRecord>> {
    let index_path = output_dir.join("index.json");
    let raw = std::fs::read_to_string(&index_path).with_context(|| {
        format!(
            "No topic index at {} (run a download first)",
            index_path.display()
        )
    })?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid topic index at {}", index_path.display()))
}

/// Anchor for the combined Markdown file, derived from the topic label:
/// markup stripped, punctuation dropped, spaces to underscores, capped at
/// 100 characters.
fn md_anchor(label: &str) -> String {
    let clean = tree::strip_tags(label);
    let stripped = MD_ANCHOR_STRIP_RE.replace_all(&clean, "");
    let underscored = MD_ANCHOR_WS_RE.replace_all(&stripped, "_");
    underscored.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, label: &str, is_category: bool) -> TopicRecord {
        TopicRecord {
            id: if is_category { None } else { Some("x".into()) },
            label: label.to_string(),
            path: path.to_string(),
            is_category,
        }
    }

    #[test]
    fn test_md_anchor() {
        assert_eq!(md_anchor("Parking brake"), "Parking_brake");
        assert_eq!(md_anchor("What's new?"), "Whats_new");
        assert_eq!(md_anchor("<b>Bold</b> label"), "Bold_label");
    }

    #[test]
    fn test_md_anchor_caps_length() {
        let long = "word ".repeat(50);
        assert!(md_anchor(&long).chars().count() <= 100);
    }

    #[test]
    fn test_load_index_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_index(dir.path()).unwrap_err();
        assert!(err.to_string().contains("run a download first"));
    }

    #[test]
    fn test_combine_builds_toc_and_rewrites_image_paths() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record("Guide", "Guide", true),
            record("Guide/Brakes", "Brakes", false),
        ];
        std::fs::write(
            dir.path().join("index.json"),
            serde_json::to_string(&records).unwrap(),
        )
        .unwrap();
        let topic_dir = dir.path().join("Guide/Brakes");
        std::fs::create_dir_all(&topic_dir).unwrap();
        std::fs::write(
            topic_dir.join("content.md"),
            "# Brakes\n\n![d](../../images/disc.png)\n",
        )
        .unwrap();

        let cfg = Config {
            output_dir: Some(dir.path().to_path_buf()),
            quiet: Some(true),
            ..Default::default()
        };
        let path = combine(&cfg).unwrap();
        let combined = std::fs::read_to_string(path).unwrap();

        assert!(combined.contains("## Inhoudsopgave"));
        assert!(combined.contains("- [Guide](#Guide)"));
        assert!(combined.contains("  - [Brakes](#Brakes)"));
        assert!(combined.contains("<a name=\"Brakes\"></a>"));
        // Deeply nested relative paths collapse to root-relative.
        assert!(combined.contains("![d](images/disc.png)"));
        assert!(!combined.contains("../images/"));
    }

    #[test]
    fn test_combine_skips_missing_topics() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record("Gone", "Gone", false)];
        std::fs::write(
            dir.path().join("index.json"),
            serde_json::to_string(&records).unwrap(),
        )
        .unwrap();

        let cfg = Config {
            output_dir: Some(dir.path().to_path_buf()),
            quiet: Some(true),
            ..Default::default()
        };
        let path = combine(&cfg).unwrap();
        let combined = std::fs::read_to_string(path).unwrap();
        // Listed in the TOC but no body section.
        assert!(combined.contains("- [Gone](#Gone)"));
        assert!(!combined.contains("<a name=\"Gone\"></a>"));
    }
}
