//! Single-file HTML assembly.
//!
//! Stitches the ordered topic records, each topic's normalized body, and a
//! generated table of contents into one navigable HTML document. The TOC and
//! the body sections share anchor slugs derived from each record's full
//! path, so deep links always land on the matching section.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::normalize;
use crate::tree::TopicRecord;

/// Style sheet for the assembled document: sticky stacked headers per
/// nesting level, signal-word panels, the TOC sidebar, print/mobile rules.
const STYLE: &str = include_str!("assemble/style.css");

/// Headings saturate at h6.
const MAX_HEADING_LEVEL: usize = 6;

static SLUG_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s/-]").expect("hardcoded slug regex"));
static SLUG_COLLAPSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/]+").expect("hardcoded slug regex"));

/// Derive the anchor slug for a topic path.
///
/// Lowercases, strips everything but word characters, spaces, hyphens, and
/// slashes, then collapses space/slash runs into single hyphens. Built from
/// the full path rather than the label so sibling topics with equal labels
/// under different parents stay distinct.
pub fn anchor_slug(path: &str) -> String {
    let lower = path.to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lower, "");
    SLUG_COLLAPSE_RE.replace_all(&stripped, "-").to_string()
}

/// Render the nested table of contents.
///
/// Tracks the previous record's depth: a deeper record opens that many new
/// `<ol>` levels, a shallower one closes them. Category records render as
/// bold non-linking entries; content records link to their section anchor.
/// The list always closes balanced.
pub fn toc_html(records: &[TopicRecord], heading: &str) -> String {
    let mut out = format!("    <nav class=\"toc\">\n        <h2>{}</h2>\n", heading);
    let mut prev_depth: isize = -1;

    for record in records {
        let depth = record.depth() as isize;
        if depth > prev_depth {
            for _ in 0..(depth - prev_depth) {
                out.push_str("<ol>\n");
            }
        } else if depth < prev_depth {
            for _ in 0..(prev_depth - depth) {
                out.push_str("</li>\n</ol>\n");
            }
            out.push_str("</li>\n");
        } else {
            out.push_str("</li>\n");
        }

        if record.is_category {
            out.push_str(&format!("<li><strong>{}</strong>\n", record.label));
        } else {
            out.push_str(&format!(
                "<li><a href=\"#{}\">{}</a>\n",
                anchor_slug(&record.path),
                record.label
            ));
        }
        prev_depth = depth;
    }

    for _ in 0..(prev_depth + 1) {
        out.push_str("</li>\n</ol>\n");
    }
    out.push_str("    </nav>\n\n");
    out
}

/// Build the complete single-file HTML document.
///
/// Reads each content topic's `raw.json` under `output_dir`, embeds its
/// images, normalizes its markup, and emits it as a deep-linkable section.
/// Topics whose `raw.json` is missing (failed or not-yet-downloaded) are
/// skipped. `index_topic` names a root topic that duplicates the generated
/// TOC and is left out entirely.
pub fn build_html(
    records: &[TopicRecord],
    output_dir: &Path,
    title: &str,
    toc_title: &str,
    lang: &str,
    index_topic: Option<&str>,
) -> Result<String> {
    let _span = tracing::info_span!("build_html", topics = records.len()).entered();

    let mut out = format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    \
         <title>{}</title>\n    <style>\n{}\n    </style>\n</head>\n<body>\n",
        lang, title, STYLE
    );

    out.push_str(&toc_html(records, toc_title));
    out.push_str("    <div class=\"main-content\">\n");
    out.push_str(&format!("    <h1>{}</h1>\n", title));

    let mut sections = 0usize;
    for record in records {
        let level = (record.depth() + 1).min(MAX_HEADING_LEVEL);
        let anchor = anchor_slug(&record.path);

        if record.is_category {
            out.push_str(&format!(
                "    <h{level} class=\"category-header\">{}</h{level}>\n\n",
                record.label
            ));
            continue;
        }

        // The root index topic just restates the TOC.
        if index_topic.is_some_and(|skip| record.path == skip) {
            continue;
        }

        let json_path = output_dir.join(&record.path).join("raw.json");
        let raw = match std::fs::read_to_string(&json_path) {
            Ok(s) => s,
            Err(_) => {
                tracing::debug!(path = %json_path.display(), "No raw content, skipping topic");
                continue;
            }
        };
        let data: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in {}", json_path.display()))?;
        let body_html = data
            .get("bodyHtml")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        // Embed images first: the rewriter needs the data-src attributes
        // that normalization strips.
        let embedded = normalize::rewrite_images(body_html, output_dir);
        let cleaned = normalize::normalize_topic_html(&embedded);

        out.push_str(&format!(
            "    <div class=\"topic-section\" id=\"{}\">\n        <h{level}>{}</h{level}>\n        {}\n    </div>\n\n",
            anchor, record.label, cleaned
        ));
        sections += 1;
    }

    out.push_str("    </div>\n</body>\n</html>");
    tracing::info!(sections, bytes = out.len(), "Assembled HTML document");
    Ok(out)
}
