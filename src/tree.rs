//! Topic tree extraction.
//!
//! Flattens the nested topic tree returned by the manual API into an ordered
//! list of [`TopicRecord`]s, pre-order (each parent immediately followed by
//! its descendants, depth-first, left-to-right). The record order drives
//! everything downstream: download order, resume offsets, and the table of
//! contents in both assembled outputs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::{TopicNode, TopicTree};

/// Matches any HTML tag, for stripping markup out of labels.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("hardcoded tag regex"));

/// Matches runs of whitespace.
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("hardcoded ws regex"));

/// Characters not allowed in a path segment: everything except word
/// characters, spaces, and hyphens.
static UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("hardcoded unsafe-char regex"));

/// One topic in the flattened manual index.
///
/// `path` is the slash-delimited hierarchy of sanitized ancestor labels and
/// doubles as the on-disk directory for the topic. Siblings whose labels
/// sanitize to the same string produce colliding paths; the source tree does
/// not deduplicate them and neither do we.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    /// Content key for the topic endpoint. `None` for category headers.
    pub id: Option<String>,
    /// Display label with any embedded markup stripped.
    pub label: String,
    /// Slash-delimited hierarchical path, e.g. `Driving/Brakes/Parking brake`.
    pub path: String,
    /// True iff the node has no content key (pure navigation heading).
    pub is_category: bool,
}

impl TopicRecord {
    /// Nesting depth: number of ancestors, equal to the `/` count in `path`.
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// Remove HTML tags from text, keeping the text content, and normalize
/// whitespace.
pub fn strip_tags(text: &str) -> String {
    let clean = TAG_RE.replace_all(text, "");
    WS_RE.replace_all(&clean, " ").trim().to_string()
}

/// Sanitize a label into a path segment: word characters, spaces, and
/// hyphens only, truncated to 50 characters.
fn sanitize_label(label: &str) -> String {
    let safe = UNSAFE_RE.replace_all(label, "");
    let truncated: String = safe.chars().take(50).collect();
    truncated.trim().to_string()
}

/// Flatten a topic tree into ordered records, one per node.
pub fn extract_topics(tree: &TopicTree) -> Vec<TopicRecord> {
    let mut records = Vec::new();
    for root in &tree.trees {
        walk(root, "", &mut records);
    }
    tracing::info!(topics = records.len(), "Extracted topic tree");
    records
}

fn walk(node: &TopicNode, parent_path: &str, out: &mut Vec<TopicRecord>) {
    let raw_label = if node.label.is_empty() {
        "Untitled"
    } else {
        node.label.as_str()
    };
    let label = strip_tags(raw_label);

    let segment = sanitize_label(&label);
    let path = if parent_path.is_empty() {
        segment
    } else {
        format!("{}/{}", parent_path, segment)
    };

    out.push(TopicRecord {
        id: node.link_target.clone(),
        label,
        is_category: node.link_target.is_none(),
        path: path.clone(),
    });

    for child in &node.children {
        walk(child, &path, out);
    }
}
