//! HTML normalization for the assembled document.
//!
//! Rewrites one topic's raw body markup into the restricted subset the
//! single-file HTML output displays: vendor wrapper divs removed, signal-word
//! panels and bridgehead titles reduced to two semantic classes, noise
//! attributes stripped, placeholder anchors collapsed to their text.
//!
//! Each rewrite is a named rule applied in a fixed order; order matters
//! (attribute stripping must not run before the rules that depend on
//! `data-*` attributes, which is also why [`rewrite_images`] is a separate
//! pass the caller runs first).

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::assets;

static WRAPPER_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<html[^>]*><div[^>]*><div class="topic-content">"#)
        .expect("hardcoded wrapper regex")
});
static WRAPPER_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</div></div></html>$").expect("hardcoded wrapper regex"));
static SIGNALWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div[^>]*data-role="signalword-panel"[^>]*>"#).expect("hardcoded panel regex")
});
static BRIDGEHEAD_A_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p[^>]*data-type="titel"[^>]*data-role="bridgehead"[^>]*>([^<]*)</p>"#)
        .expect("hardcoded bridgehead regex")
});
static BRIDGEHEAD_B_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p[^>]*data-role="bridgehead"[^>]*data-type="titel"[^>]*>([^<]*)</p>"#)
        .expect("hardcoded bridgehead regex")
});
static EMPTY_P_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p[^>]*>\s*</p>").expect("hardcoded empty-p regex"));
static DATA_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+data-[a-z-]+="[^"]*""#).expect("hardcoded data-attr regex"));
static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+id="[^"]*""#).expect("hardcoded id-attr regex"));
static CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+class="([^"]*)""#).expect("hardcoded class-attr regex"));
static MEDIA_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+media-link="""#).expect("hardcoded media-link regex"));
static CHECKED_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+checked-link="[^"]*""#).expect("hardcoded checked-link regex")
});
static EMPTY_ALT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+alt="""#).expect("hardcoded alt regex"));
static BOLD_ONLY_P_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<p><strong>([^<]+)</strong></p>").expect("hardcoded bold-p regex")
});
static PLACEHOLDER_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"<a[^>]*href="#"[^>]*>([^<]*)</a>"##).expect("hardcoded anchor regex")
});
static PLACEHOLDER_ANCHOR_MULTILINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(?s)<a[^>]*href="#"[^>]*>(.*?)</a>"##).expect("hardcoded anchor regex")
});
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img[^>]+>").expect("hardcoded img regex"));
static IMG_DATA_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-src="([^"]+)""#).expect("hardcoded data-src regex"));
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="([^"]+)""#).expect("hardcoded src regex"));

/// A named rewrite applied to one topic's HTML.
struct RewriteRule {
    name: &'static str,
    apply: fn(&str) -> String,
}

/// All rules, in application order. Order-sensitive: the semantic-class
/// rules read `data-*` attributes that `strip_attributes` later removes.
static ALL_RULES: &[RewriteRule] = &[
    RewriteRule {
        name: "strip_wrapper",
        apply: rule_strip_wrapper,
    },
    RewriteRule {
        name: "drop_img_end_tags",
        apply: rule_drop_img_end_tags,
    },
    RewriteRule {
        name: "signalword_panel",
        apply: rule_signalword_panel,
    },
    RewriteRule {
        name: "bridgehead_titles",
        apply: rule_bridgehead_titles,
    },
    RewriteRule {
        name: "drop_empty_paragraphs",
        apply: rule_drop_empty_paragraphs,
    },
    RewriteRule {
        name: "strip_attributes",
        apply: rule_strip_attributes,
    },
    RewriteRule {
        name: "retag_sub_headers",
        apply: rule_retag_sub_headers,
    },
    RewriteRule {
        name: "collapse_placeholder_anchors",
        apply: rule_collapse_placeholder_anchors,
    },
];

/// Normalize one topic's raw body HTML into the displayable subset.
///
/// Run [`rewrite_images`] on the input first: image rewriting depends on the
/// `data-src` attributes that the attribute-stripping rule removes.
pub fn normalize_topic_html(input: &str) -> String {
    let mut html = input.to_string();
    for rule in ALL_RULES {
        let next = (rule.apply)(&html);
        if next != html {
            tracing::debug!(rule = rule.name, "Rewrite rule applied");
        }
        html = next;
    }
    html
}

/// Rewrite every `<img>` tag: classify its presentation style, embed the
/// local copy as a base64 data URI, or fall back to the remote URL.
///
/// QR codes (`imgqr` in the URL) get a fixed small square, vector images a
/// small inline icon size, everything else responsive max-width scaling.
pub fn rewrite_images(html: &str, output_dir: &Path) -> String {
    IMG_TAG_RE
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            let src = IMG_DATA_SRC_RE
                .captures(tag)
                .or_else(|| IMG_SRC_RE.captures(tag))
                .map(|c| c[1].replace("&amp;", "&"));
            let src = match src {
                Some(s) => s,
                None => return tag.to_string(),
            };

            let lower = src.to_lowercase();
            let style = if lower.contains("imgqr") {
                "width: 150px; height: 150px;"
            } else if lower.contains(".svg") {
                "width: 24px; height: 24px; vertical-align: middle; display: inline;"
            } else {
                "max-width: 100%; height: auto;"
            };

            if let Some(local) = assets::url_to_local_key(&src) {
                if let Some(data_uri) = assets::embed_data_uri(output_dir, &local) {
                    return format!(r#"<img src="{}" style="{}">"#, data_uri, style);
                }
            }
            format!(r#"<img src="{}" style="{}">"#, src, style)
        })
        .to_string()
}

fn rule_strip_wrapper(html: &str) -> String {
    let html = WRAPPER_OPEN_RE.replace(html, "");
    WRAPPER_CLOSE_RE.replace(&html, "").to_string()
}

fn rule_drop_img_end_tags(html: &str) -> String {
    html.replace("</img>", "")
}

fn rule_signalword_panel(html: &str) -> String {
    SIGNALWORD_RE
        .replace_all(html, r#"<div class="signalword-panel">"#)
        .to_string()
}

fn rule_bridgehead_titles(html: &str) -> String {
    let replacement = r#"<p class="sub-header"><strong>$1</strong></p>"#;
    let html = BRIDGEHEAD_A_RE.replace_all(html, replacement);
    BRIDGEHEAD_B_RE.replace_all(&html, replacement).to_string()
}

fn rule_drop_empty_paragraphs(html: &str) -> String {
    EMPTY_P_RE.replace_all(html, "").to_string()
}

fn rule_strip_attributes(html: &str) -> String {
    let html = DATA_ATTR_RE.replace_all(html, "");
    let html = ID_ATTR_RE.replace_all(&html, "");
    // Keep only the two semantic classes introduced by earlier rules.
    let html = CLASS_ATTR_RE.replace_all(&html, |caps: &regex::Captures<'_>| {
        match &caps[1] {
            "signalword-panel" | "sub-header" => caps[0].to_string(),
            _ => String::new(),
        }
    });
    let html = MEDIA_LINK_RE.replace_all(&html, "");
    let html = CHECKED_LINK_RE.replace_all(&html, "");
    EMPTY_ALT_RE.replace_all(&html, "").to_string()
}

fn rule_retag_sub_headers(html: &str) -> String {
    BOLD_ONLY_P_RE
        .replace_all(html, r#"<p class="sub-header"><strong>$1</strong></p>"#)
        .to_string()
}

fn rule_collapse_placeholder_anchors(html: &str) -> String {
    let html = PLACEHOLDER_ANCHOR_RE.replace_all(html, "$1");
    PLACEHOLDER_ANCHOR_MULTILINE_RE
        .replace_all(&html, "$1")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_stripped() {
        let html = r#"<html lang="nl"><div id="x"><div class="topic-content"><p>body</p></div></div></html>"#;
        let got = normalize_topic_html(html);
        assert_eq!(got, "<p>body</p>");
    }

    #[test]
    fn test_img_end_tags_dropped() {
        assert_eq!(
            normalize_topic_html("<img src=\"a.png\"></img>"),
            "<img src=\"a.png\">"
        );
    }

    #[test]
    fn test_signalword_panel_any_attribute_order() {
        let a = r#"<div data-role="signalword-panel" data-level="warning"><p>W</p></div>"#;
        let b = r#"<div data-level="warning" data-role="signalword-panel"><p>W</p></div>"#;
        let want = r#"<div class="signalword-panel"><p>W</p></div>"#;
        assert_eq!(normalize_topic_html(a), want);
        assert_eq!(normalize_topic_html(b), want);
    }

    #[test]
    fn test_bridgehead_both_orders() {
        let a = r#"<p data-type="titel" data-role="bridgehead">Heading</p>"#;
        let b = r#"<p data-role="bridgehead" data-type="titel">Heading</p>"#;
        let want = r#"<p class="sub-header"><strong>Heading</strong></p>"#;
        assert_eq!(normalize_topic_html(a), want);
        assert_eq!(normalize_topic_html(b), want);
    }

    #[test]
    fn test_empty_paragraphs_dropped() {
        let html = r#"<p data-x="1">   </p><p>keep</p>"#;
        assert_eq!(normalize_topic_html(html), "<p>keep</p>");
    }

    #[test]
    fn test_attribute_stripping_preserves_semantic_classes() {
        let html = r#"<p class="vendor-body" id="p1" data-ref="9" checked-link="t" media-link="" alt="">x</p>"#;
        assert_eq!(normalize_topic_html(html), "<p>x</p>");

        let kept = r#"<div class="signalword-panel">x</div>"#;
        assert_eq!(normalize_topic_html(kept), kept);
    }

    #[test]
    fn test_bold_only_paragraph_retagged() {
        let html = "<p><strong>Subsection</strong></p>";
        assert_eq!(
            normalize_topic_html(html),
            r#"<p class="sub-header"><strong>Subsection</strong></p>"#
        );
    }

    #[test]
    fn test_placeholder_anchor_collapsed() {
        let html = r##"<a href="#">Label</a>"##;
        assert_eq!(normalize_topic_html(html), "Label");
    }

    #[test]
    fn test_placeholder_anchor_multiline_collapsed() {
        let html = "<a class=\"x\" href=\"#\">Line one\nLine <b>two</b></a>";
        let got = normalize_topic_html(html);
        assert!(!got.contains("<a"));
        assert!(got.contains("Line one\nLine <b>two</b>"));
    }

    #[test]
    fn test_real_anchor_preserved() {
        let html = r#"<a href="https://example.com">Site</a>"#;
        assert_eq!(normalize_topic_html(html), html);
    }

    #[test]
    fn test_rewrite_images_embeds_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("pic.png"), b"fake").unwrap();

        let html = r#"<img data-src="https://cdn.example/i?key=pic.png" src="spin.gif">"#;
        let got = rewrite_images(html, dir.path());
        assert!(got.contains("data:image/png;base64,"));
        assert!(got.contains("max-width: 100%"));
    }

    #[test]
    fn test_rewrite_images_falls_back_to_remote() {
        let dir = tempfile::tempdir().unwrap();
        let html = r#"<img src="https://cdn.example/i?key=gone.png">"#;
        let got = rewrite_images(html, dir.path());
        assert!(got.contains(r#"src="https://cdn.example/i?key=gone.png""#));
    }

    #[test]
    fn test_rewrite_images_qr_and_svg_sizing() {
        let dir = tempfile::tempdir().unwrap();
        let qr = rewrite_images(r#"<img src="https://e/imgqr?key=q">"#, dir.path());
        assert!(qr.contains("width: 150px; height: 150px;"));
        let svg = rewrite_images(r#"<img src="https://e/icon.svg?key=i">"#, dir.path());
        assert!(svg.contains("width: 24px; height: 24px;"));
    }
}
