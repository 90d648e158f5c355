//! # manual-mirror
//!
//! Mirror a hierarchical online manual to local Markdown, then assemble the
//! pieces into a combined Markdown file and a single self-contained HTML
//! document with every image embedded as a data URI.
//!
//! The pipeline has three independent stages:
//!
//! 1. **Download** — fetch the topic tree, walk it in reading order, and
//!    write each content topic as `content.md` plus `raw.json` under a
//!    directory tree that mirrors the manual hierarchy. Referenced images
//!    land in a shared `images/` directory, fetched at most once each.
//! 2. **Combine** — stitch the per-topic Markdown into one
//!    `combined_manual.md` with a generated table of contents.
//! 3. **Html** — normalize each topic's raw HTML, embed its images, and
//!    emit one navigable `manual.html`.
//!
//! Stages 2 and 3 work entirely offline from the download output, so the
//! rendered documents can be regenerated without re-fetching anything.
//!
//! ```no_run
//! use manual_mirror::config::Config;
//! use manual_mirror::download;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = Config::load(std::path::Path::new("."));
//! download::download(&cfg, 0)?;
//! download::combine(&cfg)?;
//! download::assemble_html(&cfg)?;
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod assets;
pub mod client;
pub mod config;
pub mod download;
pub mod markdown;
pub mod normalize;
pub mod tree;

pub use client::ManualClient;
pub use config::Config;
pub use tree::TopicRecord;
