//! CLI implementation for manual-mirror

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use manual_mirror::config::Config;
use manual_mirror::download;

#[derive(Parser)]
#[command(name = "manual-mirror")]
#[command(about = "Mirror an online manual to Markdown and a single-file HTML document")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the manual API
    #[arg(long, env = "MANUAL_MIRROR_BASE_URL")]
    base_url: Option<String>,

    /// Content key of the root topic
    #[arg(long, global = true)]
    root: Option<String>,

    /// API language code, e.g. nl_NL
    #[arg(short, long)]
    language: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File holding the session cookie string
    #[arg(short, long)]
    cookies: Option<PathBuf>,

    /// Suppress per-topic progress output
    #[arg(short, long)]
    quiet: bool,

    /// Print per-image resolution detail
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the topic tree, per-topic Markdown, and images (default)
    Download {
        /// Skip the first N topics (continue an interrupted run)
        #[arg(long, default_value = "0")]
        resume: usize,
    },
    /// Rebuild the combined Markdown file from downloaded topics
    Combine,
    /// Assemble the single-file HTML document from downloaded topics
    Html,
}

/// Parse arguments, merge them over the config files, and dispatch.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let file_config = Config::load(&cwd);
    let flags = Config {
        base_url: cli.base_url,
        root_topic: cli.root,
        language: cli.language,
        output_dir: cli.output,
        cookies_file: cli.cookies,
        quiet: cli.quiet.then_some(true),
        verbose: cli.verbose.then_some(true),
        ..Default::default()
    };
    let cfg = file_config.override_with(flags);

    match cli.command {
        Some(Commands::Download { resume }) => {
            download::download(&cfg, resume)?;
        }
        None => {
            download::download(&cfg, 0)?;
        }
        Some(Commands::Combine) => {
            download::combine(&cfg)?;
        }
        Some(Commands::Html) => {
            download::assemble_html(&cfg)?;
        }
    }
    Ok(())
}
