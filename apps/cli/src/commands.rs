//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use notionblog_core::normalize::EXPECTED_PROPERTIES;
use notionblog_core::{
    ContentSource, PostCollection, PostCollector, ProgressReporter, build_sitemap,
    render_sitemap_xml,
};
use notionblog_markdown::build_frontmatter;
use notionblog_notion::NotionClient;
use notionblog_shared::{
    AppConfig, CollectConfig, NotionSettings, Post, init_config, load_config, load_config_from,
    resolve_site_url, to_iso_string,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// notionblog: the content layer of a Notion-backed blog.
#[derive(Parser)]
#[command(
    name = "notionblog",
    version,
    about = "Fetch, normalize, and publish blog posts from a Notion database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.notionblog/notionblog.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List published posts in database order.
    Posts {
        /// Print the posts as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print one published post as markdown with frontmatter.
    Post {
        /// Post slug.
        slug: String,
    },

    /// Emit the sitemap XML for the site.
    Sitemap {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the posts database schema and check the properties the blog reads.
    Schema,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "notionblog=info",
        1 => "notionblog=debug",
        _ => "notionblog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Posts { json } => cmd_posts(config_path, json).await,
        Command::Post { slug } => cmd_post(config_path, &slug).await,
        Command::Sitemap { out } => cmd_sitemap(config_path, out.as_deref()).await,
        Command::Schema => cmd_schema(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Build the Notion client once and hand it to the collector.
fn connect(config: &AppConfig) -> Result<(NotionClient, PostCollector)> {
    let settings = NotionSettings::from_config(config)?;
    let client = NotionClient::new(&settings)?;
    let source: Arc<dyn ContentSource> = Arc::new(client.clone());
    let collector = PostCollector::new(source, CollectConfig::from(config));
    Ok((client, collector))
}

async fn collect(collector: &PostCollector) -> Result<PostCollection> {
    let reporter = CliProgress::new();
    let result = collector.collect_published(&reporter).await;
    reporter.spinner.finish_and_clear();
    let collection = result?;
    if !collection.skipped.is_empty() {
        eprintln!(
            "  {} of {} pages skipped (run with -v for details)",
            collection.skipped.len(),
            collection.attempted()
        );
    }
    Ok(collection)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_posts(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let (_, collector) = connect(&config)?;
    let collection = collect(&collector).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&collection.posts)?);
        return Ok(());
    }

    if collection.posts.is_empty() {
        println!("No published posts.");
        return Ok(());
    }

    println!("{:<10}  {:<36}  {:>6}  TITLE", "DATE", "SLUG", "WORDS");
    for post in &collection.posts {
        println!(
            "{:<10}  {:<36}  {:>6}  {}",
            post.date.format("%Y-%m-%d"),
            post.slug,
            post.word_count,
            post.title
        );
    }
    Ok(())
}

async fn cmd_post(config_path: Option<&Path>, slug: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let (_, collector) = connect(&config)?;
    let collection = collect(&collector).await?;

    let post = collection
        .find_by_slug(slug)
        .ok_or_else(|| eyre!("no published post with slug '{slug}'"))?;

    info!(id = %post.id, slug, "rendering post");
    print!("{}", render_post(post));
    Ok(())
}

/// Frontmatter followed by the post body.
fn render_post(post: &Post) -> String {
    let date = to_iso_string(&post.date);
    let word_count = post.word_count.to_string();

    let mut fields = vec![
        ("id", post.id.as_str()),
        ("title", post.title.as_str()),
        ("slug", post.slug.as_str()),
        ("date", date.as_str()),
        ("description", post.description.as_str()),
        ("word_count", word_count.as_str()),
    ];
    if let Some(author) = &post.author {
        fields.push(("author", author.as_str()));
    }
    if let Some(category) = &post.category {
        fields.push(("category", category.as_str()));
    }
    if let Some(cover) = &post.cover_image {
        fields.push(("cover_image", cover.as_str()));
    }

    let mut out = build_frontmatter(&fields, &[("tags", post.tags.as_slice())]);
    out.push('\n');
    out.push_str(&post.content);
    out.push('\n');
    out
}

async fn cmd_sitemap(config_path: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let base = resolve_site_url(&config)?;
    let (_, collector) = connect(&config)?;

    let posts = collector.get_published_posts().await;
    let entries = build_sitemap(&base, &posts, Utc::now());
    let xml = render_sitemap_xml(&entries)?;

    match out {
        Some(path) => {
            std::fs::write(path, &xml)
                .map_err(|e| eyre!("failed to write {}: {e}", path.display()))?;
            info!(path = %path.display(), entries = entries.len(), "sitemap written");
        }
        None => print!("{xml}"),
    }
    Ok(())
}

async fn cmd_schema(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let (client, _) = connect(&config)?;
    let schema = client.retrieve_database().await?;

    let title = schema.title_text();
    println!();
    println!("  Database: {}", if title.is_empty() { "(untitled)" } else { title.as_str() });
    println!("  ID:       {}", schema.id);
    println!();

    for (name, property) in &schema.properties {
        println!("  {name:<24} {}", property.kind);
    }

    println!();
    println!("  Properties read by notionblog:");
    for (name, kinds) in EXPECTED_PROPERTIES {
        let status = match schema.properties.get(*name) {
            None => "missing".to_string(),
            Some(p) if kinds.contains(&p.kind.as_str()) => "ok".to_string(),
            Some(p) => format!("unexpected type '{}' (want {})", p.kind, kinds.join(" or ")),
        };
        println!("  {name:<24} {status}");
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.set_message("Querying published posts...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn listed(&self, total: usize) {
        self.spinner.set_message(format!("Fetching {total} posts..."));
    }

    fn post_ready(&self, post: &Post, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {}", post.slug));
    }

    fn page_skipped(&self, page_id: &str, _reason: &str) {
        self.spinner.set_message(format!("skipped {page_id}"));
    }

    fn done(&self, _collection: &PostCollection) {
        self.spinner.finish_and_clear();
    }
}
