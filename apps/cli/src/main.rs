//! notionblog CLI: the Notion-backed blog's content layer from the terminal.
//!
//! Lists and prints published posts, emits the sitemap, and inspects the
//! posts database schema.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
