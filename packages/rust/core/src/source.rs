//! The content-service seam.
//!
//! [`ContentSource`] is the only way the collector reaches the outside world,
//! so tests can substitute an in-memory fake for the Notion API.

use async_trait::async_trait;
use tracing::debug;

use notionblog_markdown::render_blocks;
use notionblog_notion::{DatabaseQuery, NotionClient, PageRecord, PageStub};
use notionblog_shared::Result;

/// Read access to the posts database.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List pages matching `query`, in the order the service returns them.
    async fn query(&self, query: &DatabaseQuery) -> Result<Vec<PageStub>>;

    /// Fetch one full page record.
    async fn retrieve(&self, page_id: &str) -> Result<PageRecord>;

    /// Fetch a page body flattened to Markdown.
    async fn to_flat_text(&self, page_id: &str) -> Result<String>;
}

#[async_trait]
impl ContentSource for NotionClient {
    async fn query(&self, query: &DatabaseQuery) -> Result<Vec<PageStub>> {
        self.query_database(query).await
    }

    async fn retrieve(&self, page_id: &str) -> Result<PageRecord> {
        self.retrieve_page(page_id).await
    }

    async fn to_flat_text(&self, page_id: &str) -> Result<String> {
        let blocks = self.block_tree(page_id).await?;
        debug!(page_id, blocks = blocks.len(), "flattening block tree");
        Ok(render_blocks(&blocks))
    }
}
