//! Notion REST API client and typed wire model.
//!
//! Only the read endpoints the blog needs are covered: database query,
//! page retrieval, database retrieval, and block children listing.
//! Responses are decoded into the typed views in [`model`] and [`blocks`].

pub mod blocks;
pub mod model;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use notionblog_shared::{BlogError, NotionSettings, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

pub use blocks::{Block, BlockKind};
pub use model::{
    DatabaseQuery, DatabaseSchema, FileObject, FileSource, FormulaValue, PageRecord, PageStub,
    PropertyValue, RichText, plain_text,
};

use model::{ApiErrorBody, ListResponse};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("notionblog/", env!("CARGO_PKG_VERSION"));

/// Largest page size the API accepts.
const PAGE_SIZE: u32 = 100;

/// Nesting limit when walking block children.
const MAX_BLOCK_DEPTH: usize = 8;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for one Notion integration and posts database.
///
/// Cheap to clone; construct once and share.
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: Client,
    api_base: String,
    database_id: String,
}

/// Request body for a paginated database query.
#[derive(Serialize)]
struct QueryBody<'a> {
    #[serde(flatten)]
    query: &'a DatabaseQuery,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
    page_size: u32,
}

impl NotionClient {
    /// Build a client with auth and version headers baked in.
    pub fn new(settings: &NotionSettings) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .map_err(|e| BlogError::config(format!("invalid Notion token: {e}")))?;
        auth.set_sensitive(true);

        let version = HeaderValue::from_str(&settings.api_version)
            .map_err(|e| BlogError::config(format!("invalid Notion API version: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert("Notion-Version", version);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| BlogError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            database_id: settings.database_id.clone(),
        })
    }

    /// Run a database query, following pagination cursors to the end.
    #[instrument(skip_all, fields(database_id = %self.database_id))]
    pub async fn query_database(&self, query: &DatabaseQuery) -> Result<Vec<PageStub>> {
        validate_id(&self.database_id)?;
        let url = format!("{}/databases/{}/query", self.api_base, self.database_id);

        let mut stubs = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = QueryBody {
                query,
                start_cursor: cursor.as_deref(),
                page_size: PAGE_SIZE,
            };
            let page: ListResponse<PageStub> =
                send_json(self.client.post(&url).json(&body), &url).await?;

            debug!(results = page.results.len(), has_more = page.has_more, "query page received");
            stubs.extend(page.results);

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(stubs)
    }

    /// Fetch a full page record.
    #[instrument(skip(self))]
    pub async fn retrieve_page(&self, page_id: &str) -> Result<PageRecord> {
        validate_id(page_id)?;
        let url = format!("{}/pages/{page_id}", self.api_base);
        send_json(self.client.get(&url), &url).await
    }

    /// Fetch the posts database's metadata and property schema.
    #[instrument(skip_all, fields(database_id = %self.database_id))]
    pub async fn retrieve_database(&self) -> Result<DatabaseSchema> {
        validate_id(&self.database_id)?;
        let url = format!("{}/databases/{}", self.api_base, self.database_id);
        send_json(self.client.get(&url), &url).await
    }

    /// Fetch the whole block tree under a page or block.
    #[instrument(skip(self))]
    pub async fn block_tree(&self, block_id: &str) -> Result<Vec<Block>> {
        validate_id(block_id)?;
        self.block_tree_at(block_id.to_string(), 0).await
    }

    fn block_tree_at(&self, block_id: String, depth: usize) -> BoxFuture<'_, Result<Vec<Block>>> {
        Box::pin(async move {
            let mut blocks = self.list_block_children(&block_id).await?;

            if depth >= MAX_BLOCK_DEPTH {
                debug!(%block_id, depth, "block nesting limit reached, not descending");
                return Ok(blocks);
            }

            for block in &mut blocks {
                if block.has_children && block.kind.descends() {
                    block.children = self.block_tree_at(block.id.clone(), depth + 1).await?;
                }
            }
            Ok(blocks)
        })
    }

    /// List one level of block children, following pagination.
    async fn list_block_children(&self, block_id: &str) -> Result<Vec<Block>> {
        let url = format!("{}/blocks/{block_id}/children", self.api_base);
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("page_size", PAGE_SIZE.to_string())]);
            if let Some(c) = &cursor {
                request = request.query(&[("start_cursor", c.as_str())]);
            }

            let page: ListResponse<Block> = send_json(request, &url).await?;
            trace!(%block_id, results = page.results.len(), "block children page received");
            blocks.extend(page.results);

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(blocks)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reject identifiers that would escape their URL path segment.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(BlogError::validation(format!("invalid Notion identifier: {id:?}")))
    }
}

/// Send a request and decode a JSON body, mapping API errors.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder, url: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| BlogError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BlogError::Network(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => (err.code, err.message),
            Err(_) => (String::new(), body.chars().take(200).collect()),
        };
        return Err(BlogError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| BlogError::parse(format!("{url}: {e}")))
}
