//! Collection Builder: listing query → ordered, normalized posts.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use notionblog_notion::{DatabaseQuery, PageStub};
use notionblog_shared::{BlogError, CollectConfig, Post, Result};

use crate::normalize::normalize;
use crate::source::ContentSource;

/// Progress callback for reporting collection status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the listing query has returned.
    fn listed(&self, total: usize);
    /// Called when a page has been fetched and normalized.
    fn post_ready(&self, post: &Post, current: usize, total: usize);
    /// Called when a page is dropped.
    fn page_skipped(&self, page_id: &str, reason: &str);
    /// Called when collection completes.
    fn done(&self, collection: &PostCollection);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn listed(&self, _total: usize) {}
    fn post_ready(&self, _post: &Post, _current: usize, _total: usize) {}
    fn page_skipped(&self, _page_id: &str, _reason: &str) {}
    fn done(&self, _collection: &PostCollection) {}
}

/// A page that was listed but could not be turned into a post.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPage {
    pub page_id: String,
    pub reason: String,
}

/// Result of one collection run: the posts that made it, in query order,
/// and the pages that did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostCollection {
    pub posts: Vec<Post>,
    pub skipped: Vec<SkippedPage>,
}

impl PostCollection {
    /// Number of pages the listing query returned.
    pub fn attempted(&self) -> usize {
        self.posts.len() + self.skipped.len()
    }

    /// Number of pages normalized successfully.
    pub fn succeeded(&self) -> usize {
        self.posts.len()
    }

    /// First post with the given slug, in collection order.
    pub fn find_by_slug(&self, slug: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.slug == slug)
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

/// Sort posts newest first. Ties keep their existing order.
pub fn sort_by_date_desc(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Builds the published-post collection from a [`ContentSource`].
#[derive(Clone)]
pub struct PostCollector {
    source: Arc<dyn ContentSource>,
    config: CollectConfig,
}

impl PostCollector {
    pub fn new(source: Arc<dyn ContentSource>, config: CollectConfig) -> Self {
        Self { source, config }
    }

    /// Query published pages and normalize each one.
    ///
    /// Pages that fail to fetch are skipped; only a failed listing query
    /// returns `Err`.
    #[instrument(skip_all, fields(concurrency = self.config.concurrency))]
    pub async fn collect_published(
        &self,
        progress: &dyn ProgressReporter,
    ) -> Result<PostCollection> {
        let listed = self.source.query(&DatabaseQuery::published()).await?;
        let stubs = dedup_stubs(listed);
        let total = stubs.len();
        info!(total, "listed published pages");
        progress.listed(total);

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for stub in stubs {
            let source = self.source.clone();
            let sem = semaphore.clone();
            let page_id = stub.id;

            let handle = tokio::spawn({
                let page_id = page_id.clone();
                async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| BlogError::Network(format!("fetch limiter closed: {e}")))?;
                    fetch_post(source.as_ref(), &page_id).await
                }
            });
            handles.push((page_id, handle));
        }

        // Await in spawn order so the output follows the query order.
        let mut collection = PostCollection::default();
        for (page_id, handle) in handles {
            let reason = match handle.await {
                Ok(Ok(post)) => {
                    debug!(page_id = %page_id, slug = %post.slug, "post ready");
                    progress.post_ready(&post, collection.attempted() + 1, total);
                    collection.posts.push(post);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("fetch task failed: {e}"),
            };

            warn!(page_id = %page_id, reason = %reason, "skipping page");
            progress.page_skipped(&page_id, &reason);
            collection.skipped.push(SkippedPage { page_id, reason });
        }

        info!(
            attempted = collection.attempted(),
            succeeded = collection.succeeded(),
            skipped = collection.skipped.len(),
            "collection complete"
        );
        progress.done(&collection);

        Ok(collection)
    }

    /// Published posts in query order. Never fails: a failed listing query
    /// yields an empty list.
    pub async fn get_published_posts(&self) -> Vec<Post> {
        match self.collect_published(&SilentProgress).await {
            Ok(collection) => collection.into_posts(),
            Err(e) => {
                error!(error = %e, "failed to query published posts");
                Vec::new()
            }
        }
    }
}

/// Drop repeated page ids, keeping the first occurrence.
fn dedup_stubs(stubs: Vec<PageStub>) -> Vec<PageStub> {
    let mut seen = HashSet::new();
    stubs
        .into_iter()
        .filter(|stub| seen.insert(stub.id.clone()))
        .collect()
}

/// Fetch one page record and its body, then normalize.
pub async fn fetch_post(source: &dyn ContentSource, page_id: &str) -> Result<Post> {
    let (record, content) = tokio::try_join!(source.retrieve(page_id), source.to_flat_text(page_id))?;
    Ok(normalize(&record, &content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use notionblog_notion::PageRecord;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory content source. Pages listed in `failing` error on retrieve.
    #[derive(Default)]
    struct FakeSource {
        order: Vec<String>,
        pages: HashMap<String, (PageRecord, String)>,
        failing: Vec<String>,
        delays_ms: HashMap<String, u64>,
        query_fails: bool,
    }

    impl FakeSource {
        fn with_page(mut self, id: &str, title: &str, date: &str, body: &str) -> Self {
            let record: PageRecord = serde_json::from_value(json!({
                "id": id,
                "created_time": "2024-01-01T00:00:00.000Z",
                "properties": {
                    "Title": {"type": "title", "title": [{"type": "text", "plain_text": title}]},
                    "Published Date": {"type": "date", "date": {"start": date}}
                }
            }))
            .unwrap();
            self.order.push(id.to_string());
            self.pages.insert(id.to_string(), (record, body.to_string()));
            self
        }

        fn with_failing(mut self, id: &str) -> Self {
            self.order.push(id.to_string());
            self.failing.push(id.to_string());
            self
        }

        fn with_delay(mut self, id: &str, ms: u64) -> Self {
            self.delays_ms.insert(id.to_string(), ms);
            self
        }

        async fn pause(&self, id: &str) {
            if let Some(ms) = self.delays_ms.get(id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn query(&self, query: &DatabaseQuery) -> Result<Vec<PageStub>> {
            assert_eq!(query, &DatabaseQuery::published());
            if self.query_fails {
                return Err(BlogError::Network("connection refused".into()));
            }
            Ok(self.order.iter().map(|id| PageStub { id: id.clone() }).collect())
        }

        async fn retrieve(&self, page_id: &str) -> Result<PageRecord> {
            self.pause(page_id).await;
            if self.failing.iter().any(|id| id == page_id) {
                return Err(BlogError::Api {
                    status: 404,
                    code: "object_not_found".into(),
                    message: format!("Could not find page with ID: {page_id}"),
                });
            }
            Ok(self.pages[page_id].0.clone())
        }

        async fn to_flat_text(&self, page_id: &str) -> Result<String> {
            Ok(self
                .pages
                .get(page_id)
                .map(|(_, body)| body.clone())
                .unwrap_or_default())
        }
    }

    fn collector(source: FakeSource, concurrency: usize) -> PostCollector {
        PostCollector::new(Arc::new(source), CollectConfig { concurrency })
    }

    fn four_pages() -> FakeSource {
        FakeSource::default()
            .with_page("a", "Alpha", "2024-01-03", "First body")
            .with_page("b", "Beta", "2024-01-01", "Second body")
            .with_failing("x")
            .with_page("c", "Gamma", "2024-01-02", "Third body")
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn listed(&self, total: usize) {
            self.events.lock().unwrap().push(format!("listed {total}"));
        }
        fn post_ready(&self, post: &Post, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ready {} {current}/{total}", post.slug));
        }
        fn page_skipped(&self, page_id: &str, _reason: &str) {
            self.events.lock().unwrap().push(format!("skipped {page_id}"));
        }
        fn done(&self, collection: &PostCollection) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}/{}", collection.succeeded(), collection.attempted()));
        }
    }

    #[tokio::test]
    async fn failing_page_is_dropped_and_order_kept() {
        let collection = collector(four_pages(), 4)
            .collect_published(&SilentProgress)
            .await
            .unwrap();

        let ids: Vec<_> = collection.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(collection.attempted(), 4);
        assert_eq!(collection.succeeded(), 3);
        assert_eq!(collection.skipped.len(), 1);
        assert_eq!(collection.skipped[0].page_id, "x");
        assert!(collection.skipped[0].reason.contains("404"));
    }

    #[tokio::test]
    async fn concurrent_matches_sequential() {
        // Earlier pages finish last when run concurrently.
        let slow_first = || {
            four_pages()
                .with_delay("a", 60)
                .with_delay("b", 30)
                .with_delay("c", 0)
        };

        let concurrent = collector(slow_first(), 4)
            .collect_published(&SilentProgress)
            .await
            .unwrap();
        let sequential = collector(slow_first(), 1)
            .collect_published(&SilentProgress)
            .await
            .unwrap();

        assert_eq!(concurrent, sequential);
    }

    #[tokio::test]
    async fn progress_sees_every_page() {
        let progress = RecordingProgress::default();
        collector(four_pages(), 2)
            .collect_published(&progress)
            .await
            .unwrap();

        let events = progress.events.into_inner().unwrap();
        assert_eq!(
            events,
            [
                "listed 4",
                "ready alpha 1/4",
                "ready beta 2/4",
                "skipped x",
                "ready gamma 4/4",
                "done 3/4",
            ]
        );
    }

    #[tokio::test]
    async fn query_failure_is_an_error_for_collect() {
        let source = FakeSource {
            query_fails: true,
            ..FakeSource::default()
        };
        let result = collector(source, 4).collect_published(&SilentProgress).await;
        assert!(matches!(result, Err(BlogError::Network(_))));
    }

    #[tokio::test]
    async fn query_failure_degrades_to_empty_posts() {
        let source = FakeSource {
            query_fails: true,
            ..FakeSource::default()
        };
        assert!(collector(source, 4).get_published_posts().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_stubs_are_fetched_once() {
        let mut source = four_pages();
        source.order.insert(2, "a".to_string());
        let collection = collector(source, 4)
            .collect_published(&SilentProgress)
            .await
            .unwrap();
        let ids: Vec<_> = collection.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(collection.attempted(), 4);
    }

    #[tokio::test]
    async fn empty_listing_gives_empty_collection() {
        let collection = collector(FakeSource::default(), 4)
            .collect_published(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(collection, PostCollection::default());
    }

    #[tokio::test]
    async fn get_published_posts_normalizes() {
        let posts = collector(four_pages(), 3).get_published_posts().await;
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].slug, "alpha");
        assert_eq!(posts[0].description, "First body");
        assert_eq!(posts[0].word_count, 2);
        assert_eq!(posts[0].date, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn sort_and_lookup() {
        let collection = collector(four_pages(), 4)
            .collect_published(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(collection.find_by_slug("gamma").map(|p| p.id.as_str()), Some("c"));
        assert!(collection.find_by_slug("missing").is_none());

        let mut posts = collection.into_posts();
        sort_by_date_desc(&mut posts);
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }
}
