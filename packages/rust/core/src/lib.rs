//! Normalization and collection logic for notionblog.
//!
//! This crate turns the posts database into a clean [`Post`] collection:
//! - [`ContentSource`]: the seam to the content service
//! - [`normalize`]: one page record plus its body → one [`Post`]
//! - [`PostCollector`]: listing query → ordered, partially-successful [`PostCollection`]
//! - [`build_sitemap`] / [`render_sitemap_xml`]: the sitemap consumer
//!
//! [`Post`]: notionblog_shared::Post

pub mod collection;
pub mod normalize;
pub mod sitemap;
pub mod source;

pub use collection::{
    PostCollection, PostCollector, ProgressReporter, SilentProgress, SkippedPage, fetch_post,
    sort_by_date_desc,
};
pub use normalize::{normalize, normalize_at, slugify};
pub use sitemap::{build_sitemap, post_url, render_sitemap_xml};
pub use source::ContentSource;
