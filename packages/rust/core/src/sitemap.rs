//! Sitemap consumer: posts → sitemap entries → sitemaps.org XML.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, instrument};
use url::Url;

use notionblog_shared::{BlogError, ChangeFrequency, Post, Result, SitemapEntry, to_iso_string};

/// Path prefix under which post pages live.
pub const POSTS_PATH: &str = "posts";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const HOME_PRIORITY: f32 = 1.0;
const POST_PRIORITY: f32 = 0.8;

/// Home entry first, then one entry per post in the given order.
pub fn build_sitemap(base: &Url, posts: &[Post], now: DateTime<Utc>) -> Vec<SitemapEntry> {
    let mut entries = Vec::with_capacity(posts.len() + 1);

    entries.push(SitemapEntry {
        url: home_url(base),
        last_modified: now,
        change_frequency: ChangeFrequency::Daily,
        priority: HOME_PRIORITY,
    });

    entries.extend(posts.iter().map(|post| SitemapEntry {
        url: post_url(base, &post.slug),
        last_modified: post.date,
        change_frequency: ChangeFrequency::Weekly,
        priority: POST_PRIORITY,
    }));

    debug!(entries = entries.len(), "sitemap built");
    entries
}

fn home_url(base: &Url) -> String {
    base.as_str().trim_end_matches('/').to_string()
}

/// `{base}/posts/{slug}`, with the slug encoded as a single path segment.
pub fn post_url(base: &Url, slug: &str) -> String {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);

    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().push(POSTS_PATH).push(slug);
        }
        // cannot-be-a-base URLs have no path segments
        Err(()) => return format!("{}/{POSTS_PATH}/{slug}", home_url(base)),
    }
    url.into()
}

/// Render entries as a sitemaps.org `<urlset>` document.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn render_sitemap_xml(entries: &[SitemapEntry]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
        ))
        .map_err(xml_error)?;

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .map_err(xml_error)?;
        write_element(&mut writer, "loc", &entry.url)?;
        write_element(&mut writer, "lastmod", &to_iso_string(&entry.last_modified))?;
        write_element(&mut writer, "changefreq", entry.change_frequency.as_str())?;
        write_element(&mut writer, "priority", &format!("{:.1}", entry.priority))?;
        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .map_err(xml_error)?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    xml.push('\n');
    Ok(xml)
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error(e: impl Display) -> BlogError {
    BlogError::Render(format!("sitemap XML: {e}"))
}
