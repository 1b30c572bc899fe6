//! Core domain types for notionblog.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// One published blog post, normalized from a content-service page.
///
/// Built fresh on every fetch and never mutated afterwards. Serialized in
/// camelCase so downstream renderers see `coverImage`, `wordCount`, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Page identifier assigned by the content service.
    pub id: String,
    /// Display title (`"Untitled"` when the source has none).
    pub title: String,
    /// URL path token used under `/posts/`.
    pub slug: String,
    /// Featured image URL, if the page has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// First non-blank content line, truncated to 160 characters.
    pub description: String,
    /// Publication date (explicit date, else page creation time).
    #[serde(serialize_with = "serialize_iso")]
    pub date: DateTime<Utc>,
    /// Flattened markdown body.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Words in `content`.
    pub word_count: usize,
}

/// Format a timestamp the way JavaScript's `Date.toISOString` does:
/// UTC, millisecond precision, `Z` suffix.
pub fn to_iso_string(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_iso<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_iso_string(date))
}

// ---------------------------------------------------------------------------
// Sitemap
// ---------------------------------------------------------------------------

/// The `<changefreq>` hint of a sitemap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    /// The sitemaps.org keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl std::fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `<url>` entry of the sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    /// Absolute page URL.
    pub url: String,
    #[serde(serialize_with = "serialize_iso")]
    pub last_modified: DateTime<Utc>,
    pub change_frequency: ChangeFrequency,
    /// Relative priority in `0.0..=1.0`.
    pub priority: f32,
}
