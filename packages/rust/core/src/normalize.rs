//! Page record → [`Post`] normalization.
//!
//! Each derived field is resolved through an ordered chain of named
//! [`Rule`]s; the first rule that yields a value wins, and the field's
//! placeholder applies when none does. Normalization never fails: missing or
//! oddly shaped properties only change which rule matches.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use tracing::{trace, warn};

use notionblog_markdown::count_words;
use notionblog_notion::model::STATUS_PROPERTY;
use notionblog_notion::{FileSource, FormulaValue, PageRecord, PropertyValue};
use notionblog_shared::Post;

/// Title used when the page has none.
pub const UNTITLED: &str = "Untitled";

/// Slug used when neither an explicit slug nor a usable title exists.
pub const UNTITLED_SLUG: &str = "untitled";

/// Maximum description length in characters, before the ellipsis.
pub const DESCRIPTION_LIMIT: usize = 160;

/// Appended to truncated descriptions.
pub const ELLIPSIS: &str = "...";

/// Database properties the normalizer reads, with the Notion type each is expected to have.
pub const EXPECTED_PROPERTIES: &[(&str, &[&str])] = &[
    (TITLE_PROPERTY, &["title"]),
    (SLUG_PROPERTY, &["formula"]),
    (COVER_PROPERTY, &["files", "url"]),
    (DATE_PROPERTY, &["date"]),
    (AUTHOR_PROPERTY, &["people"]),
    (TAGS_PROPERTY, &["multi_select"]),
    (CATEGORY_PROPERTY, &["select"]),
    (STATUS_PROPERTY, &["status"]),
];

const MAX_ISO_YEAR: i32 = 9999;

const TITLE_PROPERTY: &str = "Title";
const SLUG_PROPERTY: &str = "Slug";
const COVER_PROPERTY: &str = "Featured Image";
const DATE_PROPERTY: &str = "Published Date";
const AUTHOR_PROPERTY: &str = "Author";
const TAGS_PROPERTY: &str = "Tags";
const CATEGORY_PROPERTY: &str = "Category";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One step of a field's fallback chain.
///
/// `extract` returns `None` when the rule does not apply to the page.
pub struct Rule<T> {
    /// Where the value comes from, for tracing.
    pub source: &'static str,
    pub extract: fn(&PageRecord) -> Option<T>,
}

/// Evaluate `rules` in order and return the first match with its source.
pub fn first_match<T>(rules: &[Rule<T>], page: &PageRecord) -> Option<(&'static str, T)> {
    rules
        .iter()
        .find_map(|rule| (rule.extract)(page).map(|value| (rule.source, value)))
}

pub const TITLE_RULES: &[Rule<String>] = &[Rule {
    source: "Title property",
    extract: title_text,
}];

pub const SLUG_RULES: &[Rule<String>] = &[
    Rule {
        source: "Slug formula",
        extract: explicit_slug,
    },
    Rule {
        source: "slugified title",
        extract: slug_from_title,
    },
];

pub const COVER_RULES: &[Rule<String>] = &[
    Rule {
        source: "uploaded featured image",
        extract: uploaded_cover,
    },
    Rule {
        source: "external featured image",
        extract: external_cover,
    },
    Rule {
        source: "featured image URL",
        extract: cover_url_property,
    },
];

pub const DATE_RULES: &[Rule<String>] = &[
    Rule {
        source: "Published Date property",
        extract: published_date,
    },
    Rule {
        source: "page created_time",
        extract: created_time,
    },
];

pub const AUTHOR_RULES: &[Rule<String>] = &[Rule {
    source: "first Author person",
    extract: first_author,
}];

pub const TAG_RULES: &[Rule<Vec<String>>] = &[Rule {
    source: "Tags multi-select",
    extract: tag_names,
}];

pub const CATEGORY_RULES: &[Rule<String>] = &[Rule {
    source: "Category select",
    extract: category_name,
}];

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Build a [`Post`] from a page record and its flattened body.
pub fn normalize(page: &PageRecord, content: &str) -> Post {
    normalize_at(page, content, Utc::now())
}

/// [`normalize`] with an explicit "now" for the unparseable-date fallback.
pub fn normalize_at(page: &PageRecord, content: &str, now: DateTime<Utc>) -> Post {
    let title = resolve(page, "title", TITLE_RULES).unwrap_or_else(|| UNTITLED.to_string());
    let slug = resolve(page, "slug", SLUG_RULES).unwrap_or_else(|| UNTITLED_SLUG.to_string());

    Post {
        id: page.id.clone(),
        title,
        slug,
        cover_image: resolve(page, "coverImage", COVER_RULES),
        description: describe(content),
        date: resolve_date(page, now),
        content: content.to_string(),
        author: resolve(page, "author", AUTHOR_RULES),
        tags: resolve(page, "tags", TAG_RULES).unwrap_or_default(),
        category: resolve(page, "category", CATEGORY_RULES),
        word_count: count_words(content),
    }
}

fn resolve<T>(page: &PageRecord, field: &str, rules: &[Rule<T>]) -> Option<T> {
    match first_match(rules, page) {
        Some((source, value)) => {
            trace!(page_id = %page.id, field, source, "field resolved");
            Some(value)
        }
        None => {
            trace!(page_id = %page.id, field, "no rule matched, using default");
            None
        }
    }
}

/// The first present raw date wins; if it does not parse, fall back to `now`.
fn resolve_date(page: &PageRecord, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = resolve(page, "date", DATE_RULES) else {
        warn!(page_id = %page.id, "page has no date at all, using current time");
        return now;
    };

    parse_date(&raw).unwrap_or_else(|| {
        warn!(page_id = %page.id, raw = %raw, "unparseable date, using current time");
        now
    })
}

/// Parse a Notion date or date-time.
///
/// Accepts RFC 3339, an offset-less date-time (taken as UTC), or a bare
/// `YYYY-MM-DD` (midnight UTC). The UTC result must fall in years
/// 0000..=9999 so it serializes back to a valid ISO string.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        Some(dt.with_timezone(&Utc))
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Some(naive.and_utc())
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
    } else {
        None
    };

    parsed.filter(|dt| (0..=MAX_ISO_YEAR).contains(&dt.year()))
}

/// First non-blank line of the content, truncated to [`DESCRIPTION_LIMIT`] characters.
pub fn describe(content: &str) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();

    match first_line.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &first_line[..cut]),
        None => first_line.to_string(),
    }
}

/// Lower-case, collapse every run of characters outside `[a-z0-9]` into one
/// hyphen, and trim hyphens from both ends.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn title_text(page: &PageRecord) -> Option<String> {
    match page.property(TITLE_PROPERTY)? {
        PropertyValue::Title { title } => non_empty(&title.first()?.plain_text),
        _ => None,
    }
}

fn explicit_slug(page: &PageRecord) -> Option<String> {
    match page.property(SLUG_PROPERTY)? {
        PropertyValue::Formula {
            formula: FormulaValue::String { string: Some(slug) },
        } => non_empty(slug),
        _ => None,
    }
}

fn slug_from_title(page: &PageRecord) -> Option<String> {
    let slug = slugify(&title_text(page)?);
    non_empty(&slug)
}

fn first_cover_file(page: &PageRecord) -> Option<&FileSource> {
    match page.property(COVER_PROPERTY)? {
        PropertyValue::Files { files } => files.first().map(|f| &f.source),
        _ => None,
    }
}

fn uploaded_cover(page: &PageRecord) -> Option<String> {
    match first_cover_file(page)? {
        FileSource::File { file } => non_empty(&file.url),
        FileSource::External { .. } => None,
    }
}

fn external_cover(page: &PageRecord) -> Option<String> {
    match first_cover_file(page)? {
        FileSource::External { external } => non_empty(&external.url),
        FileSource::File { .. } => None,
    }
}

fn cover_url_property(page: &PageRecord) -> Option<String> {
    match page.property(COVER_PROPERTY)? {
        PropertyValue::Url { url: Some(url) } => non_empty(url),
        _ => None,
    }
}

fn published_date(page: &PageRecord) -> Option<String> {
    match page.property(DATE_PROPERTY)? {
        PropertyValue::Date { date: Some(date) } => non_empty(&date.start),
        _ => None,
    }
}

fn created_time(page: &PageRecord) -> Option<String> {
    non_empty(&page.created_time)
}

fn first_author(page: &PageRecord) -> Option<String> {
    match page.property(AUTHOR_PROPERTY)? {
        PropertyValue::People { people } => non_empty(people.first()?.name.as_deref()?),
        _ => None,
    }
}

fn tag_names(page: &PageRecord) -> Option<Vec<String>> {
    match page.property(TAGS_PROPERTY)? {
        PropertyValue::MultiSelect { multi_select } => {
            Some(multi_select.iter().map(|opt| opt.name.clone()).collect())
        }
        _ => None,
    }
}

fn category_name(page: &PageRecord) -> Option<String> {
    match page.property(CATEGORY_PROPERTY)? {
        PropertyValue::Select { select: Some(opt) } => non_empty(&opt.name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    fn page(properties: Value) -> PageRecord {
        serde_json::from_value(json!({
            "object": "page",
            "id": "1",
            "created_time": "2024-03-02T08:15:00.000Z",
            "properties": properties,
        }))
        .expect("valid page")
    }

    fn title(text: &str) -> Value {
        json!({"id": "title", "type": "title", "title": [{"type": "text", "plain_text": text}]})
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn load_fixture(name: &str) -> PageRecord {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/notion")
            .join(name);
        let raw = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&raw).expect("decode fixture")
    }

    // --- End-to-end ---

    #[test]
    fn hello_world_without_slug() {
        let post = normalize(&page(json!({"Title": title("Hello World!")})), "");
        assert_eq!(post.id, "1");
        assert_eq!(post.title, "Hello World!");
        assert_eq!(post.slug, "hello-world");
    }

    #[test]
    fn full_fixture_normalizes() {
        let record = load_fixture("page_full.json");
        let content = "# Introduction\n\nDesigning furniture with CAD.";
        let post = normalize_at(&record, content, fixed_now());

        assert_eq!(post.id, "page-1");
        assert_eq!(post.title, "Hello World!");
        assert_eq!(post.slug, "hello-world-custom");
        assert_eq!(
            post.cover_image.as_deref(),
            Some("https://prod-files.example.com/cover.png?sig=abc")
        );
        // content-derived, never the Description property
        assert_eq!(post.description, "# Introduction");
        assert_eq!(post.date, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(post.author.as_deref(), Some("Ayu Lestari"));
        assert_eq!(post.tags, ["woodworking", "cad"]);
        assert_eq!(post.category.as_deref(), Some("Design"));
        assert_eq!(post.word_count, 5);
        assert_eq!(post.content, content);
    }

    #[test]
    fn bare_page_gets_every_default() {
        let post = normalize_at(&page(json!({})), "", fixed_now());
        assert_eq!(post.title, UNTITLED);
        assert_eq!(post.slug, UNTITLED_SLUG);
        assert_eq!(post.cover_image, None);
        assert_eq!(post.description, "");
        assert_eq!(post.date, Utc.with_ymd_and_hms(2024, 3, 2, 8, 15, 0).unwrap());
        assert_eq!(post.author, None);
        assert!(post.tags.is_empty());
        assert_eq!(post.category, None);
        assert_eq!(post.word_count, 0);
    }

    // --- Title / slug ---

    #[test]
    fn title_uses_first_segment_only() {
        let record = page(json!({
            "Title": {"type": "title", "title": [
                {"type": "text", "plain_text": "Part one"},
                {"type": "text", "plain_text": " and two"}
            ]}
        }));
        assert_eq!(normalize(&record, "").title, "Part one");
    }

    #[test]
    fn empty_title_segment_falls_back() {
        let post = normalize(&page(json!({"Title": title("")})), "");
        assert_eq!(post.title, UNTITLED);
        assert_eq!(post.slug, UNTITLED_SLUG);
    }

    #[test]
    fn whitespace_only_title_and_slug_count_as_missing() {
        let record = page(json!({
            "Title": title("   "),
            "Slug": {"type": "formula", "formula": {"type": "string", "string": " \t "}}
        }));
        let post = normalize(&record, "");
        assert_eq!(post.title, UNTITLED);
        assert_eq!(post.slug, UNTITLED_SLUG);
    }

    #[test]
    fn explicit_slug_wins_verbatim() {
        let record = page(json!({
            "Title": title("Hello World!"),
            "Slug": {"type": "formula", "formula": {"type": "string", "string": "My-Custom_Slug"}}
        }));
        assert_eq!(normalize(&record, "").slug, "My-Custom_Slug");
    }

    #[test]
    fn empty_explicit_slug_is_ignored() {
        let record = page(json!({
            "Title": title("Fresh Cut"),
            "Slug": {"type": "formula", "formula": {"type": "string", "string": ""}}
        }));
        assert_eq!(normalize(&record, "").slug, "fresh-cut");

        let record = page(json!({
            "Title": title("Fresh Cut"),
            "Slug": {"type": "formula", "formula": {"type": "number", "number": 3}}
        }));
        assert_eq!(normalize(&record, "").slug, "fresh-cut");
    }

    #[test]
    fn punctuation_only_title_slugs_to_placeholder() {
        let post = normalize(&page(json!({"Title": title("!!! ???")})), "");
        assert_eq!(post.title, "!!! ???");
        assert_eq!(post.slug, UNTITLED_SLUG);
    }

    #[test]
    fn identical_titles_collide() {
        let a = normalize(&page(json!({"Title": title("Same Name")})), "a");
        let b = normalize(&page(json!({"Title": title("Same Name")})), "b");
        assert_eq!(a.slug, b.slug);
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("Hello World!"), "hello-world");
        assert_eq!(slugify("  --Rust & Wood--  "), "rust-wood");
        assert_eq!(slugify("Kursi Jati 2024"), "kursi-jati-2024");
        assert_eq!(slugify("Café"), "caf");
        assert_eq!(slugify("???"), "");
        for slug in ["Hello World!", "a__b", "-x-"].map(slugify) {
            assert_eq!(slug, slug.to_lowercase());
            assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            assert!(!slug.contains("--"));
        }
    }

    // --- Cover image ---

    #[test]
    fn external_cover_is_second_choice() {
        let record = page(json!({
            "Featured Image": {"type": "files", "files": [
                {"name": "x", "type": "external", "external": {"url": "https://img.example.com/x.jpg"}}
            ]}
        }));
        assert_eq!(
            normalize(&record, "").cover_image.as_deref(),
            Some("https://img.example.com/x.jpg")
        );
    }

    #[test]
    fn url_property_cover_is_last_choice() {
        let record = page(json!({
            "Featured Image": {"type": "url", "url": "https://img.example.com/y.jpg"}
        }));
        assert_eq!(
            normalize(&record, "").cover_image.as_deref(),
            Some("https://img.example.com/y.jpg")
        );

        let empty = page(json!({"Featured Image": {"type": "files", "files": []}}));
        assert_eq!(normalize(&empty, "").cover_image, None);
    }

    // --- Description ---

    #[test]
    fn description_is_first_non_blank_line() {
        assert_eq!(describe("\n   \n\tSecond\nThird"), "\tSecond");
        assert_eq!(describe(""), "");
        assert_eq!(describe("  \n \n"), "");
    }

    #[test]
    fn description_truncates_with_ellipsis() {
        let exact = "a".repeat(DESCRIPTION_LIMIT);
        assert_eq!(describe(&exact), exact);

        let long = "é".repeat(DESCRIPTION_LIMIT + 40);
        let desc = describe(&long);
        assert_eq!(desc.chars().count(), DESCRIPTION_LIMIT + ELLIPSIS.len());
        assert!(desc.ends_with(ELLIPSIS));
        assert!(desc.starts_with(&"é".repeat(DESCRIPTION_LIMIT)));
    }

    #[test]
    fn description_ignores_description_property() {
        let record = page(json!({
            "Description": {"type": "rich_text", "rich_text": [{"type": "text", "plain_text": "meta"}]}
        }));
        assert_eq!(normalize(&record, "Body line").description, "Body line");
    }

    // --- Date ---

    #[test]
    fn date_prefers_published_date_with_offset() {
        let record = page(json!({
            "Published Date": {"type": "date", "date": {"start": "2024-02-10T09:00:00.000+07:00"}}
        }));
        let post = normalize_at(&record, "", fixed_now());
        assert_eq!(post.date, Utc.with_ymd_and_hms(2024, 2, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn unparseable_published_date_uses_now() {
        let record = page(json!({
            "Published Date": {"type": "date", "date": {"start": "next tuesday"}}
        }));
        let post = normalize_at(&record, "", fixed_now());
        assert_eq!(post.date, fixed_now());
    }

    #[test]
    fn null_published_date_falls_back_to_created_time() {
        let record = page(json!({"Published Date": {"type": "date", "date": null}}));
        let post = normalize_at(&record, "", fixed_now());
        assert_eq!(post.date, Utc.with_ymd_and_hms(2024, 3, 2, 8, 15, 0).unwrap());
    }

    #[test]
    fn dates_always_serialize_as_iso() {
        let mut record = page(json!({}));
        for raw in ["", "garbage", "2024-13-45", "2024-05-06T07:08:09"] {
            record.created_time = raw.to_string();
            let post = normalize_at(&record, "", fixed_now());
            let json = serde_json::to_value(&post).expect("serialize");
            let iso = json["date"].as_str().expect("date string");
            assert!(DateTime::parse_from_rfc3339(iso).is_ok(), "not ISO: {iso}");
        }
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(
            parse_date("2024-01-15"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("2024-01-15T10:30:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_date("2024-01-15T10:30:00.000Z"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(parse_date("15/01/2024"), None);
    }

    #[test]
    fn parse_date_rejects_years_outside_iso_range() {
        assert_eq!(parse_date("+10000-01-01"), None);
        assert_eq!(parse_date("-0001-06-01T00:00:00"), None);
        // offset pushes the UTC instant past year 9999
        assert_eq!(parse_date("9999-12-31T23:00:00-05:00"), None);
        assert_eq!(
            parse_date("9999-12-31"),
            Some(Utc.with_ymd_and_hms(9999, 12, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn expanded_year_published_date_uses_now() {
        let record = page(json!({
            "Published Date": {"type": "date", "date": {"start": "+10000-01-01"}}
        }));
        let post = normalize_at(&record, "", fixed_now());
        assert_eq!(post.date, fixed_now());

        let json = serde_json::to_value(&post).expect("serialize");
        let iso = json["date"].as_str().expect("date string");
        assert!(DateTime::parse_from_rfc3339(iso).is_ok(), "not ISO: {iso}");
    }

    // --- People / tags / category ---

    #[test]
    fn author_tags_and_category() {
        let record = page(json!({
            "Author": {"type": "people", "people": [{"object": "user", "id": "u1"}]},
            "Tags": {"type": "multi_select", "multi_select": [
                {"name": "zeta"}, {"name": "alpha"}, {"name": "zeta"}
            ]},
            "Category": {"type": "select", "select": null}
        }));
        let post = normalize(&record, "");
        // nameless first person means no author
        assert_eq!(post.author, None);
        // source order, duplicates kept
        assert_eq!(post.tags, ["zeta", "alpha", "zeta"]);
        assert_eq!(post.category, None);
    }

    #[test]
    fn wrongly_typed_properties_are_absent() {
        let record = page(json!({
            "Title": {"type": "rich_text", "rich_text": [{"type": "text", "plain_text": "Not a title"}]},
            "Tags": {"type": "select", "select": {"name": "solo"}},
            "Author": {"type": "people", "people": "broken"}
        }));
        let post = normalize(&record, "");
        assert_eq!(post.title, UNTITLED);
        assert!(post.tags.is_empty());
        assert_eq!(post.author, None);
    }

    #[test]
    fn first_match_reports_rule_source() {
        let record = page(json!({"Title": title("Rules")}));
        assert_eq!(
            first_match(SLUG_RULES, &record),
            Some(("slugified title", "rules".to_string()))
        );
        assert_eq!(first_match(COVER_RULES, &record), None);
    }
}
