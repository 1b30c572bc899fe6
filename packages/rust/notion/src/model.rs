//! Typed view of Notion pages, properties, and rich text.
//!
//! Notion's page `properties` bag is loosely typed: any property can hold any
//! shape, and databases evolve. Every property is decoded independently into
//! a [`PropertyValue`]; anything that fails to decode becomes
//! [`PropertyValue::Unsupported`] instead of failing the whole page.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Status property used to select published posts.
pub const STATUS_PROPERTY: &str = "Status";

/// Status value that marks a post as published.
pub const PUBLISHED_STATUS: &str = "Published";

/// Property the listing is ordered by.
pub const CREATED_TIME_PROPERTY: &str = "Created time";

/// Body of a `POST /databases/{id}/query` request (minus pagination fields).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseQuery {
    pub filter: QueryFilter,
    pub sorts: Vec<QuerySort>,
}

impl DatabaseQuery {
    /// `Status = Published`, newest first by creation time.
    pub fn published() -> Self {
        Self {
            filter: QueryFilter {
                and: vec![PropertyFilter {
                    property: STATUS_PROPERTY.into(),
                    condition: FilterCondition::Status {
                        equals: PUBLISHED_STATUS.into(),
                    },
                }],
            },
            sorts: vec![QuerySort {
                property: CREATED_TIME_PROPERTY.into(),
                direction: SortDirection::Descending,
            }],
        }
    }
}

/// Compound `and` filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFilter {
    pub and: Vec<PropertyFilter>,
}

/// A filter on one named property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyFilter {
    pub property: String,
    #[serde(flatten)]
    pub condition: FilterCondition,
}

/// Condition keyed by the property type, e.g. `{"status": {"equals": "Published"}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    Status { equals: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySort {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Descending,
}

/// Minimal page reference returned by a listing query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageStub {
    pub id: String,
}

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListResponse<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Error body returned by the Notion API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// A full page object from `GET /pages/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageRecord {
    pub id: String,
    /// Raw creation timestamp; parsed by the consumer.
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, deserialize_with = "lenient_properties")]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl PageRecord {
    /// Look up a property by its exact name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// Database metadata from `GET /databases/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSchema {
    pub id: String,
    #[serde(default)]
    pub title: Vec<RichText>,
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaProperty>,
}

impl DatabaseSchema {
    pub fn title_text(&self) -> String {
        plain_text(&self.title)
    }
}

/// One column of a database schema.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaProperty {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// A decoded page property, tagged by Notion's `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title { title: Vec<RichText> },
    RichText { rich_text: Vec<RichText> },
    Formula { formula: FormulaValue },
    Files { files: Vec<FileObject> },
    People { people: Vec<Person> },
    MultiSelect { multi_select: Vec<SelectOption> },
    Select { select: Option<SelectOption> },
    Status { status: Option<SelectOption> },
    Date { date: Option<DateValue> },
    Url { url: Option<String> },
    Checkbox { checkbox: bool },
    Number { number: Option<f64> },
    CreatedTime { created_time: String },
    LastEditedTime { last_edited_time: String },
    /// Unknown property type, or a known type with an unexpected shape.
    #[serde(other)]
    Unsupported,
}

/// Result of a formula property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaValue {
    String { string: Option<String> },
    Number { number: Option<f64> },
    Boolean { boolean: Option<bool> },
    Date { date: Option<DateValue> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectOption {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A Notion date value; `start` is either a date or a date-time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateValue {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// A file reference, used by `files` properties and media blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileObject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub caption: Vec<RichText>,
    #[serde(flatten)]
    pub source: FileSource,
}

/// Where a file lives: uploaded to Notion, or linked externally.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSource {
    File { file: HostedFile },
    External { external: ExternalFile },
}

impl FileSource {
    pub fn url(&self) -> &str {
        match self {
            Self::File { file } => &file.url,
            Self::External { external } => &external.url,
        }
    }
}

/// A Notion-hosted upload; the URL is signed and expires.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostedFile {
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalFile {
    pub url: String,
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// One styled run of text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RichText {
    #[serde(rename = "type", default)]
    pub kind: RichTextKind,
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RichTextKind {
    #[default]
    Text,
    Mention,
    Equation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
}

/// Concatenate the plain text of every run.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|r| r.plain_text.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

fn lenient_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, PropertyValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let decoded = PropertyValue::deserialize(&value).unwrap_or_else(|e| {
                debug!(property = %name, error = %e, "undecodable property, treating as unsupported");
                PropertyValue::Unsupported
            });
            (name, decoded)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/notion")
            .join(name);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    #[test]
    fn published_query_body_matches_notion_shape() {
        let body = serde_json::to_value(DatabaseQuery::published()).expect("serialize");
        assert_eq!(
            body,
            json!({
                "filter": {"and": [{"property": "Status", "status": {"equals": "Published"}}]},
                "sorts": [{"property": "Created time", "direction": "descending"}],
            })
        );
    }

    #[test]
    fn page_fixture_decodes_every_known_property() {
        let page: PageRecord = serde_json::from_str(&fixture("page_full.json")).expect("decode");

        match page.property("Title") {
            Some(PropertyValue::Title { title }) => assert_eq!(plain_text(title), "Hello World!"),
            other => panic!("unexpected Title: {other:?}"),
        }
        assert!(matches!(
            page.property("Slug"),
            Some(PropertyValue::Formula { formula: FormulaValue::String { string: Some(_) } })
        ));
        assert!(matches!(page.property("Featured Image"), Some(PropertyValue::Files { files }) if files.len() == 1));
        assert!(matches!(page.property("Tags"), Some(PropertyValue::MultiSelect { multi_select }) if multi_select.len() == 2));
        assert!(matches!(page.property("Status"), Some(PropertyValue::Status { status: Some(_) })));
    }

    #[test]
    fn malformed_property_does_not_fail_the_page() {
        let page: PageRecord = serde_json::from_value(json!({
            "id": "p1",
            "created_time": "2024-01-01T00:00:00.000Z",
            "properties": {
                "Tags": {"id": "t", "type": "multi_select", "multi_select": "oops"},
                "Weird": {"id": "w", "type": "button", "button": {}},
                "Category": {"id": "c", "type": "select", "select": null}
            }
        }))
        .expect("decode");

        assert_eq!(page.property("Tags"), Some(&PropertyValue::Unsupported));
        assert_eq!(page.property("Weird"), Some(&PropertyValue::Unsupported));
        assert_eq!(
            page.property("Category"),
            Some(&PropertyValue::Select { select: None })
        );
    }

    #[test]
    fn page_without_id_is_rejected() {
        let result: Result<PageRecord, _> =
            serde_json::from_value(json!({"created_time": "2024-01-01T00:00:00.000Z"}));
        assert!(result.is_err());
    }

    #[test]
    fn file_sources_expose_their_url() {
        let hosted: FileObject = serde_json::from_value(json!({
            "name": "cover.png",
            "type": "file",
            "file": {"url": "https://s3.example.com/cover.png", "expiry_time": "2024-01-01T01:00:00.000Z"}
        }))
        .expect("decode");
        assert_eq!(hosted.source.url(), "https://s3.example.com/cover.png");

        let external: FileObject = serde_json::from_value(json!({
            "type": "external",
            "external": {"url": "https://img.example.com/a.jpg"}
        }))
        .expect("decode");
        assert_eq!(external.source.url(), "https://img.example.com/a.jpg");
    }

    #[test]
    fn rich_text_defaults_missing_annotations() {
        let run: RichText =
            serde_json::from_value(json!({"type": "text", "plain_text": "hi"})).expect("decode");
        assert_eq!(run.annotations, Annotations::default());
        assert_eq!(run.kind, RichTextKind::Text);
    }
}
