//! Block tree model for page bodies.
//!
//! A page body is a list of blocks; blocks with `has_children` own a nested
//! list fetched separately. Unknown or malformed block types decode to
//! [`BlockKind::Unsupported`] so one odd block never loses the page.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::model::{FileObject, RichText};

/// One node of a page's block tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    pub has_children: bool,
    pub kind: BlockKind,
    /// Filled in by the client after a follow-up children request.
    pub children: Vec<Block>,
}

impl Block {
    /// Build a childless block, mostly for tests and fakes.
    pub fn new(kind: BlockKind) -> Self {
        Self {
            id: String::new(),
            has_children: false,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.has_children = !children.is_empty();
        self.children = children;
        self
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let has_children = value
            .get("has_children")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let kind = BlockKind::deserialize(&value).unwrap_or_else(|e| {
            debug!(block_id = %id, error = %e, "undecodable block, treating as unsupported");
            BlockKind::Unsupported
        });

        Ok(Self {
            id,
            has_children,
            kind,
            children: Vec::new(),
        })
    }
}

/// Block payload, tagged by Notion's `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph {
        paragraph: TextBlock,
    },
    #[serde(rename = "heading_1")]
    Heading1 {
        heading_1: TextBlock,
    },
    #[serde(rename = "heading_2")]
    Heading2 {
        heading_2: TextBlock,
    },
    #[serde(rename = "heading_3")]
    Heading3 {
        heading_3: TextBlock,
    },
    BulletedListItem {
        bulleted_list_item: TextBlock,
    },
    NumberedListItem {
        numbered_list_item: TextBlock,
    },
    ToDo {
        to_do: ToDoBlock,
    },
    Toggle {
        toggle: TextBlock,
    },
    Quote {
        quote: TextBlock,
    },
    Callout {
        callout: CalloutBlock,
    },
    Code {
        code: CodeBlock,
    },
    Equation {
        equation: EquationBlock,
    },
    Divider {},
    Image {
        image: FileObject,
    },
    Video {
        video: FileObject,
    },
    File {
        file: FileObject,
    },
    Pdf {
        pdf: FileObject,
    },
    Bookmark {
        bookmark: LinkBlock,
    },
    Embed {
        embed: LinkBlock,
    },
    LinkPreview {
        link_preview: LinkBlock,
    },
    ChildPage {
        child_page: TitledBlock,
    },
    ChildDatabase {
        child_database: TitledBlock,
    },
    Table {
        table: TableBlock,
    },
    TableRow {
        table_row: TableRowBlock,
    },
    ColumnList {},
    Column {},
    SyncedBlock {},
    #[serde(other)]
    Unsupported,
}

impl BlockKind {
    /// Whether the client should fetch this block's children.
    ///
    /// Child pages and databases are separate documents, not body content.
    pub fn descends(&self) -> bool {
        !matches!(
            self,
            Self::ChildPage { .. } | Self::ChildDatabase { .. } | Self::Unsupported
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToDoBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CalloutBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub icon: Option<Icon>,
}

/// Page or callout icon; only emoji icons render as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    Emoji { emoji: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EquationBlock {
    #[serde(default)]
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkBlock {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TitledBlock {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableBlock {
    #[serde(default)]
    pub table_width: usize,
    #[serde(default)]
    pub has_column_header: bool,
    #[serde(default)]
    pub has_row_header: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableRowBlock {
    #[serde(default)]
    pub cells: Vec<Vec<RichText>>,
}
