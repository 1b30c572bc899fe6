//! Block-tree-to-Markdown flattening and text metrics.
//!
//! Converts a Notion page body (a tree of [`Block`]s) into one Markdown
//! string, then applies a series of cleanup passes to normalize whitespace.
//! Also hosts the word counter and the frontmatter builder used by the CLI.

mod cleanup;

use std::sync::LazyLock;

use notionblog_notion::blocks::{Block, BlockKind, TableBlock};
use notionblog_notion::model::{FileObject, RichText, RichTextKind};
use notionblog_notion::plain_text;
use regex::Regex;
use tracing::{debug, instrument, trace};

/// Indentation applied to children of list items.
const LIST_INDENT: &str = "    ";

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Flatten a block tree into clean Markdown.
///
/// Sibling blocks are separated by a blank line, except consecutive list
/// items which stay on adjacent lines. Unsupported blocks render as nothing.
#[instrument(skip_all, fields(blocks = blocks.len()))]
pub fn render_blocks(blocks: &[Block]) -> String {
    let raw = render_siblings(blocks);
    let cleaned = cleanup::run_pipeline(&raw);
    debug!(raw_len = raw.len(), final_len = cleaned.len(), "blocks flattened");
    cleaned
}

fn render_siblings(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_was_list = false;
    let mut number = 0usize;

    for block in blocks {
        number = match block.kind {
            BlockKind::NumberedListItem { .. } => number + 1,
            _ => 0,
        };

        let rendered = render_block(block, number);
        if rendered.is_empty() {
            trace!(block_id = %block.id, "block rendered empty, skipping");
            continue;
        }

        let is_list = is_list_item(&block.kind);
        if !out.is_empty() {
            out.push_str(if is_list && previous_was_list { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        previous_was_list = is_list;
    }

    out
}

fn is_list_item(kind: &BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::BulletedListItem { .. }
            | BlockKind::NumberedListItem { .. }
            | BlockKind::ToDo { .. }
    )
}

/// Render one block; `number` is its position in a run of numbered items.
fn render_block(block: &Block, number: usize) -> String {
    match &block.kind {
        BlockKind::Paragraph { paragraph } => {
            append_children(render_rich_text(&paragraph.rich_text), block)
        }
        BlockKind::Heading1 { heading_1 } => heading(1, &heading_1.rich_text, block),
        BlockKind::Heading2 { heading_2 } => heading(2, &heading_2.rich_text, block),
        BlockKind::Heading3 { heading_3 } => heading(3, &heading_3.rich_text, block),
        BlockKind::BulletedListItem { bulleted_list_item } => {
            list_item("- ", &bulleted_list_item.rich_text, block)
        }
        BlockKind::NumberedListItem { numbered_list_item } => {
            list_item(&format!("{number}. "), &numbered_list_item.rich_text, block)
        }
        BlockKind::ToDo { to_do } => {
            let marker = if to_do.checked { "- [x] " } else { "- [ ] " };
            list_item(marker, &to_do.rich_text, block)
        }
        BlockKind::Toggle { toggle } => {
            let summary = render_rich_text(&toggle.rich_text);
            let children = render_siblings(&block.children);
            format!("<details>\n<summary>{summary}</summary>\n\n{children}\n</details>")
        }
        BlockKind::Quote { quote } => {
            let body = append_children(render_rich_text(&quote.rich_text), block);
            blockquote(&body)
        }
        BlockKind::Callout { callout } => {
            let text = render_rich_text(&callout.rich_text);
            let text = match &callout.icon {
                Some(notionblog_notion::blocks::Icon::Emoji { emoji }) => format!("{emoji} {text}"),
                _ => text,
            };
            blockquote(&append_children(text, block))
        }
        BlockKind::Code { code } => {
            let language = code_language(&code.language);
            format!("```{language}\n{}\n```", plain_text(&code.rich_text))
        }
        BlockKind::Equation { equation } => {
            if equation.expression.trim().is_empty() {
                String::new()
            } else {
                format!("$$\n{}\n$$", equation.expression.trim())
            }
        }
        BlockKind::Divider {} => "---".to_string(),
        BlockKind::Image { image } => {
            let alt = plain_text(&image.caption);
            format!("![{alt}]({})", image.source.url())
        }
        BlockKind::Video { video } => file_link(video),
        BlockKind::File { file } => file_link(file),
        BlockKind::Pdf { pdf } => file_link(pdf),
        BlockKind::Bookmark { bookmark } => link(&bookmark.url, &bookmark.caption),
        BlockKind::Embed { embed } => link(&embed.url, &embed.caption),
        BlockKind::LinkPreview { link_preview } => link(&link_preview.url, &link_preview.caption),
        BlockKind::ChildPage { child_page } => bold_title(&child_page.title),
        BlockKind::ChildDatabase { child_database } => bold_title(&child_database.title),
        BlockKind::Table { table } => render_table(table, &block.children),
        BlockKind::TableRow { table_row: row } => {
            table_row(&row.cells.iter().map(|cell| table_cell(cell)).collect::<Vec<_>>())
        }
        BlockKind::ColumnList {} | BlockKind::Column {} | BlockKind::SyncedBlock {} => {
            render_siblings(&block.children)
        }
        BlockKind::Unsupported => String::new(),
    }
}

fn heading(level: usize, runs: &[RichText], block: &Block) -> String {
    let text = render_rich_text(runs);
    if text.trim().is_empty() {
        return render_siblings(&block.children);
    }
    append_children(format!("{} {text}", "#".repeat(level)), block)
}

fn list_item(marker: &str, runs: &[RichText], block: &Block) -> String {
    let mut item = format!("{marker}{}", render_rich_text(runs));
    let children = render_siblings(&block.children);
    if !children.is_empty() {
        item.push('\n');
        item.push_str(&indent(&children, LIST_INDENT));
    }
    item
}

/// Append rendered children after `text`, separated by a blank line.
fn append_children(text: String, block: &Block) -> String {
    let children = render_siblings(&block.children);
    match (text.is_empty(), children.is_empty()) {
        (_, true) => text,
        (true, false) => children,
        (false, false) => format!("{text}\n\n{children}"),
    }
}

fn blockquote(body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    body.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map Notion's language names to fence info strings.
fn code_language(language: &str) -> String {
    match language.trim() {
        "" | "plain text" => String::new(),
        other => other.to_lowercase().replace(' ', "-"),
    }
}

fn file_link(file: &FileObject) -> String {
    let url = file.source.url();
    let caption = plain_text(&file.caption);
    let label = if !caption.trim().is_empty() {
        caption
    } else {
        file.name.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| url.to_string())
    };
    format!("[{label}]({url})")
}

fn link(url: &str, caption: &[RichText]) -> String {
    if url.trim().is_empty() {
        return String::new();
    }
    let caption = plain_text(caption);
    let label = if caption.trim().is_empty() { url } else { caption.as_str() };
    format!("[{label}]({url})")
}

fn bold_title(title: &str) -> String {
    if title.trim().is_empty() {
        String::new()
    } else {
        format!("**{}**", title.trim())
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Render a table block from its `table_row` children.
fn render_table(table: &TableBlock, rows: &[Block]) -> String {
    let mut cells: Vec<Vec<String>> = rows
        .iter()
        .filter_map(|row| match &row.kind {
            BlockKind::TableRow { table_row } => {
                Some(table_row.cells.iter().map(|c| table_cell(c)).collect())
            }
            _ => None,
        })
        .collect();

    if cells.is_empty() {
        return String::new();
    }

    // Determine column count from the widest row
    let col_count = cells
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(table.table_width);
    if col_count == 0 {
        return String::new();
    }

    // Normalize all rows to have the same number of columns
    for row in &mut cells {
        row.resize(col_count, String::new());
    }

    let (header, body) = if table.has_column_header {
        let mut rows = cells.into_iter();
        let header = rows.next().unwrap_or_default();
        (header, rows.collect::<Vec<_>>())
    } else {
        (vec![String::new(); col_count], cells)
    };

    let mut md = vec![table_row(&header)];
    md.push(table_row(&vec!["---".to_string(); col_count]));
    md.extend(body.iter().map(|row| table_row(row)));
    md.join("\n")
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn table_cell(runs: &[RichText]) -> String {
    render_rich_text(runs).replace('|', "\\|").replace('\n', " ")
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// Render styled text runs as inline Markdown.
pub fn render_rich_text(runs: &[RichText]) -> String {
    runs.iter().map(render_run).collect()
}

fn render_run(run: &RichText) -> String {
    let text = run.plain_text.as_str();
    let core = text.trim();
    if core.is_empty() {
        return text.to_string();
    }

    // Markers wrap the trimmed text; surrounding whitespace stays outside.
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];

    let mut styled = if run.kind == RichTextKind::Equation {
        format!("${core}$")
    } else if run.annotations.code {
        format!("`{core}`")
    } else {
        core.to_string()
    };

    if run.annotations.strikethrough {
        styled = format!("~~{styled}~~");
    }
    if run.annotations.italic {
        styled = format!("_{styled}_");
    }
    if run.annotations.bold {
        styled = format!("**{styled}**");
    }
    if let Some(href) = run.href.as_deref().filter(|h| !h.is_empty()) {
        styled = format!("[{styled}]({href})");
    }

    format!("{lead}{styled}{trail}")
}

// ---------------------------------------------------------------------------
// Text metrics
// ---------------------------------------------------------------------------

/// Count words in flattened text.
///
/// Every character that is neither a word character nor whitespace becomes a
/// space, then the remaining whitespace-separated segments are counted. Empty,
/// whitespace-only, and punctuation-only input count as 0.
pub fn count_words(text: &str) -> usize {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

    NON_WORD_RE.replace_all(text, " ").split_whitespace().count()
}

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

/// Build a YAML frontmatter block from scalar fields and string lists.
pub fn build_frontmatter(fields: &[(&str, &str)], lists: &[(&str, &[String])]) -> String {
    let mut fm = String::from("---\n");
    for (key, value) in fields {
        fm.push_str(&format!("{key}: \"{}\"\n", escape_yaml_string(value)));
    }
    for (key, values) in lists {
        let items = values
            .iter()
            .map(|v| format!("\"{}\"", escape_yaml_string(v)))
            .collect::<Vec<_>>()
            .join(", ");
        fm.push_str(&format!("{key}: [{items}]\n"));
    }
    fm.push_str("---\n");
    fm
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
