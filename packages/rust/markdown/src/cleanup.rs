//! Post-render cleanup pipeline for flattened Markdown.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Fenced code blocks are left untouched by the blank-line pass.

/// Run the full cleanup pipeline on rendered Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = trim_document(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize whitespace
// ---------------------------------------------------------------------------

/// Strip trailing whitespace outside code fences and normalize line endings.
fn normalize_whitespace(md: &str) -> String {
    let mut in_code_block = false;

    md.lines()
        .map(|line| {
            let fence = is_fence(line);
            let protected = in_code_block || fence;
            if fence {
                in_code_block = !in_code_block;
            }
            if protected { line } else { line.trim_end() }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// ---------------------------------------------------------------------------
// Pass 2: Clean up excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly 1, outside code fences.
fn clean_blank_lines(md: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_code_block = false;
    let mut previous_blank = false;

    for line in md.lines() {
        if is_fence(line) {
            in_code_block = !in_code_block;
        }

        let blank = line.is_empty();
        if blank && previous_blank && !in_code_block {
            continue;
        }
        previous_blank = blank;
        lines.push(line);
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Trim the document
// ---------------------------------------------------------------------------

/// Drop leading and trailing blank lines.
fn trim_document(md: &str) -> String {
    md.trim_matches('\n').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
