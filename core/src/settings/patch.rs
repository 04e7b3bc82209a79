//! Target-list patching for `settings.yaml`.
//!
//! The preferred path edits the raw text in place so that comments, key order
//! and quoting of every other field survive byte-for-byte. When the field
//! cannot be located unambiguously (missing section, anchors, multi-line flow
//! sequences, ...) the patch falls back to a value-level merge: parse, set the
//! one field, re-serialize. Either way the result is re-parsed and checked
//! against the original before it is returned.

use serde_yaml::Value;

use super::document::{ConfigDocument, TargetPath};
use crate::error::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Empty input: the document was returned untouched.
    Unchanged,
    /// Only the bytes of the target list changed.
    Surgical,
    /// The document was re-serialized; comments and formatting may be lost.
    Merged,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub document: ConfigDocument,
    pub mode: PatchMode,
}

/// Trims each name and rejects empty names or names with a path separator.
/// Order and duplicates are kept.
pub fn validate_names(names: &[String]) -> Result<Vec<String>, SettingsError> {
    names
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let name = raw.trim();
            if name.is_empty() {
                return Err(SettingsError::Validation(format!(
                    "target #{} is empty",
                    idx + 1
                )));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(SettingsError::Validation(format!(
                    "target `{name}` contains a path separator"
                )));
            }
            Ok(name.to_string())
        })
        .collect()
}

/// Splits comma-separated operator input into names. Blank entries are skipped,
/// so an empty input field yields an empty list (and therefore a no-op patch).
pub fn parse_targets_input(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn patch_target_list(
    doc: &ConfigDocument,
    path: &TargetPath,
    names: &[String],
) -> Result<PatchOutcome, SettingsError> {
    if names.is_empty() {
        return Ok(PatchOutcome {
            document: doc.clone(),
            mode: PatchMode::Unchanged,
        });
    }
    let names = validate_names(names)?;

    if let Some(text) = surgical_patch(doc.raw(), path, &names) {
        match ConfigDocument::parse(text) {
            Ok(patched) if only_target_changed(doc, &patched, path, &names) => {
                return Ok(PatchOutcome {
                    document: patched,
                    mode: PatchMode::Surgical,
                });
            }
            Ok(_) => {
                tracing::debug!(target_path = %path, "text patch changed more than the target list");
            }
            Err(e) => {
                tracing::debug!(target_path = %path, error = %e, "text patch produced invalid YAML");
            }
        }
    }

    tracing::warn!(
        target_path = %path,
        "target list could not be patched in place; re-serializing settings (comments are not kept)"
    );
    let merged = doc.with_targets(path, &names)?;
    let text = serde_yaml::to_string(&merged).map_err(|e| SettingsError::Serialize(e.to_string()))?;
    // Re-render the list itself so its quoting matches the in-place path.
    let text = surgical_patch(&text, path, &names).unwrap_or(text);
    let patched = ConfigDocument::parse(text)?;
    if !only_target_changed(doc, &patched, path, &names) {
        return Err(SettingsError::Serialize(format!(
            "re-serialized settings no longer match outside `{path}`"
        )));
    }
    Ok(PatchOutcome {
        document: patched,
        mode: PatchMode::Merged,
    })
}

fn only_target_changed(
    before: &ConfigDocument,
    after: &ConfigDocument,
    path: &TargetPath,
    names: &[String],
) -> bool {
    if after.targets(path).as_deref() != Some(names) {
        return false;
    }
    let old_rest = before.rest(path);
    let new_rest = after.rest(path);
    old_rest == new_rest || normalized(&old_rest) == normalized(&new_rest)
}

/// Drops null and empty-mapping entries so that parent sections created by a
/// merge compare equal to their absence.
fn normalized(v: &Value) -> Value {
    match v {
        Value::Mapping(m) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in m {
                let nv = normalized(v);
                if !nv.is_null() {
                    out.insert(k.clone(), nv);
                }
            }
            if out.is_empty() {
                Value::Null
            } else {
                Value::Mapping(out)
            }
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Text-level patch
// ---------------------------------------------------------------------------

struct Line<'a> {
    start: usize,
    /// Line content without its terminator.
    text: &'a str,
    /// Byte offset just past the terminator.
    end: usize,
}

impl Line<'_> {
    fn indent(&self) -> usize {
        self.text.len() - self.text.trim_start_matches(' ').len()
    }

    fn body(&self) -> &str {
        self.text.trim_start_matches(' ')
    }

    fn is_content(&self) -> bool {
        let b = self.body().trim_end();
        !b.is_empty() && !b.starts_with('#')
    }
}

fn split_lines(raw: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for piece in raw.split_inclusive('\n') {
        let end = start + piece.len();
        let text = piece
            .strip_suffix('\n')
            .map(|t| t.strip_suffix('\r').unwrap_or(t))
            .unwrap_or(piece);
        out.push(Line { start, text, end });
        start = end;
    }
    out
}

/// Rewrites only the bytes of the list at `path`. `None` when the field cannot
/// be located with certainty.
fn surgical_patch(raw: &str, path: &TargetPath, names: &[String]) -> Option<String> {
    let lines = split_lines(raw);
    let mut first = None;
    for (i, l) in lines.iter().enumerate() {
        if !l.is_content() {
            continue;
        }
        let b = l.body();
        if l.indent() == 0 && (b.starts_with("---") || b.starts_with("...")) {
            if first.is_some() || b.starts_with("...") {
                // Multi-document streams are left to the merge path.
                return None;
            }
            continue;
        }
        if first.is_none() {
            first = Some(i);
        }
    }
    let first = first?;
    let newline = if raw.contains("\r\n") { "\r\n" } else { "\n" };

    let (mut from, mut to) = (first, lines.len());
    let mut key_line = None;
    for seg in path.segments() {
        let idx = find_key(&lines, from, to, seg)?;
        let indent = lines[idx].indent();
        key_line = Some(idx);
        from = idx + 1;
        to = block_end(&lines, idx, indent);
    }
    let idx = key_line?;
    let line = &lines[idx];
    let (_, after_colon) = split_key(line.body())?;
    let after_colon_offset = line.start + line.text.len() - after_colon.len();
    let (value, _comment) = split_comment(after_colon);
    let value_trimmed = value.trim();

    let flow = render_flow(names);
    let mut out = String::with_capacity(raw.len() + flow.len());

    if !value_trimmed.is_empty() {
        let replace_end = if value_trimmed.starts_with('[') {
            let close = flow_close(value)?;
            if !value[close + 1..].trim().is_empty() {
                return None;
            }
            close + 1
        } else if matches!(value_trimmed, "null" | "~" | "Null" | "NULL") {
            value.trim_end().len()
        } else {
            return None;
        };
        // Nested lines under an inline value would be a YAML error anyway.
        if from < to && lines[from..to].iter().any(Line::is_content) {
            return None;
        }
        out.push_str(&raw[..after_colon_offset]);
        out.push(' ');
        out.push_str(&flow);
        out.push_str(&raw[after_colon_offset + replace_end..]);
        return Some(out);
    }

    // Block form: the value lives on the following lines.
    let value_lines: Vec<&Line<'_>> = lines[from..to].iter().filter(|l| l.is_content()).collect();
    if value_lines.is_empty() {
        // `key:` with no value (null): write a flow list after the colon.
        out.push_str(&raw[..after_colon_offset]);
        out.push(' ');
        out.push_str(&flow);
        out.push_str(&raw[after_colon_offset..]);
        return Some(out);
    }
    let first_item = value_lines[0];
    if !is_seq_item(first_item.body()) {
        return None;
    }
    let item_indent = first_item.indent();
    if value_lines
        .iter()
        .any(|l| l.indent() < item_indent || (l.indent() == item_indent && !is_seq_item(l.body())))
    {
        return None;
    }
    let last = value_lines.last()?;
    let span_start = first_item.start;
    let span_end = last.end;
    let ends_with_newline = raw[..span_end].ends_with('\n');
    // Comment and blank lines between the old items move below the new ones.
    let interior: String = lines[from..to]
        .iter()
        .filter(|l| !l.is_content() && l.start > span_start && l.end <= span_end)
        .map(|l| &raw[l.start..l.end])
        .collect();

    let pad = " ".repeat(item_indent);
    let mut block = names
        .iter()
        .map(|n| format!("{pad}- {}", render_scalar(n)))
        .collect::<Vec<_>>()
        .join(newline);
    block.push_str(newline);
    block.push_str(&interior);
    if !ends_with_newline {
        let trimmed = block.trim_end_matches(['\r', '\n']).len();
        block.truncate(trimmed);
    }
    out.push_str(&raw[..span_start]);
    out.push_str(&block);
    out.push_str(&raw[span_end..]);
    Some(out)
}

/// First line in `[from, to)` that is a mapping key named `key` at the block's
/// own indentation.
fn find_key(lines: &[Line<'_>], from: usize, to: usize, key: &str) -> Option<usize> {
    let mut level = None;
    for (i, line) in lines.iter().enumerate().take(to).skip(from) {
        if !line.is_content() {
            continue;
        }
        let indent = line.indent();
        match level {
            None => level = Some(indent),
            Some(l) if indent < l => return None,
            Some(l) if indent > l => continue,
            _ => {}
        }
        if is_seq_item(line.body()) {
            // Items of a sibling list written at the key's own indentation.
            continue;
        }
        let (k, _) = split_key(line.body())?;
        if k == key {
            return Some(i);
        }
    }
    None
}

/// Index one past the last line belonging to the value of the key at `idx`.
fn block_end(lines: &[Line<'_>], idx: usize, indent: usize) -> usize {
    let mut end = idx + 1;
    for (i, line) in lines.iter().enumerate().skip(idx + 1) {
        if !line.is_content() {
            continue;
        }
        let li = line.indent();
        if li > indent || (li == indent && is_seq_item(line.body())) {
            end = i + 1;
        } else {
            break;
        }
    }
    end
}

fn is_seq_item(body: &str) -> bool {
    body == "-" || body.starts_with("- ")
}

/// Splits `key: rest` into the unquoted key and everything after the colon.
fn split_key(body: &str) -> Option<(String, &str)> {
    if is_seq_item(body) || body.starts_with('?') {
        return None;
    }
    let (key, rest) = match body.chars().next()? {
        q @ ('"' | '\'') => {
            let close = body[1..].find(q)? + 1;
            let key = body[1..close].to_string();
            let rest = body[close + 1..].strip_prefix(':')?;
            (key, rest)
        }
        _ => {
            let mut search = 0;
            loop {
                let pos = body[search..].find(':')? + search;
                let next = body[pos + 1..].chars().next();
                if next.is_none() || next == Some(' ') || next == Some('\t') {
                    break (body[..pos].trim_end().to_string(), &body[pos + 1..]);
                }
                search = pos + 1;
            }
        }
    };
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((key, rest))
}

/// Separates a trailing `# comment` from a value, respecting quotes.
fn split_comment(s: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_ws => return (&s[..i], &s[i..]),
            None => {}
        }
        prev_ws = c == ' ' || c == '\t';
    }
    (s, "")
}

/// Byte index of the `]` closing the flow sequence that starts `s`, if it
/// closes on this line.
fn flow_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return (c == ']').then_some(i);
                    }
                }
                '&' | '*' | '!' if depth <= 1 => return None,
                _ => {}
            },
        }
    }
    None
}

fn render_flow(names: &[String]) -> String {
    let items = names
        .iter()
        .map(|n| render_scalar(n))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{items}]")
}

/// Plain scalar when it reads back as the same string, JSON-style quoted otherwise.
///
/// The pipeline loads the file with a YAML 1.1 parser, so words such as `yes`
/// or `off` and numbers written with `_` are quoted even though YAML 1.2 would
/// read them as strings.
fn render_scalar(name: &str) -> String {
    let plain_chars = name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
    let plain_start = name
        .chars()
        .next()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false);
    if plain_chars && plain_start && !yaml11_non_string(name) {
        if let Ok(Value::String(s)) = serde_yaml::from_str::<Value>(name) {
            if s == name {
                return name.to_string();
            }
        }
    }
    serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""))
}

/// Plain scalars a YAML 1.1 loader resolves to something other than a string.
fn yaml11_non_string(s: &str) -> bool {
    const WORDS: [&str; 10] = ["y", "n", "yes", "no", "on", "off", "true", "false", "null", "~"];
    if WORDS.iter().any(|w| s.eq_ignore_ascii_case(w)) {
        return true;
    }
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let numeric_start = body
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '.')
        .unwrap_or(false);
    // Binary, octal, hex, sexagesimal and `_`-grouped forms are all numbers in 1.1.
    numeric_start
        && body
            .chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '_' | '.' | ':' | 'x' | 'X' | 'o' | 'O' | '+' | '-'))
}
