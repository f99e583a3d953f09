//! In-memory edits for text, JSON and XML documents.
//!
//! The file handlers read a document, apply one of these pure transforms and
//! write the result back, so everything here is testable without a disk.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use salvo_script::payload::{FileEdit, Replacement};
use salvo_types::value::{display_string, parse_path, set_path};
use salvo_types::{Result, SalvoError};
use serde_json::Value;

/// Apply `_.set`-style edits to a JSON document and pretty-print it (two spaces).
pub fn edit_json(text: &str, edits: &[FileEdit]) -> Result<String> {
    let mut doc: Value = serde_json::from_str(text)
        .map_err(|e| SalvoError::capability("json", format!("cannot parse document: {}", e)))?;
    for edit in edits {
        set_path(&mut doc, &parse_path(&edit.path), edit.value.clone())
            .map_err(|e| SalvoError::capability("json", format!("cannot set '{}': {}", edit.path, e)))?;
    }
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Apply each replacement across the whole text, in order.
///
/// Literal search strings replace every occurrence; `regex: true` treats the
/// search as a pattern and allows `$1`-style group references in the replacement.
pub fn replace_text(text: &str, replacements: &[Replacement]) -> Result<String> {
    let mut out = text.to_string();
    for r in replacements {
        if r.from.is_empty() {
            continue;
        }
        out = if r.regex {
            let re = Regex::new(&r.from).map_err(|e| {
                SalvoError::capability("replace_text", format!("invalid pattern '{}': {}", r.from, e))
            })?;
            re.replace_all(&out, r.to.as_str()).into_owned()
        } else {
            out.replace(&r.from, &r.to)
        };
    }
    Ok(out)
}

/// A parsed XML edit path: element steps from the root, then an optional attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
struct XmlPath {
    steps: Vec<(String, usize)>,
    attribute: Option<String>,
}

/// Parse `root.child[1].leaf@attr`. A step without an index means the first
/// element of that name under its parent.
fn parse_xml_path(path: &str) -> Result<XmlPath> {
    let (elements, attribute) = match path.rsplit_once('@') {
        Some((elements, attr)) if !attr.is_empty() => (elements, Some(attr.to_string())),
        _ => (path, None),
    };
    let mut steps = Vec::new();
    for raw in elements.split('.').filter(|s| !s.is_empty()) {
        let step = match raw.split_once('[') {
            Some((name, rest)) => {
                let index = rest
                    .trim_end_matches(']')
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| SalvoError::capability("xml", format!("bad index in path '{}'", path)))?;
                (name.to_string(), index)
            }
            None => (raw.to_string(), 0),
        };
        steps.push(step);
    }
    if steps.is_empty() {
        return Err(SalvoError::capability("xml", format!("empty path '{}'", path)));
    }
    Ok(XmlPath { steps, attribute })
}

fn xml_err(e: impl std::fmt::Display) -> SalvoError {
    SalvoError::capability("xml", e.to_string())
}

/// Apply each edit in order: set the text content of the addressed element,
/// or one of its attributes when the path ends in `@attr`.
pub fn edit_xml(text: &str, edits: &[FileEdit]) -> Result<String> {
    let mut doc = text.to_string();
    for edit in edits {
        let path = parse_xml_path(&edit.path)?;
        doc = apply_xml_edit(&doc, &path, &display_string(&edit.value))
            .map_err(|e| match e {
                SalvoError::Capability { message, .. } => {
                    SalvoError::capability("xml", format!("{} ({})", message, edit.path))
                }
                other => other,
            })?;
    }
    Ok(doc)
}

fn with_attribute(start: &BytesStart<'_>, attr: &str, value: &str) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut rebuilt = BytesStart::new(name);
    let mut replaced = false;
    for existing in start.attributes() {
        let existing = existing.map_err(xml_err)?;
        if existing.key.as_ref() == attr.as_bytes() {
            rebuilt.push_attribute((attr, value));
            replaced = true;
        } else {
            rebuilt.push_attribute(existing);
        }
    }
    if !replaced {
        rebuilt.push_attribute((attr, value));
    }
    Ok(rebuilt.into_owned())
}

fn apply_xml_edit(text: &str, path: &XmlPath, value: &str) -> Result<String> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    // Per open element: how many children of each name have been seen.
    let mut stack: Vec<HashMap<String, usize>> = vec![HashMap::new()];
    // Matched (name, index) prefix depth of the currently open elements.
    let mut trail: Vec<(String, usize)> = Vec::new();
    let mut skip_depth: Option<usize> = None;
    let mut found = false;

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        if let Some(depth) = skip_depth {
            match &event {
                Event::Start(_) => skip_depth = Some(depth + 1),
                Event::End(_) if depth == 0 => {
                    skip_depth = None;
                    writer.write_event(event.clone()).map_err(xml_err)?;
                    trail.pop();
                    stack.pop();
                }
                Event::End(_) => skip_depth = Some(depth - 1),
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let counts = stack.last_mut().ok_or_else(|| xml_err("unbalanced document"))?;
                let counter = counts.entry(name.clone()).or_insert(0);
                let index = *counter;
                *counter += 1;
                trail.push((name, index));

                let is_target = !found && trail == path.steps;
                match (&path.attribute, is_target) {
                    (Some(attr), true) => {
                        found = true;
                        let rebuilt = with_attribute(start, attr, value)?;
                        let rebuilt = if is_empty {
                            Event::Empty(rebuilt)
                        } else {
                            Event::Start(rebuilt)
                        };
                        writer.write_event(rebuilt).map_err(xml_err)?;
                    }
                    (None, true) => {
                        found = true;
                        writer
                            .write_event(Event::Start(start.to_owned()))
                            .map_err(xml_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(value)))
                            .map_err(xml_err)?;
                        if is_empty {
                            writer
                                .write_event(Event::End(start.to_end().into_owned()))
                                .map_err(xml_err)?;
                        } else {
                            stack.push(HashMap::new());
                            skip_depth = Some(0);
                            continue;
                        }
                    }
                    _ => {
                        writer.write_event(event.clone()).map_err(xml_err)?;
                    }
                }
                if is_empty {
                    trail.pop();
                } else {
                    stack.push(HashMap::new());
                }
            }
            Event::End(_) => {
                writer.write_event(event).map_err(xml_err)?;
                trail.pop();
                stack.pop();
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }

    if !found {
        return Err(SalvoError::capability("xml", "path not found"));
    }
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}
