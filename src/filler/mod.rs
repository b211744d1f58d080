// XML form filler
//
// Mutates only the targeted text runs of the original archive. Multi
// paragraph content is expanded by cloning the anchor paragraph's XML, so
// the original font and indentation carry over instead of being reset.
// Every splice is tag-balance checked before commit: a bad field reverts to
// skipped on its own, it never corrupts the document.

pub mod escape;
pub mod placeholder;

use crate::archive;
use crate::errors::FillError;
use crate::models::{FieldAnchor, FieldMapping, ParsedForm};
use crate::parser::runs::{extract_structure, PartStructure};
use escape::escape_xml;
use regex::Regex;
use std::collections::HashMap;

/// Output of one fill pass over the archive
#[derive(Debug)]
pub struct FilledDocument {
    pub output: Vec<u8>,
    pub filled: usize,
    pub skipped: usize,
}

/// Replace the first text run of an element with the given (escaped) text.
/// Elements with no run at all get one inserted before the closing tag.
fn with_text(element_xml: &str, text: &str) -> String {
    // Tag boundary anchored so hp:tc / hp:tr / hp:tbl never match
    let run_re = Regex::new(r"(?s)(<hp:t(?:\s[^>]*)?>).*?(</hp:t>)").unwrap();
    let escaped = escape_xml(text);
    if run_re.is_match(element_xml) {
        // Closure replacement so '$' in content is never treated as a
        // capture reference
        run_re
            .replace(element_xml, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], escaped, &caps[2])
            })
            .into_owned()
    } else if let Some(pos) = element_xml.rfind("</hp:p>") {
        let mut out = element_xml.to_string();
        out.insert_str(pos, &format!("<hp:run><hp:t>{}</hp:t></hp:run>", escaped));
        out
    } else {
        element_xml.to_string()
    }
}

/// Expand content into one cloned anchor paragraph per content paragraph
fn expand_paragraphs(anchor_para_xml: &str, content: &str) -> String {
    let paragraphs: Vec<&str> = content
        .split('\n')
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if paragraphs.is_empty() {
        return anchor_para_xml.to_string();
    }
    paragraphs
        .iter()
        .map(|p| with_text(anchor_para_xml, p))
        .collect::<Vec<_>>()
        .join("")
}

/// Cheap tag-balance check over a spliced snippet. Catches the corruption
/// a bad replacement could introduce before it reaches the archive.
fn check_well_formed(xml: &str) -> bool {
    let tag_re = Regex::new(r"<(/?)([A-Za-z0-9:_.-]+)([^<>]*?)(/?)>").unwrap();
    let mut stack: Vec<String> = Vec::new();
    let mut cursor = 0;

    for cap in tag_re.captures_iter(xml) {
        let whole = cap.get(0).unwrap();
        // Any stray '<' or '>' between tags means a broken splice
        if xml[cursor..whole.start()].contains(['<', '>']) {
            return false;
        }
        cursor = whole.end();

        let closing = !cap[1].is_empty();
        let self_closing = !cap[4].is_empty();
        let name = cap[2].to_string();
        if closing {
            if stack.pop().as_deref() != Some(name.as_str()) {
                return false;
            }
        } else if !self_closing {
            stack.push(name);
        }
    }
    !xml[cursor..].contains(['<', '>']) && stack.is_empty()
}

/// Splice mapped content into the original archive.
///
/// The mapping list covers every field of the parse; unresolved mappings
/// count as skipped. Non-targeted archive parts pass through byte-identical.
pub fn fill_form(
    bytes: &[u8],
    form: &ParsedForm,
    mappings: &[FieldMapping],
) -> Result<FilledDocument, FillError> {
    let anchors: HashMap<&str, &FieldAnchor> = form
        .fields
        .iter()
        .map(|f| (f.id.as_str(), &f.anchor))
        .collect();

    // Group resolved mappings by the part they touch
    let mut by_part: HashMap<String, Vec<(&FieldAnchor, &str)>> = HashMap::new();
    let mut skipped = 0;
    for mapping in mappings {
        let (Some(content), true) = (mapping.content.as_deref(), mapping.is_resolved()) else {
            skipped += 1;
            continue;
        };
        match anchors.get(mapping.field_id.as_str()) {
            Some(anchor) => {
                by_part
                    .entry(anchor.part.clone())
                    .or_default()
                    .push((anchor, content));
            }
            None => {
                log::warn!("[Filler] Mapping references unknown field {}", mapping.field_id);
                skipped += 1;
            }
        }
    }

    let mut filled = 0;
    let mut replaced_parts: HashMap<String, String> = HashMap::new();
    for (part, splices) in by_part {
        let xml = archive::read_part(bytes, &part)?;
        let structure = extract_structure(&xml);

        // Apply from the back of the part so earlier ranges stay valid
        let mut ordered = splices;
        ordered.sort_by_key(|(anchor, _)| {
            std::cmp::Reverse(anchor_start(anchor, &structure).unwrap_or(0))
        });

        let mut part_xml = xml.clone();
        for (anchor, content) in ordered {
            match splice_anchor(&part_xml, anchor, &structure, content) {
                Some(next) => {
                    part_xml = next;
                    filled += 1;
                }
                None => {
                    log::warn!(
                        "[Filler] Skipping field at {:?}: splice would not be well-formed",
                        anchor
                    );
                    skipped += 1;
                }
            }
        }
        replaced_parts.insert(part, part_xml);
    }

    let output = archive::rebuild_with_parts(bytes, &replaced_parts)?;
    log::info!("[Filler] Spliced {} fields, skipped {}", filled, skipped);
    Ok(FilledDocument {
        output,
        filled,
        skipped,
    })
}

fn anchor_start(anchor: &FieldAnchor, structure: &PartStructure) -> Option<usize> {
    match anchor.table {
        Some(t) => structure
            .tables
            .get(t.table_index)
            .and_then(|table| table.rows.get(t.row))
            .and_then(|row| row.get(t.col))
            .map(|cell| cell.start),
        None => structure.paragraphs.get(anchor.para_index).map(|p| p.start),
    }
}

/// Splice one field's content at its anchor. Returns None when the anchor
/// no longer resolves or the replacement fails the well-formedness check;
/// the caller skips just that field.
fn splice_anchor(
    part_xml: &str,
    anchor: &FieldAnchor,
    structure: &PartStructure,
    content: &str,
) -> Option<String> {
    let (start, end, original) = match anchor.table {
        Some(t) => {
            let cell = structure
                .tables
                .get(t.table_index)?
                .rows
                .get(t.row)?
                .get(t.col)?;
            (cell.start, cell.end, &part_xml[cell.start..cell.end])
        }
        None => {
            let para = structure.paragraphs.get(anchor.para_index)?;
            (para.start, para.end, &part_xml[para.start..para.end])
        }
    };

    let replacement = if anchor.table.is_some() {
        fill_cell(original, content)
    } else {
        expand_paragraphs(original, content)
    };

    if !check_well_formed(&replacement) {
        return None;
    }

    let mut next = String::with_capacity(part_xml.len() + replacement.len());
    next.push_str(&part_xml[..start]);
    next.push_str(&replacement);
    next.push_str(&part_xml[end..]);
    Some(next)
}

/// Fill a table cell: its first inner paragraph becomes the clone template
/// for multi-paragraph content
fn fill_cell(cell_xml: &str, content: &str) -> String {
    let para_re = Regex::new(r"(?s)<hp:p\b[^>]*>.*?</hp:p>").unwrap();
    match para_re.find(cell_xml) {
        Some(para_match) => {
            let expanded = expand_paragraphs(para_match.as_str(), content);
            format!(
                "{}{}{}",
                &cell_xml[..para_match.start()],
                expanded,
                &cell_xml[para_match.end()..]
            )
        }
        None => with_text(cell_xml, content),
    }
}
