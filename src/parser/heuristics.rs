// Layered field/section detection heuristics
//
// Applied per section part in document order:
// 1. label-then-blank: a run ending in a label terminator followed by an
//    empty run yields a field anchored at the blank position
// 2. table-cell pairing: a label-only cell next to an empty cell (right or
//    below) yields a table-cell field with its coordinates
// 3. section outline: numbering patterns reconstruct section boundaries even
//    where no blank exists (whole essay sections are appended wholesale)

use crate::models::{FieldAnchor, FieldKind, FormField, FormSection, TableAnchor};
use crate::parser::runs::PartStructure;
use regex::Regex;

const LABEL_BLANK_CONFIDENCE: f32 = 0.9;
const TABLE_PAIR_CONFIDENCE: f32 = 0.8;

/// Labels that mark a date slot regardless of surrounding size
const DATE_WORDS: [&str; 4] = ["날짜", "일자", "기간", "연월일"];
/// Labels that mark a numeric slot
const NUMBER_WORDS: [&str; 5] = ["금액", "원)", "수량", "인원", "매출"];

fn ends_with_label_terminator(text: &str) -> bool {
    let trimmed = text.trim_end();
    trimmed.ends_with(':') || trimmed.ends_with('：')
}

fn strip_label_terminator(text: &str) -> String {
    text.trim().trim_end_matches([':', '：']).trim().to_string()
}

/// Refine a text field's kind from its label wording
pub fn refine_kind(label: &str, base: FieldKind) -> FieldKind {
    if DATE_WORDS.iter().any(|w| label.contains(w)) {
        return FieldKind::Date;
    }
    if NUMBER_WORDS.iter().any(|w| label.contains(w)) {
        return FieldKind::Number;
    }
    base
}

/// Heuristic 1: label run followed by a blank run
pub fn detect_label_blank_fields(
    part: &str,
    structure: &PartStructure,
    next_id: &mut usize,
) -> Vec<FormField> {
    let mut fields = Vec::new();

    for (i, para) in structure.paragraphs.iter().enumerate() {
        if !ends_with_label_terminator(&para.text) {
            continue;
        }
        let Some(blank) = structure.paragraphs.get(i + 1) else {
            continue;
        };
        if !blank.is_blank() {
            continue;
        }

        // Two or more consecutive blank paragraphs suggest room for prose
        let trailing_blanks = structure.paragraphs[i + 1..]
            .iter()
            .take_while(|p| p.is_blank())
            .count();
        let base = if trailing_blanks >= 2 {
            FieldKind::LongText
        } else {
            FieldKind::ShortText
        };

        let label = strip_label_terminator(&para.text);
        let kind = refine_kind(&label, base);
        fields.push(FormField {
            id: format!("f-{}", next_id),
            label,
            kind,
            anchor: FieldAnchor {
                part: part.to_string(),
                para_index: i + 1,
                table: None,
            },
            confidence: LABEL_BLANK_CONFIDENCE,
        });
        *next_id += 1;
    }

    fields
}

/// Heuristic 2: label cell paired with an adjacent empty cell
pub fn detect_table_fields(
    part: &str,
    structure: &PartStructure,
    next_id: &mut usize,
) -> Vec<FormField> {
    let mut fields = Vec::new();

    for (t_idx, table) in structure.tables.iter().enumerate() {
        for (r_idx, row) in table.rows.iter().enumerate() {
            for (c_idx, cell) in row.iter().enumerate() {
                if cell.is_blank() {
                    continue;
                }

                // Right neighbor first, then the cell below
                let right = row.get(c_idx + 1).filter(|c| c.is_blank());
                let below = table
                    .rows
                    .get(r_idx + 1)
                    .and_then(|r| r.get(c_idx))
                    .filter(|c| c.is_blank());

                let target = match (right, below) {
                    (Some(_), _) => Some((r_idx, c_idx + 1)),
                    (None, Some(_)) => Some((r_idx + 1, c_idx)),
                    (None, None) => None,
                };
                let Some((row_coord, col_coord)) = target else {
                    continue;
                };

                let label = strip_label_terminator(&cell.text);
                fields.push(FormField {
                    id: format!("f-{}", next_id),
                    label: label.clone(),
                    kind: refine_kind(&label, FieldKind::TableCell),
                    anchor: FieldAnchor {
                        part: part.to_string(),
                        para_index: 0,
                        table: Some(TableAnchor {
                            table_index: t_idx,
                            row: row_coord,
                            col: col_coord,
                        }),
                    },
                    confidence: TABLE_PAIR_CONFIDENCE,
                });
                *next_id += 1;
            }
        }
    }

    fields
}

/// Heuristic 3: section outline from numbering patterns
pub fn detect_sections(part: &str, structure: &PartStructure) -> Vec<FormSection> {
    // Arabic "1. ", parenthesized "1)" / "(1)", Korean ordinal "가. "
    let outline_re = Regex::new(
        r"^\s*(?:\d+\.\s+|\(?\d+\)\s*|[가나다라마바사아자차카타파하]\.\s+)(.+)$",
    )
    .unwrap();

    let mut sections = Vec::new();
    for (i, para) in structure.paragraphs.iter().enumerate() {
        if let Some(cap) = outline_re.captures(para.text.trim()) {
            let name = strip_label_terminator(&cap[1]);
            if name.is_empty() {
                continue;
            }
            sections.push(FormSection {
                name,
                part: part.to_string(),
                para_index: i,
            });
        }
    }
    sections
}
