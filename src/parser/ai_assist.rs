// AI-assisted structural parse fallback
//
// Triggered when the heuristic field/section density falls below the tunable
// minimum, or when heuristics produce overlapping anchors. The model sees
// the full concatenated document text and returns a compact JSON candidate
// list; candidates are validated against the expected shape and reconciled
// back to real run positions with tolerant label matching, since the model
// may paraphrase. Unreconcilable candidates are dropped one by one, never
// fatally.

use crate::completion::TextCompletion;
use crate::errors::FillError;
use crate::mapper::normalize_label;
use crate::models::{FieldAnchor, FieldKind, FormField, FormSection, TableAnchor};
use crate::parser::heuristics::refine_kind;
use crate::parser::runs::PartStructure;
use regex::Regex;
use serde::Deserialize;

const AI_BASE_CONFIDENCE: f32 = 0.6;

/// One candidate returned by the completion call
#[derive(Debug, Deserialize)]
struct StructureCandidate {
    #[serde(rename = "type")]
    candidate_type: String,
    label: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub fn build_parse_prompt(document_text: &str) -> String {
    format!(
        "The following is the full text of a blank government application form. \
         Identify every answer field (a labeled slot the applicant must fill) and \
         every outline section heading. Respond with only a JSON array; each element \
         must be {{\"type\": \"field\"|\"section\", \"label\": \"...\", \"confidence\": 0.0-1.0}}. \
         Use the label text exactly as it appears where possible.\n\n---\n{}",
        document_text
    )
}

/// Pull the JSON array out of a completion response that may wrap it in a
/// fenced code block or surrounding prose
fn extract_json_payload(content: &str) -> Option<String> {
    let fence_re = Regex::new(r"```(?:json)?\s*\n([\s\S]*?)```").unwrap();
    if let Some(cap) = fence_re.captures(content) {
        return Some(cap[1].trim().to_string());
    }
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end > start {
        Some(content[start..=end].to_string())
    } else {
        None
    }
}

/// Parse and shape-validate the model output. Entries with an unknown type
/// or an empty label are discarded rather than trusted.
fn parse_candidates(content: &str) -> Vec<StructureCandidate> {
    let Some(payload) = extract_json_payload(content) else {
        return Vec::new();
    };
    let parsed: Vec<serde_json::Value> = match serde_json::from_str(&payload) {
        Ok(values) => values,
        Err(e) => {
            log::warn!("[Parser] AI candidate list was not valid JSON: {}", e);
            return Vec::new();
        }
    };

    parsed
        .into_iter()
        .filter_map(|value| serde_json::from_value::<StructureCandidate>(value).ok())
        .filter(|c| {
            !c.label.trim().is_empty()
                && matches!(c.candidate_type.as_str(), "field" | "section")
        })
        .collect()
}

/// Run the completion call and reconcile its candidates to run positions.
/// Returns the reconciled fields and sections; a completion failure is an
/// error the caller absorbs into the parse outcome.
pub fn ai_assisted_parse(
    completion: &dyn TextCompletion,
    structures: &[(String, PartStructure)],
    next_id: &mut usize,
) -> Result<(Vec<FormField>, Vec<FormSection>), FillError> {
    let document_text: String = structures
        .iter()
        .map(|(_, s)| s.full_text())
        .collect::<Vec<_>>()
        .join("\n");

    let response = completion
        .complete(&build_parse_prompt(&document_text))
        .map_err(|e| FillError::ParseFailure(format!("Parse assist call failed: {}", e)))?;

    let candidates = parse_candidates(&response);
    log::debug!("[Parser] AI assist returned {} candidates", candidates.len());

    let mut fields = Vec::new();
    let mut sections = Vec::new();
    for candidate in candidates {
        match candidate.candidate_type.as_str() {
            "field" => {
                if let Some(field) = reconcile_field(&candidate, structures, next_id) {
                    fields.push(field);
                }
            }
            "section" => {
                if let Some(section) = reconcile_section(&candidate, structures) {
                    sections.push(section);
                }
            }
            _ => unreachable!("filtered during shape validation"),
        }
    }

    Ok((fields, sections))
}

/// Tolerant label match: normalized strings, substring in either direction
fn labels_match(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize_label(a), normalize_label(b));
    !na.is_empty() && !nb.is_empty() && (na.contains(&nb) || nb.contains(&na))
}

/// Map a field candidate back to a concrete blank position. The model may
/// paraphrase, so matching is normalized-substring, not exact.
fn reconcile_field(
    candidate: &StructureCandidate,
    structures: &[(String, PartStructure)],
    next_id: &mut usize,
) -> Option<FormField> {
    let confidence =
        candidate.confidence.unwrap_or(1.0).clamp(0.0, 1.0) * AI_BASE_CONFIDENCE;

    for (part, structure) in structures {
        // Paragraph anchors: a matching label run followed by a blank run
        for (i, para) in structure.paragraphs.iter().enumerate() {
            if !labels_match(&para.text, &candidate.label) {
                continue;
            }
            if let Some(blank) = structure.paragraphs.get(i + 1) {
                if blank.is_blank() {
                    let field = FormField {
                        id: format!("f-{}", next_id),
                        label: candidate.label.trim().to_string(),
                        kind: refine_kind(&candidate.label, FieldKind::LongText),
                        anchor: FieldAnchor {
                            part: part.clone(),
                            para_index: i + 1,
                            table: None,
                        },
                        confidence,
                    };
                    *next_id += 1;
                    return Some(field);
                }
            }
        }

        // Table anchors: a matching label cell with a blank right/below cell
        for (t_idx, table) in structure.tables.iter().enumerate() {
            for (r_idx, row) in table.rows.iter().enumerate() {
                for (c_idx, cell) in row.iter().enumerate() {
                    if !labels_match(&cell.text, &candidate.label) {
                        continue;
                    }
                    let coords = if row.get(c_idx + 1).map(|c| c.is_blank()).unwrap_or(false) {
                        Some((r_idx, c_idx + 1))
                    } else if table
                        .rows
                        .get(r_idx + 1)
                        .and_then(|r| r.get(c_idx))
                        .map(|c| c.is_blank())
                        .unwrap_or(false)
                    {
                        Some((r_idx + 1, c_idx))
                    } else {
                        None
                    };
                    if let Some((row_coord, col_coord)) = coords {
                        let field = FormField {
                            id: format!("f-{}", next_id),
                            label: candidate.label.trim().to_string(),
                            kind: FieldKind::TableCell,
                            anchor: FieldAnchor {
                                part: part.clone(),
                                para_index: 0,
                                table: Some(TableAnchor {
                                    table_index: t_idx,
                                    row: row_coord,
                                    col: col_coord,
                                }),
                            },
                            confidence,
                        };
                        *next_id += 1;
                        return Some(field);
                    }
                }
            }
        }
    }

    log::debug!(
        "[Parser] Dropping unreconcilable field candidate '{}'",
        candidate.label
    );
    None
}

fn reconcile_section(
    candidate: &StructureCandidate,
    structures: &[(String, PartStructure)],
) -> Option<FormSection> {
    for (part, structure) in structures {
        for (i, para) in structure.paragraphs.iter().enumerate() {
            if labels_match(&para.text, &candidate.label) {
                return Some(FormSection {
                    name: candidate.label.trim().to_string(),
                    part: part.clone(),
                    para_index: i,
                });
            }
        }
    }
    log::debug!(
        "[Parser] Dropping unreconcilable section candidate '{}'",
        candidate.label
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletion;
    use crate::parser::runs::extract_structure;

    fn structures() -> Vec<(String, PartStructure)> {
        let xml = concat!(
            "<hp:p><hp:t>사업 개요</hp:t></hp:p>",
            "<hp:p><hp:t></hp:t></hp:p>",
            "<hp:p><hp:t>본문 텍스트</hp:t></hp:p>",
        );
        vec![("Contents/section0.xml".to_string(), extract_structure(xml))]
    }

    #[test]
    fn test_extract_json_payload_from_fence() {
        let content = "Here you go:\n```json\n[{\"type\":\"field\",\"label\":\"x\"}]\n```\ndone";
        let payload = extract_json_payload(content).unwrap();
        assert!(payload.starts_with('['));
    }

    #[test]
    fn test_extract_json_payload_bare_array() {
        let content = "The fields are [{\"type\":\"field\",\"label\":\"x\"}] as requested.";
        assert!(extract_json_payload(content).is_some());
    }

    #[test]
    fn test_shape_validation_drops_bad_entries() {
        let content = r#"[
            {"type": "field", "label": "사업명"},
            {"type": "banana", "label": "x"},
            {"type": "section", "label": ""},
            {"label": "no type"}
        ]"#;
        let candidates = parse_candidates(content);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].label, "사업명");
    }

    #[test]
    fn test_reconciles_paraphrased_label() {
        // Model drops the space in "사업 개요"; normalized substring
        // matching still anchors it
        let scripted = ScriptedCompletion::new(vec![
            r#"[{"type": "field", "label": "사업개요", "confidence": 0.9}]"#,
        ]);
        let mut next_id = 0;
        let (fields, sections) =
            ai_assisted_parse(&scripted, &structures(), &mut next_id).unwrap();

        assert_eq!(fields.len(), 1);
        assert!(sections.is_empty());
        assert_eq!(fields[0].anchor.para_index, 1);
        assert!(fields[0].confidence > 0.0 && fields[0].confidence < 1.0);
    }

    #[test]
    fn test_unreconcilable_candidate_is_dropped_not_fatal() {
        let scripted = ScriptedCompletion::new(vec![
            r#"[
                {"type": "field", "label": "사업 개요"},
                {"type": "field", "label": "존재하지 않는 라벨"}
            ]"#,
        ]);
        let mut next_id = 0;
        let (fields, _) = ai_assisted_parse(&scripted, &structures(), &mut next_id).unwrap();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_completion_failure_is_an_error() {
        let scripted = ScriptedCompletion::failing();
        let mut next_id = 0;
        let result = ai_assisted_parse(&scripted, &structures(), &mut next_id);
        assert!(matches!(result, Err(FillError::ParseFailure(_))));
    }

    #[test]
    fn test_garbage_response_yields_empty_lists() {
        let scripted = ScriptedCompletion::new(vec!["I cannot help with that."]);
        let mut next_id = 0;
        let (fields, sections) =
            ai_assisted_parse(&scripted, &structures(), &mut next_id).unwrap();
        assert!(fields.is_empty());
        assert!(sections.is_empty());
    }
}
