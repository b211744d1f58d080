// Form structural parser
//
// Reverse-engineers the field structure of a zip-XML form that carries no
// explicit field markup: layered heuristics first, an AI-assisted pass when
// the heuristics come up thin or contradictory.

pub mod ai_assist;
pub mod heuristics;
pub mod runs;

use crate::archive;
use crate::completion::TextCompletion;
use crate::config::EngineConfig;
use crate::mapper::normalize_label;
use crate::models::{FieldAnchor, FormField, ParsedForm};
use crate::parser::runs::PartStructure;
use std::collections::HashSet;

/// How a parse was produced, and whether it produced anything at all.
/// The AI assist's loosely-typed JSON never merges in untagged.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    RuleBased(ParsedForm),
    AiAssisted(ParsedForm),
    Failed,
}

impl ParseOutcome {
    pub fn parsed_form(&self) -> Option<&ParsedForm> {
        match self {
            ParseOutcome::RuleBased(form) | ParseOutcome::AiAssisted(form) => Some(form),
            ParseOutcome::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ParseOutcome::Failed)
    }
}

pub struct FormParser {
    config: EngineConfig,
}

impl FormParser {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Parse a zip-XML buffer into sections and fields.
    ///
    /// Zero fields and zero sections is a failed parse; the orchestrator
    /// skips straight past the mapper and filler on that outcome.
    pub fn parse(&self, bytes: &[u8], completion: &dyn TextCompletion) -> ParseOutcome {
        let structures = match extract_all_structures(bytes) {
            Ok(structures) => structures,
            Err(e) => {
                log::warn!("[Parser] Could not open archive: {}", e);
                return ParseOutcome::Failed;
            }
        };
        if structures.is_empty() {
            log::warn!("[Parser] Archive holds no section parts");
            return ParseOutcome::Failed;
        }

        let mut next_id: usize = 0;
        let mut fields = Vec::new();
        let mut sections = Vec::new();
        for (part, structure) in &structures {
            fields.extend(heuristics::detect_label_blank_fields(part, structure, &mut next_id));
            fields.extend(heuristics::detect_table_fields(part, structure, &mut next_id));
            sections.extend(heuristics::detect_sections(part, structure));
        }

        let total_chars: usize = structures.iter().map(|(_, s)| s.text_len()).sum();
        let density = heuristic_density(fields.len() + sections.len(), total_chars);
        let contradictory = has_overlapping_anchors(&fields);

        let needs_assist = density < self.config.ai_assist_min_density || contradictory;
        if !needs_assist {
            log::debug!(
                "[Parser] Heuristics found {} fields / {} sections (density {:.2})",
                fields.len(),
                sections.len(),
                density
            );
            return ParseOutcome::RuleBased(ParsedForm { sections, fields });
        }

        log::info!(
            "[Parser] Heuristic density {:.2} below {:.2} (overlaps: {}), invoking AI assist",
            density,
            self.config.ai_assist_min_density,
            contradictory
        );
        match ai_assist::ai_assisted_parse(completion, &structures, &mut next_id) {
            Ok((ai_fields, ai_sections)) => {
                merge_ai_results(&mut fields, &mut sections, ai_fields, ai_sections);
                if fields.is_empty() && sections.is_empty() {
                    ParseOutcome::Failed
                } else {
                    ParseOutcome::AiAssisted(ParsedForm { sections, fields })
                }
            }
            Err(e) => {
                // The assist is best-effort: keep whatever the heuristics found
                log::warn!("[Parser] AI assist unavailable: {}", e);
                if fields.is_empty() && sections.is_empty() {
                    ParseOutcome::Failed
                } else {
                    ParseOutcome::RuleBased(ParsedForm { sections, fields })
                }
            }
        }
    }
}

/// Read and extract every section part in document order
fn extract_all_structures(
    bytes: &[u8],
) -> Result<Vec<(String, PartStructure)>, crate::errors::FillError> {
    let parts = archive::list_section_parts(bytes)?;
    let mut structures = Vec::with_capacity(parts.len());
    for part in parts {
        let xml = archive::read_part(bytes, &part)?;
        structures.push((part, runs::extract_structure(&xml)));
    }
    Ok(structures)
}

/// Detected items per 1,000 characters of extracted text
fn heuristic_density(item_count: usize, total_chars: usize) -> f32 {
    if total_chars == 0 {
        return 0.0;
    }
    item_count as f32 / (total_chars as f32 / 1000.0)
}

fn anchor_key(anchor: &FieldAnchor) -> String {
    match anchor.table {
        Some(t) => format!("{}#t{}r{}c{}", anchor.part, t.table_index, t.row, t.col),
        None => format!("{}#p{}", anchor.part, anchor.para_index),
    }
}

/// Two fields anchored at the same position contradict each other
fn has_overlapping_anchors(fields: &[FormField]) -> bool {
    let mut seen = HashSet::new();
    fields.iter().any(|f| !seen.insert(anchor_key(&f.anchor)))
}

/// Merge AI results into the heuristic results, keeping heuristic anchors
/// authoritative: an AI field landing on an occupied anchor is dropped, as
/// is an AI section duplicating a known name.
fn merge_ai_results(
    fields: &mut Vec<FormField>,
    sections: &mut Vec<crate::models::FormSection>,
    ai_fields: Vec<FormField>,
    ai_sections: Vec<crate::models::FormSection>,
) {
    let mut occupied: HashSet<String> = fields.iter().map(|f| anchor_key(&f.anchor)).collect();
    for field in ai_fields {
        // Claim the anchor as we accept, so two AI candidates reconciled to
        // the same blank cannot both land
        if occupied.insert(anchor_key(&field.anchor)) {
            fields.push(field);
        }
    }

    let known: HashSet<String> = sections.iter().map(|s| normalize_label(&s.name)).collect();
    for section in ai_sections {
        if !known.contains(&normalize_label(&section.name)) {
            sections.push(section);
        }
    }
}
