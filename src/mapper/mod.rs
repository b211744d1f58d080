// Field-content mapper
//
// Assigns generated business-plan sections to detected fields. A
// deterministic rule pass goes first; only the leftovers are batched into a
// single AI mapping call. Every input field comes back in exactly one
// FieldMapping; unresolved stays explicit, never omitted.

use crate::completion::TextCompletion;
use crate::config::EngineConfig;
use crate::models::{FieldMapping, FormField, MappingMethod, PlanSection};
use regex::Regex;
use serde::Deserialize;

/// Normalize a label or section name for tolerant comparison: lowercase,
/// with whitespace and punctuation stripped
pub fn normalize_label(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Substring match in either direction over normalized strings
fn rule_match(label: &str, section_name: &str) -> bool {
    let (nl, ns) = (normalize_label(label), normalize_label(section_name));
    !nl.is_empty() && !ns.is_empty() && (nl.contains(&ns) || ns.contains(&nl))
}

/// One per-field verdict from the AI mapping response
#[derive(Debug, Deserialize)]
struct MappingVerdict {
    #[serde(rename = "fieldId")]
    field_id: String,
    section: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct FieldMapper {
    config: EngineConfig,
}

impl FieldMapper {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Map every field to a section (or explicitly to nothing).
    ///
    /// The rule pass is idempotent: identical inputs always produce
    /// identical assignments. The AI pass fires at most once, only for
    /// fields the rules left unresolved; its failure degrades to more
    /// unmapped fields rather than aborting.
    pub fn map_fields(
        &self,
        fields: &[FormField],
        sections: &[PlanSection],
        completion: &dyn TextCompletion,
    ) -> Vec<FieldMapping> {
        let mut mappings: Vec<FieldMapping> = fields
            .iter()
            .map(|field| self.rule_pass(field, sections))
            .collect();

        let unresolved: Vec<&FormField> = fields
            .iter()
            .zip(&mappings)
            .filter(|(_, m)| !m.is_resolved())
            .map(|(f, _)| f)
            .collect();

        if unresolved.is_empty() || sections.is_empty() {
            return mappings;
        }

        log::debug!(
            "[Mapper] Rule pass left {} of {} fields unresolved, batching AI pass",
            unresolved.len(),
            fields.len()
        );
        match self.ai_pass(&unresolved, sections, completion) {
            Ok(verdicts) => {
                for verdict in verdicts {
                    self.apply_verdict(&mut mappings, fields, sections, verdict);
                }
            }
            Err(e) => {
                // Degrades to more unmapped fields, never aborts the fill
                log::warn!("[Mapper] AI mapping pass failed: {}", e);
            }
        }

        mappings
    }

    fn rule_pass(&self, field: &FormField, sections: &[PlanSection]) -> FieldMapping {
        for section in sections {
            if rule_match(&field.label, &section.name) {
                return FieldMapping {
                    field_id: field.id.clone(),
                    section_name: Some(section.name.clone()),
                    method: MappingMethod::Rule,
                    content: Some(self.adapt_content(field, &section.text)),
                };
            }
        }
        FieldMapping::unresolved(&field.id)
    }

    fn ai_pass(
        &self,
        unresolved: &[&FormField],
        sections: &[PlanSection],
        completion: &dyn TextCompletion,
    ) -> Result<Vec<MappingVerdict>, crate::errors::FillError> {
        let response = completion.complete(&build_mapping_prompt(unresolved, sections))?;
        Ok(parse_verdicts(&response))
    }

    /// Merge one validated verdict into the mapping list. A verdict naming
    /// an unknown field or section is discarded.
    fn apply_verdict(
        &self,
        mappings: &mut [FieldMapping],
        fields: &[FormField],
        sections: &[PlanSection],
        verdict: MappingVerdict,
    ) {
        let Some(section_name) = verdict.section else {
            return; // Model declined; mapping stays method: none
        };
        let Some(section) = sections.iter().find(|s| s.name == section_name) else {
            log::debug!("[Mapper] Verdict names unknown section '{}'", section_name);
            return;
        };
        let Some(field) = fields.iter().find(|f| f.id == verdict.field_id) else {
            log::debug!("[Mapper] Verdict names unknown field '{}'", verdict.field_id);
            return;
        };
        let Some(mapping) = mappings.iter_mut().find(|m| m.field_id == verdict.field_id)
        else {
            return;
        };
        if mapping.is_resolved() {
            return; // Rule assignments are never overridden
        }

        log::debug!(
            "[Mapper] AI mapped field '{}' to section '{}' (confidence {:?})",
            field.label,
            section.name,
            verdict.confidence
        );
        mapping.section_name = Some(section.name.clone());
        mapping.method = MappingMethod::Ai;
        mapping.content = Some(self.adapt_content(field, &section.text));
    }

    /// Adapt section text to the field's kind: single-line kinds get a
    /// compressed extract, everything else gets the full text (the filler
    /// expands it into paragraph runs)
    fn adapt_content(&self, field: &FormField, text: &str) -> String {
        if field.kind.is_single_line() {
            single_line_extract(text, self.config.short_text_max_chars)
        } else {
            text.trim().to_string()
        }
    }
}

/// First sentence of the text, hard-capped at `max_chars` characters
fn single_line_extract(text: &str, max_chars: usize) -> String {
    let first_line = text.trim().lines().next().unwrap_or("").trim();
    let first_sentence = match first_line.find(". ") {
        Some(pos) => &first_line[..pos + 1],
        None => first_line,
    };
    if first_sentence.chars().count() <= max_chars {
        first_sentence.to_string()
    } else {
        first_sentence.chars().take(max_chars).collect()
    }
}

fn build_mapping_prompt(fields: &[&FormField], sections: &[PlanSection]) -> String {
    let mut prompt = String::from(
        "Match each form field to the business-plan section whose content \
         belongs in it, or null if none fits. Respond with only a JSON array; \
         each element must be {\"fieldId\": \"...\", \"section\": \"...\"|null, \
         \"confidence\": 0.0-1.0}.\n\nFields:\n",
    );
    for field in fields {
        prompt.push_str(&format!("- {}: {}\n", field.id, field.label));
    }
    prompt.push_str("\nSections:\n");
    for section in sections {
        let snippet: String = section.text.chars().take(120).collect();
        prompt.push_str(&format!("- {}: {}\n", section.name, snippet));
    }
    prompt
}

/// Parse and shape-validate the verdict list; anything malformed is dropped
fn parse_verdicts(content: &str) -> Vec<MappingVerdict> {
    let fence_re = Regex::new(r"```(?:json)?\s*\n([\s\S]*?)```").unwrap();
    let payload = fence_re
        .captures(content)
        .map(|cap| cap[1].trim().to_string())
        .or_else(|| {
            let start = content.find('[')?;
            let end = content.rfind(']')?;
            (end > start).then(|| content[start..=end].to_string())
        });
    let Some(payload) = payload else {
        return Vec::new();
    };

    let parsed: Vec<serde_json::Value> = match serde_json::from_str(&payload) {
        Ok(values) => values,
        Err(e) => {
            log::warn!("[Mapper] Verdict list was not valid JSON: {}", e);
            return Vec::new();
        }
    };
    parsed
        .into_iter()
        .filter_map(|value| serde_json::from_value::<MappingVerdict>(value).ok())
        .collect()
}
