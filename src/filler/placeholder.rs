// Placeholder filler
//
// The second fallback: pure token substitution over author-authored
// {{double-brace}} tokens, for manually pre-tokenized templates where
// structural parsing yields nothing usable. No inference; shares the
// escaping and multi-paragraph expansion of the XML form filler.

use super::{expand_paragraphs, FilledDocument};
use crate::archive;
use crate::errors::FillError;
use crate::filler::escape::escape_xml;
use crate::mapper::normalize_label;
use crate::models::PlanSection;
use crate::parser::runs::extract_structure;
use regex::Regex;
use std::collections::HashMap;

fn token_re() -> Regex {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap()
}

/// Find the section a token names, tolerantly
fn match_section<'a>(token: &str, sections: &'a [PlanSection]) -> Option<&'a PlanSection> {
    let normalized = normalize_label(token);
    if normalized.is_empty() {
        return None;
    }
    sections.iter().find(|s| {
        let name = normalize_label(&s.name);
        name == normalized || name.contains(&normalized) || normalized.contains(&name)
    })
}

/// Substitute {{token}} placeholders across every section part.
///
/// A paragraph holding nothing but one token is expanded into cloned
/// paragraphs (multi-paragraph content keeps the template's styling); a
/// token inline with other text gets a single-line substitution. Tokens
/// naming no known section are left in place and counted as skipped.
pub fn fill_placeholders(
    bytes: &[u8],
    sections: &[PlanSection],
) -> Result<FilledDocument, FillError> {
    let re = token_re();
    let mut filled = 0;
    let mut skipped = 0;
    let mut replaced_parts: HashMap<String, String> = HashMap::new();

    for part in archive::list_section_parts(bytes)? {
        let xml = archive::read_part(bytes, &part)?;
        let mut part_xml = xml.clone();

        // Pass 1: whole-paragraph tokens, expanded with the paragraph's style
        let structure = extract_structure(&part_xml);
        let mut para_splices = Vec::new();
        for para in &structure.paragraphs {
            let trimmed = para.text.trim();
            let Some(cap) = re.captures(trimmed) else {
                continue;
            };
            if cap.get(0).map(|m| m.as_str()) != Some(trimmed) {
                continue; // Inline token, handled in pass 2
            }
            // Unmatched tokens stay in the text; the inline scan below is
            // the single place they get counted skipped
            if let Some(section) = match_section(&cap[1], sections) {
                para_splices.push((para.clone(), section.text.clone()));
            }
        }
        for (para, content) in para_splices.iter().rev() {
            let anchor_xml = &part_xml[para.start..para.end];
            // Clear the token before cloning so every expanded paragraph
            // starts from an empty run
            let blank_anchor = super::with_text(anchor_xml, "");
            let expanded = expand_paragraphs(&blank_anchor, content);
            part_xml = format!(
                "{}{}{}",
                &part_xml[..para.start],
                expanded,
                &part_xml[para.end..]
            );
            filled += 1;
        }

        // Pass 2: inline tokens, single-line substitution
        let mut inline_skipped = 0;
        let substituted = re
            .replace_all(&part_xml, |caps: &regex::Captures| {
                match match_section(&caps[1], sections) {
                    Some(section) => {
                        let one_line = section.text.replace('\n', " ");
                        escape_xml(one_line.trim())
                    }
                    None => {
                        log::debug!("[Placeholder] No section matches token '{}'", &caps[1]);
                        inline_skipped += 1;
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        if substituted != part_xml {
            filled += re.find_iter(&part_xml).count() - inline_skipped;
            part_xml = substituted;
        }
        skipped += inline_skipped;

        if part_xml != xml {
            replaced_parts.insert(part, part_xml);
        }
    }

    let output = archive::rebuild_with_parts(bytes, &replaced_parts)?;
    log::info!(
        "[Placeholder] Substituted {} tokens, {} unmatched",
        filled,
        skipped
    );
    Ok(FilledDocument {
        output,
        filled,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::build_archive;

    fn section(name: &str, text: &str) -> PlanSection {
        PlanSection {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    fn archive_with(xml: &str) -> Vec<u8> {
        build_archive(&[("Contents/section0.xml".to_string(), xml.to_string())]).unwrap()
    }

    #[test]
    fn test_whole_paragraph_token_expands() {
        let xml = "<hp:p style=\"s2\"><hp:run><hp:t>{{사업 개요}}</hp:t></hp:run></hp:p>";
        let sections = vec![section("사업 개요", "첫 문단.\n둘째 문단.")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 1);
        assert_eq!(doc.skipped, 0);

        let out = archive::read_part(&doc.output, "Contents/section0.xml").unwrap();
        assert!(out.contains("첫 문단."));
        assert!(out.contains("둘째 문단."));
        // Both cloned paragraphs keep the template's style
        assert_eq!(out.matches("style=\"s2\"").count(), 2);
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_inline_token_substitutes_single_line() {
        let xml = "<hp:p><hp:t>회사명은 {{회사명}} 입니다</hp:t></hp:p>";
        let sections = vec![section("회사명", "주식회사 테스트")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 1);
        let out = archive::read_part(&doc.output, "Contents/section0.xml").unwrap();
        assert!(out.contains("회사명은 주식회사 테스트 입니다"));
    }

    #[test]
    fn test_unmatched_token_left_in_place() {
        let xml = "<hp:p><hp:t>{{없는 섹션}}</hp:t></hp:p>";
        let sections = vec![section("사업 개요", "본문")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 0);
        assert_eq!(doc.skipped, 1);
        let out = archive::read_part(&doc.output, "Contents/section0.xml").unwrap();
        assert!(out.contains("{{없는 섹션}}"));
    }

    #[test]
    fn test_unmatched_token_counted_once_alongside_matches() {
        // A whole-paragraph token that matches nothing survives pass 1 and
        // must be counted skipped exactly once by the inline scan
        let xml = concat!(
            "<hp:p><hp:run><hp:t>{{사업 개요}}</hp:t></hp:run></hp:p>",
            "<hp:p><hp:run><hp:t>{{없는 섹션}}</hp:t></hp:run></hp:p>",
        );
        let sections = vec![section("사업 개요", "본문")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 1);
        assert_eq!(doc.skipped, 1);
    }

    #[test]
    fn test_substituted_content_is_escaped() {
        let xml = "<hp:p><hp:t>v: {{값}}</hp:t></hp:p>";
        let sections = vec![section("값", "A & B")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        let out = archive::read_part(&doc.output, "Contents/section0.xml").unwrap();
        assert!(out.contains("A &amp; B"));
    }

    #[test]
    fn test_no_tokens_returns_archive_unchanged() {
        let xml = "<hp:p><hp:t>토큰 없는 문서</hp:t></hp:p>";
        let sections = vec![section("사업 개요", "본문")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 0);
        assert_eq!(
            archive::read_part(&doc.output, "Contents/section0.xml").unwrap(),
            xml
        );
    }

    #[test]
    fn test_tolerant_token_matching() {
        // Token spacing differs from the section name
        let xml = "<hp:p><hp:t>{{ 사업개요 }}</hp:t></hp:p>";
        let sections = vec![section("사업 개요", "본문")];

        let doc = fill_placeholders(&archive_with(xml), &sections).unwrap();
        assert_eq!(doc.filled, 1);
    }
}
