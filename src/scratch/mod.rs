// From-scratch document builder
//
// The unconditional last resort: composes a brand-new compliant document
// from structured section data alone, with no dependency on any uploaded
// template. Consumed through a single narrow call so a richer external
// composer can be swapped in.

use crate::archive;
use crate::errors::FillError;
use crate::filler::escape::escape_xml;
use crate::models::PlanSection;

pub trait FromScratchBuilder: Send + Sync {
    /// Compose a fresh zip-XML document from section data alone
    fn build(&self, company_name: &str, sections: &[PlanSection]) -> Result<Vec<u8>, FillError>;
}

/// Built-in composer: a title paragraph followed by numbered section
/// headings and their text, one archive part, default styling
pub struct DefaultScratchBuilder;

impl DefaultScratchBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl FromScratchBuilder for DefaultScratchBuilder {
    fn build(&self, company_name: &str, sections: &[PlanSection]) -> Result<Vec<u8>, FillError> {
        let mut xml = String::from("<hp:sec>");
        xml.push_str(&heading_para(&format!("{} 사업계획서", company_name)));

        for (i, section) in sections.iter().enumerate() {
            xml.push_str(&heading_para(&format!("{}. {}", i + 1, section.name)));
            for line in section.text.lines().filter(|l| !l.trim().is_empty()) {
                xml.push_str(&body_para(line.trim()));
            }
        }
        xml.push_str("</hp:sec>");

        let output = archive::build_archive(&[
            ("mimetype".to_string(), "application/hwp+zip".to_string()),
            ("Contents/section0.xml".to_string(), xml),
        ])?;
        log::info!(
            "[Scratch] Composed fresh document with {} sections ({} bytes)",
            sections.len(),
            output.len()
        );
        Ok(output)
    }
}

fn heading_para(text: &str) -> String {
    format!(
        "<hp:p style=\"heading\"><hp:run><hp:t>{}</hp:t></hp:run></hp:p>",
        escape_xml(text)
    )
}

fn body_para(text: &str) -> String {
    format!(
        "<hp:p style=\"body\"><hp:run><hp:t>{}</hp:t></hp:run></hp:p>",
        escape_xml(text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_valid_archive_with_no_template() {
        let sections = vec![
            PlanSection {
                name: "사업 개요".to_string(),
                text: "첫 문단.\n둘째 문단.".to_string(),
            },
            PlanSection {
                name: "시장 분석".to_string(),
                text: "시장 규모 분석.".to_string(),
            },
        ];

        let builder = DefaultScratchBuilder::new();
        let output = builder.build("테스트컴퍼니", &sections).unwrap();

        assert!(archive::is_zip(&output));
        let xml = archive::read_part(&output, "Contents/section0.xml").unwrap();
        assert!(xml.contains("테스트컴퍼니 사업계획서"));
        assert!(xml.contains("1. 사업 개요"));
        assert!(xml.contains("2. 시장 분석"));
        assert!(xml.contains("둘째 문단."));
    }

    #[test]
    fn test_builds_even_with_zero_sections() {
        let builder = DefaultScratchBuilder::new();
        let output = builder.build("회사", &[]).unwrap();
        assert!(archive::is_zip(&output));
    }

    #[test]
    fn test_section_text_is_escaped() {
        let sections = vec![PlanSection {
            name: "R&D".to_string(),
            text: "a < b".to_string(),
        }];
        let builder = DefaultScratchBuilder::new();
        let output = builder.build("회사", &sections).unwrap();
        let xml = archive::read_part(&output, "Contents/section0.xml").unwrap();
        assert!(xml.contains("R&amp;D"));
        assert!(xml.contains("a &lt; b"));
    }
}
