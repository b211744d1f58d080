// Document-order run extraction from one section XML part
//
// The container's section parts hold paragraphs (<hp:p> with <hp:t> text
// runs) and tables (<hp:tbl> / <hp:tr> / <hp:tc>). Extraction records the
// byte range of every element so the filler can later splice content at the
// exact anchored position. Paragraphs nested inside tables belong to their
// cell, not to the top-level sequence.

use crate::filler::escape::unescape_xml;
use regex::Regex;

/// One top-level paragraph with its byte range in the part
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Paragraph {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One table cell with its byte range in the part
#[derive(Debug, Clone)]
pub struct Cell {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One table as a row-major cell grid
#[derive(Debug, Clone)]
pub struct Table {
    pub rows: Vec<Vec<Cell>>,
    pub start: usize,
    pub end: usize,
}

/// Extracted structure of one section part
#[derive(Debug, Clone, Default)]
pub struct PartStructure {
    pub paragraphs: Vec<Paragraph>,
    pub tables: Vec<Table>,
}

impl PartStructure {
    /// Total character count of all extracted text, used for the
    /// heuristic-density signal
    pub fn text_len(&self) -> usize {
        let para_len: usize = self.paragraphs.iter().map(|p| p.text.chars().count()).sum();
        let cell_len: usize = self
            .tables
            .iter()
            .flat_map(|t| t.rows.iter())
            .flat_map(|r| r.iter())
            .map(|c| c.text.chars().count())
            .sum();
        para_len + cell_len
    }

    /// All extracted text concatenated in document order, for the
    /// AI-assisted fallback prompt
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for para in &self.paragraphs {
            out.push_str(&para.text);
            out.push('\n');
        }
        for table in &self.tables {
            for row in &table.rows {
                let cells: Vec<&str> = row.iter().map(|c| c.text.as_str()).collect();
                out.push_str(&cells.join(" | "));
                out.push('\n');
            }
        }
        out
    }
}

/// Concatenated text of all <hp:t> runs within an XML slice.
/// The tag name must end at the attribute list: a bare `hp:t` prefix would
/// also match `hp:tc`, `hp:tr`, and `hp:tbl`.
pub fn run_text(xml: &str) -> String {
    let re = Regex::new(r"(?s)<hp:t(?:\s[^>]*)?>(.*?)</hp:t>").unwrap();
    let mut text = String::new();
    for cap in re.captures_iter(xml) {
        text.push_str(&unescape_xml(&cap[1]));
    }
    text
}

/// Extract the paragraph and table structure of one section part
pub fn extract_structure(xml: &str) -> PartStructure {
    let table_re = Regex::new(r"(?s)<hp:tbl\b.*?</hp:tbl>").unwrap();
    let para_re = Regex::new(r"(?s)<hp:p\b[^>]*>.*?</hp:p>").unwrap();
    let row_re = Regex::new(r"(?s)<hp:tr\b.*?</hp:tr>").unwrap();
    let cell_re = Regex::new(r"(?s)<hp:tc\b.*?</hp:tc>").unwrap();

    let mut tables = Vec::new();
    let mut table_ranges = Vec::new();
    for table_match in table_re.find_iter(xml) {
        let (t_start, t_end) = (table_match.start(), table_match.end());
        table_ranges.push((t_start, t_end));

        let mut rows = Vec::new();
        for row_match in row_re.find_iter(table_match.as_str()) {
            let row_offset = t_start + row_match.start();
            let mut cells = Vec::new();
            for cell_match in cell_re.find_iter(row_match.as_str()) {
                cells.push(Cell {
                    text: run_text(cell_match.as_str()),
                    start: row_offset + cell_match.start(),
                    end: row_offset + cell_match.end(),
                });
            }
            rows.push(cells);
        }
        tables.push(Table {
            rows,
            start: t_start,
            end: t_end,
        });
    }

    let mut paragraphs = Vec::new();
    for para_match in para_re.find_iter(xml) {
        let start = para_match.start();
        // Cell paragraphs are owned by their table
        if table_ranges.iter().any(|&(s, e)| start >= s && start < e) {
            continue;
        }
        paragraphs.push(Paragraph {
            text: run_text(para_match.as_str()),
            start,
            end: para_match.end(),
        });
    }

    PartStructure { paragraphs, tables }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTION: &str = concat!(
        r#"<hp:sec><hp:p id="1"><hp:run><hp:t>사업명:</hp:t></hp:run></hp:p>"#,
        r#"<hp:p id="2"><hp:run><hp:t> </hp:t></hp:run></hp:p>"#,
        r#"<hp:tbl><hp:tr><hp:tc><hp:subList><hp:p><hp:t>대표자</hp:t></hp:p></hp:subList></hp:tc>"#,
        r#"<hp:tc><hp:subList><hp:p><hp:t></hp:t></hp:p></hp:subList></hp:tc></hp:tr></hp:tbl>"#,
        r#"<hp:p id="3"><hp:run><hp:t>1. 사업 개요</hp:t></hp:run></hp:p></hp:sec>"#,
    );

    #[test]
    fn test_extracts_top_level_paragraphs_only() {
        let structure = extract_structure(SECTION);
        let texts: Vec<&str> = structure.paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["사업명:", " ", "1. 사업 개요"]);
    }

    #[test]
    fn test_extracts_table_grid() {
        let structure = extract_structure(SECTION);
        assert_eq!(structure.tables.len(), 1);
        let table = &structure.tables[0];
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.rows[0][0].text, "대표자");
        assert!(table.rows[0][1].is_blank());
    }

    #[test]
    fn test_paragraph_blank_detection() {
        let structure = extract_structure(SECTION);
        assert!(!structure.paragraphs[0].is_blank());
        assert!(structure.paragraphs[1].is_blank());
    }

    #[test]
    fn test_run_text_joins_and_unescapes() {
        let xml = "<hp:p><hp:t>a &amp; b</hp:t><hp:t> &lt;c&gt;</hp:t></hp:p>";
        assert_eq!(run_text(xml), "a & b <c>");
    }

    #[test]
    fn test_run_text_ignores_table_tags() {
        // hp:tc / hp:tr / hp:tbl share the hp:t prefix; only real text runs
        // may contribute, or cell labels come back as raw markup
        let xml = "<hp:tc><hp:subList><hp:p><hp:t>대표자</hp:t></hp:p></hp:subList></hp:tc>";
        assert_eq!(run_text(xml), "대표자");

        let table = "<hp:tbl><hp:tr><hp:tc><hp:p><hp:t></hp:t></hp:p></hp:tc></hp:tr></hp:tbl>";
        assert_eq!(run_text(table), "");
    }

    #[test]
    fn test_run_text_keeps_attributed_runs() {
        let xml = r#"<hp:p><hp:t charPrIDRef="5">내용</hp:t></hp:p>"#;
        assert_eq!(run_text(xml), "내용");
    }

    #[test]
    fn test_ranges_round_trip() {
        let structure = extract_structure(SECTION);
        for para in &structure.paragraphs {
            let slice = &SECTION[para.start..para.end];
            assert!(slice.starts_with("<hp:p"));
            assert!(slice.ends_with("</hp:p>"));
        }
        let cell = &structure.tables[0].rows[0][1];
        assert!(SECTION[cell.start..cell.end].starts_with("<hp:tc"));
    }

    #[test]
    fn test_full_text_includes_cells() {
        let structure = extract_structure(SECTION);
        let text = structure.full_text();
        assert!(text.contains("사업명:"));
        assert!(text.contains("대표자"));
    }

    #[test]
    fn test_empty_part() {
        let structure = extract_structure("<hp:sec></hp:sec>");
        assert!(structure.paragraphs.is_empty());
        assert!(structure.tables.is_empty());
        assert_eq!(structure.text_len(), 0);
    }
}
