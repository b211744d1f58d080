// zip-XML container handling
//
// The supported form format is a zip archive of per-section XML parts
// (Contents/section0.xml, Contents/section1.xml, ...). Rebuilding an
// archive rewrites only the parts handed in; every other entry is copied
// raw, so untouched parts stay byte-identical and the original styling
// survives.

use crate::errors::FillError;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// Zip local-file-header signature
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// CFB signature used by the pre-zip legacy binary variant
pub const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == ZIP_MAGIC
}

pub fn is_legacy_binary(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes[..8] == CFB_MAGIC
}

fn is_section_part(name: &str) -> bool {
    name.starts_with("Contents/section") && name.ends_with(".xml")
}

/// Numeric suffix of a section part name, for document ordering
fn section_index(name: &str) -> usize {
    name.trim_start_matches("Contents/section")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(usize::MAX)
}

/// List the section parts of the archive in document order
pub fn list_section_parts(bytes: &[u8]) -> Result<Vec<String>, FillError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts: Vec<String> = (0..archive.len())
        .filter_map(|i| {
            archive
                .by_index(i)
                .ok()
                .map(|f| f.name().to_string())
                .filter(|n| is_section_part(n))
        })
        .collect();
    parts.sort_by_key(|n| section_index(n));
    Ok(parts)
}

/// Read one part of the archive as UTF-8 text
pub fn read_part(bytes: &[u8], name: &str) -> Result<String, FillError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_name(name)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Rebuild the archive with the given parts replaced.
///
/// Entries not named in `replaced` are copied raw (compressed data and
/// metadata untouched); replaced parts are re-deflated from the new text.
pub fn rebuild_with_parts(
    bytes: &[u8],
    replaced: &HashMap<String, String>,
) -> Result<Vec<u8>, FillError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for i in 0..archive.len() {
        let name = archive.by_index(i)?.name().to_string();
        if let Some(new_content) = replaced.get(&name) {
            let options = FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file(&name, options)?;
            writer.write_all(new_content.as_bytes())?;
            log::debug!(
                "[Archive] Rewrote part {} ({} bytes)",
                name,
                new_content.len()
            );
        } else {
            let file = archive.by_index_raw(i)?;
            writer.raw_copy_file(file)?;
        }
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Build a fresh archive from scratch, given (name, content) parts
pub fn build_archive(parts: &[(String, String)]) -> Result<Vec<u8>, FillError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in parts {
        writer.start_file(name, options)?;
        writer.write_all(content.as_bytes())?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> Vec<u8> {
        build_archive(&[
            ("mimetype".to_string(), "application/hwp+zip".to_string()),
            (
                "Contents/section0.xml".to_string(),
                "<hp:p><hp:t>hello</hp:t></hp:p>".to_string(),
            ),
            (
                "Contents/section1.xml".to_string(),
                "<hp:p><hp:t>world</hp:t></hp:p>".to_string(),
            ),
            ("styles.xml".to_string(), "<styles/>".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_magic_detection() {
        assert!(is_zip(&sample_archive()));
        assert!(!is_zip(b"not a zip"));
        assert!(is_legacy_binary(&CFB_MAGIC));
        assert!(!is_legacy_binary(&sample_archive()));
    }

    #[test]
    fn test_list_section_parts_in_document_order() {
        let parts = list_section_parts(&sample_archive()).unwrap();
        assert_eq!(
            parts,
            vec!["Contents/section0.xml", "Contents/section1.xml"]
        );
    }

    #[test]
    fn test_read_part() {
        let content = read_part(&sample_archive(), "Contents/section0.xml").unwrap();
        assert_eq!(content, "<hp:p><hp:t>hello</hp:t></hp:p>");
    }

    #[test]
    fn test_rebuild_replaces_only_named_parts() {
        let original = sample_archive();
        let mut replaced = HashMap::new();
        replaced.insert(
            "Contents/section0.xml".to_string(),
            "<hp:p><hp:t>filled</hp:t></hp:p>".to_string(),
        );

        let rebuilt = rebuild_with_parts(&original, &replaced).unwrap();

        assert_eq!(
            read_part(&rebuilt, "Contents/section0.xml").unwrap(),
            "<hp:p><hp:t>filled</hp:t></hp:p>"
        );
        // Untouched parts survive unchanged
        assert_eq!(
            read_part(&rebuilt, "Contents/section1.xml").unwrap(),
            "<hp:p><hp:t>world</hp:t></hp:p>"
        );
        assert_eq!(read_part(&rebuilt, "styles.xml").unwrap(), "<styles/>");
        assert_eq!(read_part(&rebuilt, "mimetype").unwrap(), "application/hwp+zip");
    }

    #[test]
    fn test_rebuild_with_no_replacements_is_openable() {
        let original = sample_archive();
        let rebuilt = rebuild_with_parts(&original, &HashMap::new()).unwrap();
        assert!(is_zip(&rebuilt));
        assert_eq!(
            list_section_parts(&rebuilt).unwrap(),
            list_section_parts(&original).unwrap()
        );
    }

    #[test]
    fn test_corrupt_zip_is_an_error() {
        let mut bytes = sample_archive();
        bytes.truncate(10);
        assert!(list_section_parts(&bytes).is_err());
    }
}
