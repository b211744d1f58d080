// Data models for the form-recognition and auto-fill pipeline

pub mod state_machine;

pub use state_machine::{can_advance, is_terminal_stage, next_stage, FillStage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container format detected from the leading bytes of a downloaded template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    /// zip archive of per-section XML parts (the only supported kind)
    ZipXml,
    /// The pre-zip CFB binary variant; explicitly rejected, never parsed
    LegacyBinary,
    /// Anything else (HTML error pages, truncated downloads, ...)
    Unknown,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::ZipXml => "zip-xml",
            ContainerKind::LegacyBinary => "legacy-binary",
            ContainerKind::Unknown => "unknown",
        }
    }

    /// Only zip-XML containers reach the structural parser
    pub fn is_supported(&self) -> bool {
        matches!(self, ContainerKind::ZipXml)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Pending,
    Parsing,
    Ready,
    Failed,
}

/// Cached record of an uploaded blank form, keyed by program identity.
///
/// Created on the first fill attempt for a program and re-used until
/// explicitly invalidated. Last successful parse wins; there is no
/// concurrent mutation within one fill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTemplate {
    pub id: String,
    pub program_id: String,
    pub source_url: String,
    pub container_kind: ContainerKind,
    /// Object-store key holding the raw template bytes
    pub storage_key: Option<String>,
    pub parsed_form: Option<ParsedForm>,
    pub status: TemplateStatus,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormTemplate {
    pub fn is_usable(&self) -> bool {
        self.status == TemplateStatus::Ready && self.container_kind.is_supported()
    }
}

/// Structural parse of one form: document-order sections and fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedForm {
    pub sections: Vec<FormSection>,
    pub fields: Vec<FormField>,
}

impl ParsedForm {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.fields.is_empty()
    }
}

/// A named outline section reconstructed from numbering patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSection {
    pub name: String,
    /// Archive part the heading was found in (e.g. "Contents/section0.xml")
    pub part: String,
    pub para_index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    ShortText,
    LongText,
    TableCell,
    Date,
    Number,
}

impl FieldKind {
    /// Kinds whose assigned content is compressed to a single line
    pub fn is_single_line(&self) -> bool {
        matches!(self, FieldKind::ShortText | FieldKind::Date | FieldKind::Number)
    }
}

/// Table coordinates for a table-cell field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableAnchor {
    pub table_index: usize,
    pub row: usize,
    pub col: usize,
}

/// Position of a detected blank slot inside the original archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAnchor {
    pub part: String,
    /// Index of the empty paragraph (or, for table cells, the paragraph
    /// holding the table) within the part's paragraph sequence
    pub para_index: usize,
    pub table: Option<TableAnchor>,
}

/// One detected blank answer slot within an uploaded form.
///
/// Field ids are stable across the mapping and filling stages of one fill
/// run; they are not guaranteed stable across re-parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    /// Label text of the preceding run or paired cell
    pub label: String,
    pub kind: FieldKind,
    pub anchor: FieldAnchor,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Rule,
    Ai,
    None,
}

/// Assignment of one plan section to one detected field.
///
/// Every `FormField` of a `ParsedForm` appears in exactly one `FieldMapping`;
/// unresolved fields are recorded explicitly with `method: none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub field_id: String,
    pub section_name: Option<String>,
    pub method: MappingMethod,
    /// Content adapted to the field kind, ready for splicing
    pub content: Option<String>,
}

impl FieldMapping {
    pub fn unresolved(field_id: &str) -> Self {
        Self {
            field_id: field_id.to_string(),
            section_name: None,
            method: MappingMethod::None,
            content: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.method != MappingMethod::None && self.content.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    SmartFill,
    PlaceholderFill,
    FromScratch,
}

impl FillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::SmartFill => "smart_fill",
            FillStrategy::PlaceholderFill => "placeholder_fill",
            FillStrategy::FromScratch => "from_scratch",
        }
    }
}

/// One named, already-generated chapter of business-plan content.
///
/// Produced by an external collaborator; consumed here as finished text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub name: String,
    pub text: String,
}

/// Outcome of one fill request. Not persisted beyond the response.
#[derive(Debug, Clone)]
pub struct FillResult {
    pub output: Vec<u8>,
    pub strategy: FillStrategy,
    pub filled_fields: usize,
    pub skipped_fields: usize,
    pub file_name: String,
    pub content_type: String,
}
