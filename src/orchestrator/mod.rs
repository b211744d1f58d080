// Fallback orchestrator
//
// Sequences the three fill strategies over the stage machine in
// models::state_machine. A stage that errors, fills zero fields, or is
// skipped for an upstream Failed status advances the chain; building from
// scratch depends only on already-generated content, which is what makes
// Done always reachable. The caller gets either a complete, valid document
// or one categorized hard error, never a partially written buffer.

use crate::acquisition::{AttachmentMeta, TemplateAcquirer};
use crate::completion::TextCompletion;
use crate::config::EngineConfig;
use crate::errors::FillError;
use crate::filler::{self, placeholder, FilledDocument};
use crate::mapper::FieldMapper;
use crate::models::{
    next_stage, FillResult, FillStage, FillStrategy, FormTemplate, PlanSection, TemplateStatus,
};
use crate::parser::{FormParser, ParseOutcome};
use crate::scratch::FromScratchBuilder;
use crate::storage::{ObjectStore, TemplateStore};
use chrono::Utc;

pub const OUTPUT_CONTENT_TYPE: &str = "application/vnd.hancom.hwpx";

/// One fill request: which program's form to fill, with which plan content
#[derive(Debug, Clone)]
pub struct FillRequest {
    pub program_id: String,
    pub company_name: String,
    pub attachments: Vec<AttachmentMeta>,
    pub sections: Vec<PlanSection>,
}

pub struct FillOrchestrator {
    acquirer: TemplateAcquirer,
    parser: FormParser,
    mapper: FieldMapper,
    completion: Box<dyn TextCompletion>,
    scratch: Box<dyn FromScratchBuilder>,
}

impl FillOrchestrator {
    pub fn new(
        config: EngineConfig,
        object_store: Box<dyn ObjectStore>,
        template_store: TemplateStore,
        completion: Box<dyn TextCompletion>,
        scratch: Box<dyn FromScratchBuilder>,
    ) -> Self {
        Self {
            acquirer: TemplateAcquirer::new(config.clone(), object_store, template_store),
            parser: FormParser::new(config.clone()),
            mapper: FieldMapper::new(config),
            completion,
            scratch,
        }
    }

    /// Run one fill request through the fallback chain
    pub fn fill(&mut self, request: &FillRequest) -> Result<FillResult, FillError> {
        let mut stage = FillStage::TryingSmartFill;

        loop {
            let attempt = match stage {
                FillStage::TryingSmartFill => self.try_smart_fill(request),
                FillStage::TryingPlaceholder => self.try_placeholder(request),
                FillStage::BuildingFromScratch => {
                    return self.build_from_scratch(request);
                }
                FillStage::Done => unreachable!("fill returns before reaching Done"),
            };

            match attempt {
                Ok(Some((doc, strategy))) => {
                    log::info!(
                        "[Orchestrator] Strategy {} produced {} filled / {} skipped fields",
                        strategy.as_str(),
                        doc.filled,
                        doc.skipped
                    );
                    return Ok(self.result(request, doc, strategy));
                }
                Ok(None) => {
                    log::info!("[Orchestrator] Stage {:?} filled nothing, advancing", stage);
                }
                Err(e) if e.is_recoverable() => {
                    log::warn!("[Orchestrator] Stage {:?} failed: {}, advancing", stage, e);
                }
                Err(e) => return Err(e),
            }

            stage = next_stage(stage)
                .ok_or_else(|| FillError::ExhaustedFallbacks("No stage left".to_string()))?;
        }
    }

    /// Invalidate the cached template so the next fill re-acquires it
    pub fn invalidate_template(&mut self, program_id: &str) -> Result<(), FillError> {
        self.acquirer.invalidate(program_id)
    }

    /// Stage 1: structural recognition + mapped injection
    fn try_smart_fill(
        &mut self,
        request: &FillRequest,
    ) -> Result<Option<(FilledDocument, FillStrategy)>, FillError> {
        let template = self
            .acquirer
            .acquire(&request.program_id, &request.attachments)?;
        if !template.is_usable() {
            log::info!(
                "[Orchestrator] Template for program {} is {:?} ({}), skipping smart fill",
                request.program_id,
                template.status,
                template.error_detail.as_deref().unwrap_or("no detail")
            );
            return Ok(None);
        }

        let bytes = self.acquirer.template_bytes(&template)?;
        let form = match self.parsed_form(&template, &bytes)? {
            Some(form) => form,
            None => return Ok(None), // Parse failed; row already marked
        };

        let mappings =
            self.mapper
                .map_fields(&form.fields, &request.sections, self.completion.as_ref());
        let doc = filler::fill_form(&bytes, &form, &mappings)?;
        if doc.filled == 0 {
            return Ok(None);
        }
        Ok(Some((doc, FillStrategy::SmartFill)))
    }

    /// Structural parse with row-level caching: a template parsed once is
    /// never re-parsed for repeat fills
    fn parsed_form(
        &mut self,
        template: &FormTemplate,
        bytes: &[u8],
    ) -> Result<Option<crate::models::ParsedForm>, FillError> {
        if let Some(cached) = &template.parsed_form {
            log::debug!(
                "[Orchestrator] Re-using cached parse for program {}",
                template.program_id
            );
            return Ok(Some(cached.clone()));
        }

        let mut row = template.clone();
        row.status = TemplateStatus::Parsing;
        row.updated_at = Utc::now();
        self.acquirer.update(&row);

        match self.parser.parse(bytes, self.completion.as_ref()) {
            ParseOutcome::RuleBased(form) | ParseOutcome::AiAssisted(form) => {
                row.parsed_form = Some(form.clone());
                row.status = TemplateStatus::Ready;
                row.updated_at = Utc::now();
                self.acquirer.update(&row);
                Ok(Some(form))
            }
            ParseOutcome::Failed => {
                row.status = TemplateStatus::Failed;
                row.error_detail = Some("Structural parse found no fields or sections".to_string());
                row.updated_at = Utc::now();
                self.acquirer.update(&row);
                Ok(None)
            }
        }
    }

    /// Stage 2: author-authored {{token}} substitution over the raw template
    fn try_placeholder(
        &mut self,
        request: &FillRequest,
    ) -> Result<Option<(FilledDocument, FillStrategy)>, FillError> {
        let template = self
            .acquirer
            .acquire(&request.program_id, &request.attachments)?;
        if !template.container_kind.is_supported() || template.storage_key.is_none() {
            log::info!(
                "[Orchestrator] No usable template bytes for program {}, skipping placeholder fill",
                request.program_id
            );
            return Ok(None);
        }

        let bytes = self.acquirer.template_bytes(&template)?;
        let doc = placeholder::fill_placeholders(&bytes, &request.sections)?;
        if doc.filled == 0 {
            return Ok(None);
        }
        Ok(Some((doc, FillStrategy::PlaceholderFill)))
    }

    /// Stage 3: compose with no template dependency at all
    fn build_from_scratch(&mut self, request: &FillRequest) -> Result<FillResult, FillError> {
        let output = self
            .scratch
            .build(&request.company_name, &request.sections)
            .map_err(|e| FillError::ExhaustedFallbacks(format!("Scratch builder failed: {}", e)))?;
        log::info!(
            "[Orchestrator] Built document from scratch for program {}",
            request.program_id
        );
        Ok(self.result(
            request,
            FilledDocument {
                output,
                filled: 0,
                skipped: 0,
            },
            FillStrategy::FromScratch,
        ))
    }

    fn result(
        &self,
        request: &FillRequest,
        doc: FilledDocument,
        strategy: FillStrategy,
    ) -> FillResult {
        FillResult {
            output: doc.output,
            strategy,
            filled_fields: doc.filled,
            skipped_fields: doc.skipped,
            file_name: output_file_name(&request.company_name),
            content_type: OUTPUT_CONTENT_TYPE.to_string(),
        }
    }
}

/// Company name plus export date, with path-hostile characters stripped
pub fn output_file_name(company_name: &str) -> String {
    let safe: String = company_name
        .chars()
        .filter(|c| !['/', '\\', '\0', ':', '*', '?', '"', '<', '>', '|'].contains(c))
        .collect();
    format!(
        "{}_사업계획서_{}.hwpx",
        safe.trim(),
        Utc::now().format("%Y%m%d")
    )
}
