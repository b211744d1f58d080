// Template acquisition and cache
//
// Given a program's attachment metadata, produce a FormTemplate in status
// Ready or Failed. Failures are recorded on the row and returned, never
// thrown: downstream stages treat a Failed row as "proceed to next fallback".

use crate::archive;
use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::errors::FillError;
use crate::models::{ContainerKind, FormTemplate, TemplateStatus};
use crate::storage::{ObjectStore, TemplateStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

/// What a candidate attachment URL points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// The blank form file itself
    Form,
    /// The program announcement document (PDF); last-choice candidate
    Announcement,
    Other,
}

/// One candidate download URL from the program's attachment metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub url: String,
    pub kind: AttachmentKind,
}

/// Pick the best candidate URL: a form file wins over an announcement,
/// which wins over anything else
pub fn select_candidate_url(attachments: &[AttachmentMeta]) -> Option<&str> {
    attachments
        .iter()
        .find(|a| a.kind == AttachmentKind::Form)
        .or_else(|| {
            attachments
                .iter()
                .find(|a| a.kind == AttachmentKind::Announcement)
        })
        .or_else(|| attachments.first())
        .map(|a| a.url.as_str())
}

/// Classify a downloaded buffer by its leading bytes
pub fn classify_container(bytes: &[u8]) -> ContainerKind {
    if archive::is_zip(bytes) {
        ContainerKind::ZipXml
    } else if archive::is_legacy_binary(bytes) {
        ContainerKind::LegacyBinary
    } else {
        ContainerKind::Unknown
    }
}

/// Acquires templates and maintains the program-keyed cache
pub struct TemplateAcquirer {
    config: EngineConfig,
    object_store: Box<dyn ObjectStore>,
    template_store: TemplateStore,
    cache: Cache<String, FormTemplate>,
}

impl TemplateAcquirer {
    pub fn new(
        config: EngineConfig,
        object_store: Box<dyn ObjectStore>,
        template_store: TemplateStore,
    ) -> Self {
        let ttl = Duration::from_secs(config.template_cache_ttl_secs);
        Self {
            config,
            object_store,
            template_store,
            cache: Cache::new(ttl),
        }
    }

    /// Produce the FormTemplate for a program, downloading and classifying
    /// on first use and serving from cache afterwards
    pub fn acquire(
        &mut self,
        program_id: &str,
        attachments: &[AttachmentMeta],
    ) -> Result<FormTemplate, FillError> {
        if let Some(cached) = self.cache.get(&program_id.to_string()) {
            log::debug!("[Acquisition] Template for program {} served from memory", program_id);
            return Ok(cached);
        }

        if let Ok(Some(row)) = self.template_store.find_by_program(program_id) {
            log::debug!("[Acquisition] Template for program {} served from row store", program_id);
            self.cache.put(program_id.to_string(), row.clone());
            return Ok(row);
        }

        let url = match select_candidate_url(attachments) {
            Some(url) => url.to_string(),
            None => {
                let row = self.failed_row(program_id, "", ContainerKind::Unknown,
                    "No candidate attachment URL");
                return Ok(row);
            }
        };

        let bytes = match self.download(&url) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("[Acquisition] Download failed for program {}: {}", program_id, e);
                let row = self.failed_row(program_id, &url, ContainerKind::Unknown,
                    &format!("Download failed: {}", e));
                return Ok(row);
            }
        };

        let kind = classify_container(&bytes);
        if !kind.is_supported() {
            log::warn!(
                "[Acquisition] Program {} template classified as {}, rejecting",
                program_id,
                kind.as_str()
            );
            let row = self.failed_row(program_id, &url, kind,
                &format!("Unsupported container format: {}", kind.as_str()));
            return Ok(row);
        }

        let storage_key = format!("templates/{}", program_id);
        if let Err(e) = self.object_store.put(&storage_key, &bytes) {
            let row = self.failed_row(program_id, &url, kind,
                &format!("Object store write failed: {}", e));
            return Ok(row);
        }

        let now = Utc::now();
        let row = FormTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            program_id: program_id.to_string(),
            source_url: url,
            container_kind: kind,
            storage_key: Some(storage_key),
            parsed_form: None,
            status: TemplateStatus::Ready,
            error_detail: None,
            created_at: now,
            updated_at: now,
        };
        self.persist(&row);
        log::info!("[Acquisition] Template for program {} ready ({} bytes)", program_id, bytes.len());
        Ok(row)
    }

    /// Fetch the raw bytes for a previously acquired template
    pub fn template_bytes(&self, template: &FormTemplate) -> Result<Vec<u8>, FillError> {
        let key = template.storage_key.as_deref().ok_or_else(|| {
            FillError::DownloadFailure("Template has no storage key".to_string())
        })?;
        self.object_store
            .get(key)
            .map_err(|e| FillError::DownloadFailure(format!("Object store read failed: {}", e)))
    }

    /// Persist an updated row (e.g. with a cached parse) and refresh the
    /// in-memory cache. Last writer wins.
    pub fn update(&mut self, template: &FormTemplate) {
        self.persist(template);
    }

    /// Drop both cache layers for a program so the next fill re-acquires
    pub fn invalidate(&mut self, program_id: &str) -> Result<(), FillError> {
        self.cache.invalidate(&program_id.to_string());
        self.template_store
            .invalidate(program_id)
            .map_err(|e| FillError::DownloadFailure(e.to_string()))
    }

    /// Bounded download: wall-clock timeout from config, byte cap enforced
    /// while reading. Redirects are followed (government sites bounce
    /// through session gateways).
    fn download(&self, url: &str) -> Result<Vec<u8>, FillError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.download_timeout_secs))
            .build()?;

        let response = client.get(url).send().map_err(|e| {
            FillError::DownloadFailure(format!("GET {} failed: {}", url, e))
        })?;

        if !response.status().is_success() {
            return Err(FillError::DownloadFailure(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let cap = self.config.max_template_bytes;
        let mut bytes = Vec::new();
        let mut reader = response.take(cap + 1);
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| FillError::DownloadFailure(format!("Body read failed: {}", e)))?;

        if bytes.len() as u64 > cap {
            return Err(FillError::DownloadFailure(format!(
                "Template exceeds size cap of {} bytes",
                cap
            )));
        }
        Ok(bytes)
    }

    fn failed_row(
        &mut self,
        program_id: &str,
        url: &str,
        kind: ContainerKind,
        detail: &str,
    ) -> FormTemplate {
        let now = Utc::now();
        let row = FormTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            program_id: program_id.to_string(),
            source_url: url.to_string(),
            container_kind: kind,
            storage_key: None,
            parsed_form: None,
            status: TemplateStatus::Failed,
            error_detail: Some(detail.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.persist(&row);
        row
    }

    fn persist(&mut self, row: &FormTemplate) {
        if let Err(e) = self.template_store.upsert(row) {
            // A cache write failure only costs a re-download next time
            log::warn!("[Acquisition] Failed to persist template row: {}", e);
        }
        self.cache.put(row.program_id.clone(), row.clone());
    }
}
